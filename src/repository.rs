//! In-memory dial list and settings for the running session.
//!
//! Mutations validate first and leave the list untouched on error. The
//! repository knows nothing about storage; callers save after mutating.

use crate::dial::{default_dials, Dial};
use crate::error::{Error, Result};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq)]
pub struct DialRepository {
    dials: Vec<Dial>,
    settings: Settings,
}

impl Default for DialRepository {
    fn default() -> Self {
        Self::new(default_dials(), Settings::default())
    }
}

impl DialRepository {
    pub fn new(dials: Vec<Dial>, settings: Settings) -> Self {
        Self { dials, settings }
    }

    pub fn dials(&self) -> &[Dial] {
        &self.dials
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.dials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dials.is_empty()
    }

    pub fn add(&mut self, dial: Dial) -> Result<()> {
        dial.validate()?;
        self.dials.push(dial);
        Ok(())
    }

    pub fn update(&mut self, index: usize, dial: Dial) -> Result<()> {
        self.check_index(index)?;
        dial.validate()?;
        self.dials[index] = dial;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Dial> {
        self.check_index(index)?;
        Ok(self.dials.remove(index))
    }

    /// Move one dial; every other dial keeps its relative order.
    pub fn move_dial(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let dial = self.dials.remove(from);
        self.dials.insert(to, dial);
        Ok(())
    }

    pub fn replace_all(&mut self, dials: Vec<Dial>) -> Result<()> {
        for dial in &dials {
            dial.validate()?;
        }
        self.dials = dials;
        Ok(())
    }

    pub fn set_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Back to the built-in dials and default settings.
    pub fn restore_defaults(&mut self) {
        *self = Self::default();
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.dials.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.dials.len(),
            });
        }
        Ok(())
    }
}

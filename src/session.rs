//! A page session: the in-memory repository plus its persistence.
//!
//! Every mutating call updates the repository, then awaits exactly one
//! save. Taking `&mut self` keeps saves from overlapping.

use crate::dial::Dial;
use crate::error::Result;
use crate::persistence::{LoadSource, Persistence, SaveReport, StorageUsage};
use crate::repository::DialRepository;
use crate::settings::Settings;
use crate::transfer::{self, ExportDocument, ImportMerge, ImportPayload};

pub struct Session {
    repo: DialRepository,
    persistence: Persistence,
    source: LoadSource,
}

impl Session {
    /// Load persisted state and seed the repository with it.
    ///
    /// The second value carries a load warning for the user, if any.
    pub async fn open(persistence: Persistence) -> (Self, Option<String>) {
        let loaded = persistence.load().await;
        tracing::info!(
            "Loaded {} shortcuts from {:?} tier",
            loaded.dials.len(),
            loaded.source
        );
        let session = Self {
            repo: DialRepository::new(loaded.dials, loaded.settings),
            persistence,
            source: loaded.source,
        };
        (session, loaded.warning)
    }

    pub fn repository(&self) -> &DialRepository {
        &self.repo
    }

    pub fn dials(&self) -> &[Dial] {
        self.repo.dials()
    }

    pub fn settings(&self) -> &Settings {
        self.repo.settings()
    }

    /// Tier the session's data was loaded from.
    pub fn load_source(&self) -> LoadSource {
        self.source
    }

    pub async fn add(&mut self, dial: Dial) -> Result<SaveReport> {
        self.repo.add(dial)?;
        Ok(self.save().await)
    }

    pub async fn update(&mut self, index: usize, dial: Dial) -> Result<SaveReport> {
        self.repo.update(index, dial)?;
        Ok(self.save().await)
    }

    pub async fn remove(&mut self, index: usize) -> Result<SaveReport> {
        self.repo.remove(index)?;
        Ok(self.save().await)
    }

    pub async fn move_dial(&mut self, from: usize, to: usize) -> Result<SaveReport> {
        self.repo.move_dial(from, to)?;
        Ok(self.save().await)
    }

    pub async fn replace_all(&mut self, dials: Vec<Dial>) -> Result<SaveReport> {
        self.repo.replace_all(dials)?;
        Ok(self.save().await)
    }

    pub async fn set_settings(&mut self, settings: Settings) -> Result<SaveReport> {
        self.repo.set_settings(settings)?;
        Ok(self.save().await)
    }

    /// Apply a parsed import. `merge` only matters for foreign payloads;
    /// native imports always replace the list and their settings win.
    pub async fn import(
        &mut self,
        payload: ImportPayload,
        merge: ImportMerge,
    ) -> Result<SaveReport> {
        let mut next = self.repo.clone();
        match payload {
            ImportPayload::Native { dials, settings } => {
                next.replace_all(dials)?;
                if let Some(settings) = settings {
                    next.set_settings(settings)?;
                }
            }
            ImportPayload::Foreign { dials } => {
                let merged = transfer::merge(next.dials(), &dials, merge);
                next.replace_all(merged)?;
            }
        }
        self.repo = next;
        Ok(self.save().await)
    }

    pub async fn export(&self) -> ExportDocument {
        self.persistence.export().await
    }

    /// Clear both tiers and return to defaults.
    pub async fn reset(&mut self) {
        let (dials, settings) = self.persistence.reset().await;
        self.repo = DialRepository::new(dials, settings);
    }

    pub async fn usage(&self) -> StorageUsage {
        self.persistence.usage().await
    }

    async fn save(&self) -> SaveReport {
        self.persistence
            .save(self.repo.dials(), self.repo.settings())
            .await
    }
}

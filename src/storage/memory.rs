//! In-process tier.
//!
//! With a quota it behaves like the browser's sync area: a write that
//! would push one item past the per-item limit or the area past its total
//! limit is refused as a whole. It can also be switched offline to
//! exercise fallback paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{charged_bytes, KvStore};
use crate::config::QuotaConfig;
use crate::error::{Error, Result};
use crate::quota;

pub struct MemoryStore {
    name: String,
    entries: Mutex<Map<String, Value>>,
    quota: Option<QuotaConfig>,
    available: AtomicBool,
}

impl MemoryStore {
    /// A tier that enforces the hard limits in `quota`.
    pub fn with_quota(name: &str, quota: QuotaConfig) -> Self {
        Self::build(name, Some(quota))
    }

    /// A tier with no size limits.
    pub fn unbounded(name: &str) -> Self {
        Self::build(name, None)
    }

    fn build(name: &str, quota: Option<QuotaConfig>) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(Map::new()),
            quota,
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable, every call fails with `TierUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, Map<String, Value>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.name, "tier is offline"));
        }
        self.entries
            .lock()
            .map_err(|e| Error::unavailable(&self.name, format!("lock poisoned: {e}")))
    }

    fn check_quota(
        &self,
        current: &Map<String, Value>,
        incoming: &Map<String, Value>,
    ) -> Result<()> {
        let Some(limits) = self.quota else {
            return Ok(());
        };

        for (key, value) in incoming {
            let size = quota::item_size(key, value)?;
            if size > limits.per_item_bytes {
                return Err(Error::unavailable(
                    &self.name,
                    format!("QUOTA_BYTES_PER_ITEM quota exceeded by '{key}' ({size} bytes)"),
                ));
            }
        }

        let mut total = 0;
        for (key, value) in current {
            if !incoming.contains_key(key) {
                total += quota::item_size(key, value)?;
            }
        }
        total += charged_bytes(incoming, None)?;
        if total > limits.total_bytes {
            return Err(Error::unavailable(
                &self.name,
                format!("QUOTA_BYTES quota exceeded ({total} bytes)"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn tier_name(&self) -> &str {
        &self.name
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        Ok(self.entries()?.clone())
    }

    async fn set_many(&self, entries: Map<String, Value>) -> Result<()> {
        let mut current = self.entries()?;
        self.check_quota(&current, &entries)?;
        current.extend(entries);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut current = self.entries()?;
        for key in keys {
            current.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries()?.clear();
        Ok(())
    }

    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<usize> {
        let current = self.entries()?;
        charged_bytes(&current, keys)
    }
}

//! Device-local tier backed by a redb file.
//!
//! Values are stored as compact JSON bytes under their string key. There
//! is no size limit; this tier is the fallback when sync is refused.

use std::path::Path;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::{Map, Value};

use super::{charged_bytes, KvStore};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

const TIER_NAME: &str = "local";

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::unavailable(TIER_NAME, e))?;
        let store = Self { db };
        store
            .ensure_table()
            .map_err(|e| Error::unavailable(TIER_NAME, e))?;
        Ok(store)
    }

    pub fn open_default(config: &StorageConfig) -> anyhow::Result<Self> {
        let path = config.local_db_path()?;
        tracing::debug!("Opening local tier at {}", path.display());
        Ok(Self::open(&path)?)
    }

    fn ensure_table(&self) -> std::result::Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        { let _ = txn.open_table(ENTRIES_TABLE)?; }
        txn.commit()?;
        Ok(())
    }

    fn read_all(&self) -> std::result::Result<Map<String, Value>, redb::Error> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(ENTRIES_TABLE)?;
        let mut entries = Map::new();
        for item in table.iter()? {
            let (key, val) = item?;
            match serde_json::from_slice::<Value>(val.value()) {
                Ok(value) => {
                    entries.insert(key.value().to_string(), value);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable local entry '{}': {}", key.value(), e)
                }
            }
        }
        Ok(entries)
    }

    fn write(&self, encoded: &[(String, Vec<u8>)]) -> std::result::Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            for (key, bytes) in encoded {
                table.insert(key.as_str(), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&self, keys: &[String]) -> std::result::Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn remove_all(&self) -> std::result::Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES_TABLE)?;
            // Collect all keys then delete
            let keys: Vec<String> = table
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<std::result::Result<_, _>>()?;
            for key in keys {
                table.remove(key.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedbStore {
    fn tier_name(&self) -> &str {
        TIER_NAME
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        self.read_all().map_err(|e| Error::unavailable(TIER_NAME, e))
    }

    async fn set_many(&self, entries: Map<String, Value>) -> Result<()> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let bytes = serde_json::to_vec(&value).map_err(|e| Error::unavailable(TIER_NAME, e))?;
            encoded.push((key, bytes));
        }
        self.write(&encoded).map_err(|e| Error::unavailable(TIER_NAME, e))
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        self.remove(keys).map_err(|e| Error::unavailable(TIER_NAME, e))
    }

    async fn clear(&self) -> Result<()> {
        self.remove_all().map_err(|e| Error::unavailable(TIER_NAME, e))
    }

    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<usize> {
        let entries = self.get_all().await?;
        charged_bytes(&entries, keys)
    }
}

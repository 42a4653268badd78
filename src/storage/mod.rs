//! Key/value storage tiers.
//!
//! - [`MemoryStore`]: in-process map, optionally enforcing sync tier quotas
//! - [`RedbStore`]: redb file on this device (durable local tier)
//!
//! [`Persistence`](crate::persistence::Persistence) holds one store in the
//! sync role and one in the local role; all chunking happens above this
//! layer. Every call reflects live tier state, nothing is cached here.

pub mod local;
pub mod memory;

pub use local::RedbStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::quota;

/// The contract both tiers expose.
///
/// Every failure is reported as [`Error::TierUnavailable`](crate::Error::TierUnavailable).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Human-readable tier name (e.g., "sync", "local").
    fn tier_name(&self) -> &str;

    /// Every key and value currently stored.
    async fn get_all(&self) -> Result<Map<String, Value>>;

    /// Write all entries or none.
    async fn set_many(&self, entries: Map<String, Value>) -> Result<()>;

    /// Remove the given keys; absent keys are ignored.
    async fn remove_many(&self, keys: &[String]) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Bytes charged for `keys`, or for everything when None.
    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<usize>;
}

/// Bytes charged for the selected entries of a map.
pub(crate) fn charged_bytes(
    entries: &Map<String, Value>,
    keys: Option<&[String]>,
) -> Result<usize> {
    let mut total = 0;
    match keys {
        Some(keys) => {
            for key in keys {
                if let Some(value) = entries.get(key) {
                    total += quota::item_size(key, value)?;
                }
            }
        }
        None => {
            for (key, value) in entries {
                total += quota::item_size(key, value)?;
            }
        }
    }
    Ok(total)
}

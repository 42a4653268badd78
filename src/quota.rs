//! Byte accounting that mirrors how the sync tier charges its quota.
//!
//! A value costs the length of its compact UTF-8 JSON encoding; a stored
//! item additionally pays for its key.

use serde::Serialize;

use crate::error::Result;

/// Serialized size of `value` in bytes.
pub fn size_of<T: Serialize + ?Sized>(value: &T) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

/// Bytes a single `key → value` entry occupies in a tier.
pub fn item_size<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<usize> {
    Ok(key.len() + size_of(value)?)
}

/// Share of `quota` used by `bytes`, in percent.
pub fn percent_of(bytes: usize, quota: usize) -> f64 {
    if quota == 0 {
        return 100.0;
    }
    bytes as f64 / quota as f64 * 100.0
}

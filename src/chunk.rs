//! Chunked on-disk layout for the dial list.
//!
//! ```text
//! dials_meta  → {"count": N, "chunks": C, "version": 2}
//! dials_0     → [Dial, ...]
//! ...
//! dials_{C-1} → [Dial, ...]
//! dials       → [Dial, ...]   (legacy, read-only)
//! ```
//!
//! Every save rewrites the whole set. Concatenating the chunks in index
//! order yields the saved list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dial::Dial;
use crate::error::Result;
use crate::quota;

pub const META_KEY: &str = "dials_meta";
pub const LEGACY_KEY: &str = "dials";
pub const SETTINGS_KEY: &str = "settings";
const CHUNK_KEY_PREFIX: &str = "dials_";

/// Layout version written into the metadata record.
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub count: usize,
    pub chunks: usize,
    pub version: u32,
}

pub fn chunk_key(index: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{index}")
}

/// Index encoded in a chunk key, or None for any other key.
pub fn parse_chunk_key(key: &str) -> Option<usize> {
    let digits = key.strip_prefix(CHUNK_KEY_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Only the form `chunk_key` writes; "dials_01" would alias "dials_1"
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Greedily pack dials into chunks whose JSON array stays within
/// `max_chunk_bytes`.
///
/// A dial larger than the budget on its own still gets a chunk to
/// itself; dials are never split or dropped.
pub fn split_into_chunks(dials: &[Dial], max_chunk_bytes: usize) -> Result<Vec<Vec<Dial>>> {
    const BRACKETS: usize = 2;
    const COMMA: usize = 1;

    let mut chunks = Vec::new();
    let mut current: Vec<Dial> = Vec::new();
    let mut current_size = BRACKETS;

    for dial in dials {
        let dial_size = quota::size_of(dial)?;
        let added = if current.is_empty() { dial_size } else { dial_size + COMMA };

        if !current.is_empty() && current_size + added > max_chunk_bytes {
            chunks.push(std::mem::take(&mut current));
            current_size = BRACKETS + dial_size;
        } else {
            current_size += added;
        }
        current.push(dial.clone());
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Chunk entries of `raw` that `meta` covers, in index order.
///
/// Only keys actually present are visited, so a damaged `chunks` count
/// costs nothing.
fn chunk_entries<'a>(meta: &ChunkMeta, raw: &'a Map<String, Value>) -> Vec<(usize, &'a Value)> {
    let mut entries: Vec<(usize, &Value)> = raw
        .iter()
        .filter_map(|(key, value)| Some((parse_chunk_key(key)?, value)))
        .filter(|(index, _)| *index < meta.chunks)
        .collect();
    entries.sort_unstable_by_key(|(index, _)| *index);
    entries
}

/// Concatenate the chunks of `raw` in index order.
///
/// A missing or malformed chunk is skipped so that one damaged key does
/// not lose the rest of the list.
pub fn join_chunks(meta: &ChunkMeta, raw: &Map<String, Value>) -> Vec<Dial> {
    let entries = chunk_entries(meta, raw);
    if entries.len() < meta.chunks {
        tracing::warn!(
            "{} of {} chunks are missing, skipping",
            meta.chunks - entries.len(),
            meta.chunks
        );
    }

    let mut dials = Vec::new();
    for (index, value) in entries {
        match serde_json::from_value::<Vec<Dial>>(value.clone()) {
            Ok(chunk) => dials.extend(chunk),
            Err(e) => tracing::warn!("Chunk {} is malformed: {}", index, e),
        }
    }
    if dials.len() != meta.count {
        tracing::warn!(
            "Reassembled {} dials but metadata records {}",
            dials.len(),
            meta.count
        );
    }
    dials
}

/// Like [`join_chunks`], but every chunk must be present and readable and
/// the total must match `meta.count`. The error names the first problem.
pub fn join_chunks_strict(
    meta: &ChunkMeta,
    raw: &Map<String, Value>,
) -> std::result::Result<Vec<Dial>, String> {
    let entries = chunk_entries(meta, raw);
    if entries.len() != meta.chunks {
        return Err(format!(
            "metadata lists {} chunks but {} are present",
            meta.chunks,
            entries.len()
        ));
    }

    let mut dials = Vec::new();
    for (index, value) in entries {
        let chunk: Vec<Dial> = serde_json::from_value(value.clone())
            .map_err(|e| format!("chunk {index} is malformed: {e}"))?;
        dials.extend(chunk);
    }
    if dials.len() != meta.count {
        return Err(format!(
            "metadata records {} shortcuts but the chunks hold {}",
            meta.count,
            dials.len()
        ));
    }
    Ok(dials)
}

/// True when a tier dump holds only the pre-chunking single-key list.
pub fn is_legacy_format(raw: &Map<String, Value>) -> bool {
    !raw.contains_key(META_KEY) && raw.get(LEGACY_KEY).is_some_and(Value::is_array)
}

/// Which layout a tier dump was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredLayout {
    Chunked(ChunkMeta),
    Legacy,
    Empty,
}

impl StoredLayout {
    pub fn detect(raw: &Map<String, Value>) -> Self {
        if let Some(meta) = raw.get(META_KEY) {
            match serde_json::from_value::<ChunkMeta>(meta.clone()) {
                Ok(meta) => return StoredLayout::Chunked(meta),
                Err(e) => tracing::warn!("Unreadable chunk metadata: {}", e),
            }
        }
        if is_legacy_format(raw) {
            StoredLayout::Legacy
        } else {
            StoredLayout::Empty
        }
    }
}

/// Rebuild the dial list from a tier dump.
///
/// Returns None when the dump holds no dial data at all.
pub fn decode_dials(raw: &Map<String, Value>) -> Option<Vec<Dial>> {
    match StoredLayout::detect(raw) {
        StoredLayout::Chunked(meta) => Some(join_chunks(&meta, raw)),
        StoredLayout::Legacy => {
            let value = raw.get(LEGACY_KEY)?;
            match serde_json::from_value::<Vec<Dial>>(value.clone()) {
                Ok(dials) => Some(dials),
                Err(e) => {
                    tracing::warn!("Legacy dial list is malformed: {}", e);
                    None
                }
            }
        }
        StoredLayout::Empty => None,
    }
}

/// Tier entries for a full rewrite of `dials`: metadata plus one key per
/// chunk.
pub fn encode_dials(
    dials: &[Dial],
    max_chunk_bytes: usize,
) -> Result<(ChunkMeta, Map<String, Value>)> {
    let chunks = split_into_chunks(dials, max_chunk_bytes)?;
    let meta = ChunkMeta {
        count: dials.len(),
        chunks: chunks.len(),
        version: FORMAT_VERSION,
    };

    let mut entries = Map::new();
    entries.insert(META_KEY.to_string(), serde_json::to_value(meta)?);
    for (index, chunk) in chunks.iter().enumerate() {
        entries.insert(chunk_key(index), serde_json::to_value(chunk)?);
    }
    Ok((meta, entries))
}

/// Keys in `existing` that a rewrite producing `meta` leaves behind:
/// chunks at or past the new count, and the legacy list.
pub fn stale_keys<'a, I>(existing: I, meta: &ChunkMeta) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    existing
        .into_iter()
        .filter(|key| {
            key.as_str() == LEGACY_KEY
                || parse_chunk_key(key).is_some_and(|index| index >= meta.chunks)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dial(i: usize) -> Dial {
        Dial {
            name: format!("Site {i}"),
            url: format!("https://site{i}.example"),
            icon: String::new(),
        }
    }

    /// A dial whose compact JSON is exactly `bytes` long.
    fn dial_of_size(i: usize, bytes: usize) -> Dial {
        let mut d = dial(i);
        let base = quota::size_of(&d).unwrap();
        d.name.push_str(&"x".repeat(bytes - base));
        assert_eq!(quota::size_of(&d).unwrap(), bytes);
        d
    }

    #[test]
    fn test_single_dial_single_chunk() {
        let dials = vec![Dial {
            name: "Google".to_string(),
            url: "https://www.google.com".to_string(),
            icon: String::new(),
        }];
        let (meta, entries) = encode_dials(&dials, 7000).unwrap();

        assert_eq!(meta, ChunkMeta { count: 1, chunks: 1, version: 2 });
        assert_eq!(entries[META_KEY], json!({"count": 1, "chunks": 1, "version": 2}));
        assert!(entries.contains_key("dials_0"));
        assert!(!entries.contains_key("dials_1"));
    }

    #[test]
    fn test_fifty_dials_split_in_two() {
        let dials: Vec<Dial> = (0..50).map(|i| dial_of_size(i, 200)).collect();
        let chunks = split_into_chunks(&dials, 7000).unwrap();

        assert_eq!(chunks.len(), 2);
        // 2 + 34 * 200 + 33 = 6835; a 35th dial would need 7036
        assert_eq!(chunks[0].len(), 34);
        assert_eq!(chunks[1].len(), 16);

        let (meta, raw) = encode_dials(&dials, 7000).unwrap();
        assert_eq!(meta, ChunkMeta { count: 50, chunks: 2, version: FORMAT_VERSION });
        assert_eq!(join_chunks(&meta, &raw), dials);
    }

    #[test]
    fn test_chunks_respect_budget() {
        let dials: Vec<Dial> = (0..120).map(|i| dial_of_size(i, 70 + (i * 7) % 80)).collect();
        for budget in [160, 400, 1024, 7168] {
            let chunks = split_into_chunks(&dials, budget).unwrap();
            for chunk in &chunks {
                assert!(!chunk.is_empty());
                assert!(quota::size_of(chunk).unwrap() <= budget);
            }
            let flat: Vec<Dial> = chunks.into_iter().flatten().collect();
            assert_eq!(flat, dials);
        }
    }

    #[test]
    fn test_oversized_dial_gets_own_chunk() {
        let dials = vec![dial_of_size(0, 100), dial_of_size(1, 900), dial_of_size(2, 100)];
        let chunks = split_into_chunks(&dials, 500).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], vec![dials[1].clone()]);
        assert!(quota::size_of(&chunks[1]).unwrap() > 500);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_into_chunks(&[], 7000).unwrap().is_empty());
        let (meta, entries) = encode_dials(&[], 7000).unwrap();
        assert_eq!(meta.chunks, 0);
        assert_eq!(entries.len(), 1);
    }

    fn raw_chunks(chunks: &[(&str, Value)]) -> Map<String, Value> {
        chunks.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_join_skips_missing_chunk() {
        let meta = ChunkMeta { count: 3, chunks: 3, version: FORMAT_VERSION };
        let raw = raw_chunks(&[
            ("dials_0", json!([dial(0)])),
            ("dials_2", json!([dial(2)])),
        ]);
        assert_eq!(join_chunks(&meta, &raw), vec![dial(0), dial(2)]);
        assert!(join_chunks_strict(&meta, &raw).is_err());
    }

    #[test]
    fn test_join_orders_by_index_not_key() {
        let dials: Vec<Dial> = (0..12).map(|i| dial_of_size(i, 100)).collect();
        let (meta, raw) = encode_dials(&dials, 110).unwrap();
        assert_eq!(meta.chunks, 12);
        // "dials_10" sorts before "dials_2" as a key
        assert_eq!(join_chunks(&meta, &raw), dials);
        assert_eq!(join_chunks_strict(&meta, &raw).unwrap(), dials);
    }

    #[test]
    fn test_join_ignores_chunks_past_meta() {
        let meta = ChunkMeta { count: 1, chunks: 1, version: FORMAT_VERSION };
        let raw = raw_chunks(&[
            ("dials_0", json!([dial(0)])),
            ("dials_1", json!([dial(1)])),
        ]);
        assert_eq!(join_chunks(&meta, &raw), vec![dial(0)]);
    }

    #[test]
    fn test_join_with_implausible_meta_does_not_trust_it() {
        let huge = ChunkMeta { count: usize::MAX, chunks: usize::MAX, version: FORMAT_VERSION };
        let raw = raw_chunks(&[("dials_0", json!([dial(0)]))]);

        assert_eq!(join_chunks(&huge, &raw), vec![dial(0)]);
        assert!(join_chunks_strict(&huge, &raw).is_err());

        let zero_chunks = ChunkMeta { count: usize::MAX, chunks: 0, version: FORMAT_VERSION };
        assert!(join_chunks(&zero_chunks, &Map::new()).is_empty());
        assert!(join_chunks_strict(&zero_chunks, &Map::new()).is_err());
    }

    #[test]
    fn test_strict_join_rejects_malformed_chunk_and_count_mismatch() {
        let meta = ChunkMeta { count: 2, chunks: 2, version: FORMAT_VERSION };
        let malformed = raw_chunks(&[("dials_0", json!([dial(0)])), ("dials_1", json!("garbage"))]);
        assert!(join_chunks_strict(&meta, &malformed).is_err());

        let short = raw_chunks(&[("dials_0", json!([dial(0)])), ("dials_1", json!([]))]);
        assert!(join_chunks_strict(&meta, &short).is_err());
    }

    #[test]
    fn test_legacy_detection() {
        let mut raw = Map::new();
        raw.insert(LEGACY_KEY.to_string(), json!([]));
        assert!(is_legacy_format(&raw));
        assert_eq!(StoredLayout::detect(&raw), StoredLayout::Legacy);

        raw.insert(META_KEY.to_string(), json!({"count": 0, "chunks": 0, "version": 2}));
        assert!(!is_legacy_format(&raw));
        assert!(matches!(StoredLayout::detect(&raw), StoredLayout::Chunked(_)));

        assert!(!is_legacy_format(&Map::new()));
        assert_eq!(StoredLayout::detect(&Map::new()), StoredLayout::Empty);
    }

    #[test]
    fn test_decode_prefers_chunks_over_legacy() {
        let (_, mut raw) = encode_dials(&[dial(1)], 7000).unwrap();
        raw.insert(LEGACY_KEY.to_string(), serde_json::to_value(vec![dial(9)]).unwrap());
        assert_eq!(decode_dials(&raw), Some(vec![dial(1)]));
    }

    #[test]
    fn test_decode_legacy_list() {
        let mut raw = Map::new();
        raw.insert(LEGACY_KEY.to_string(), serde_json::to_value(vec![dial(0), dial(1)]).unwrap());
        assert_eq!(decode_dials(&raw), Some(vec![dial(0), dial(1)]));
    }

    #[test]
    fn test_decode_skips_malformed_chunk() {
        let dials = [dial_of_size(0, 300), dial_of_size(1, 300)];
        let (_, mut raw) = encode_dials(&dials, 400).unwrap();
        raw.insert("dials_0".to_string(), json!("garbage"));
        let dials = decode_dials(&raw).unwrap();
        assert_eq!(dials.len(), 1);
        assert_eq!(dials[0].url, "https://site1.example");
    }

    #[test]
    fn test_parse_chunk_key() {
        assert_eq!(parse_chunk_key("dials_0"), Some(0));
        assert_eq!(parse_chunk_key("dials_12"), Some(12));
        assert_eq!(parse_chunk_key("dials_meta"), None);
        assert_eq!(parse_chunk_key("dials_"), None);
        assert_eq!(parse_chunk_key("dials_+1"), None);
        assert_eq!(parse_chunk_key("dials_01"), None);
        assert_eq!(parse_chunk_key("dials"), None);
    }

    #[test]
    fn test_stale_keys() {
        let existing: Vec<String> =
            ["dials", "dials_meta", "dials_0", "dials_1", "dials_2", "settings"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        let meta = ChunkMeta { count: 5, chunks: 1, version: FORMAT_VERSION };

        let mut stale = stale_keys(&existing, &meta);
        stale.sort();
        assert_eq!(stale, vec!["dials", "dials_1", "dials_2"]);
    }
}

//! Backup export and import.
//!
//! Exports are `{"dials": [...], "settings": {...}}` with the dial list
//! already de-chunked. Imports accept that shape, a raw dump of the sync
//! tier (chunked or legacy), or a list of `{title, url}` entries written
//! by other speed dial extensions.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunk::{self, LEGACY_KEY, SETTINGS_KEY, StoredLayout};
use crate::dial::Dial;
use crate::error::{Error, Result};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub dials: Vec<Dial>,
    pub settings: Settings,
}

/// An entry in the alternate import shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForeignDial {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportPayload {
    /// Data in this extension's own format
    Native {
        dials: Vec<Dial>,
        settings: Option<Settings>,
    },
    /// Converted from the `title` shape; the caller picks a merge mode
    Foreign { dials: Vec<Dial> },
}

impl ImportPayload {
    pub fn needs_merge_choice(&self) -> bool {
        matches!(self, ImportPayload::Foreign { .. })
    }

    pub fn dials(&self) -> &[Dial] {
        match self {
            ImportPayload::Native { dials, .. } | ImportPayload::Foreign { dials } => dials,
        }
    }
}

/// How imported dials combine with the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMerge {
    Append,
    Replace,
}

/// `speed-dial-backup-YYYY-MM-DD.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("speed-dial-backup-{}.json", date.format("%Y-%m-%d"))
}

pub fn export_json(doc: &ExportDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

pub fn write_export(path: &Path, doc: &ExportDocument) -> anyhow::Result<()> {
    use anyhow::Context;

    let contents = export_json(doc)?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write export file {}", path.display()))?;
    Ok(())
}

pub fn read_import(path: &Path) -> anyhow::Result<ImportPayload> {
    use anyhow::Context;

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file {}", path.display()))?;
    Ok(parse_import(&contents)?)
}

/// True when `dials` is a list whose first entry uses `title` instead
/// of `name`.
pub fn is_foreign_format(root: &Map<String, Value>) -> bool {
    root.get(LEGACY_KEY)
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("title") && !first.contains_key("name"))
}

/// Map foreign entries onto dials. Icons are never carried over.
pub fn convert_foreign(entries: &[ForeignDial]) -> Vec<Dial> {
    entries
        .iter()
        .map(|entry| Dial {
            name: entry.title.clone(),
            url: entry.url.clone(),
            icon: String::new(),
        })
        .collect()
}

/// The dial list an import would leave behind.
pub fn merge(existing: &[Dial], incoming: &[Dial], mode: ImportMerge) -> Vec<Dial> {
    match mode {
        ImportMerge::Append => existing.iter().chain(incoming).cloned().collect(),
        ImportMerge::Replace => incoming.to_vec(),
    }
}

/// Parse an import file without touching any state.
pub fn parse_import(text: &str) -> Result<ImportPayload> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| Error::ImportParse(format!("not valid JSON: {e}")))?;
    let Value::Object(root) = root else {
        return Err(Error::ImportParse("expected a JSON object".to_string()));
    };

    if is_foreign_format(&root) {
        let entries: Vec<ForeignDial> = serde_json::from_value(root[LEGACY_KEY].clone())
            .map_err(|e| Error::ImportParse(format!("unrecognized entry: {e}")))?;
        return Ok(ImportPayload::Foreign {
            dials: convert_foreign(&entries),
        });
    }

    // Unlike a load, an import with a damaged chunk is refused outright
    let dials = match StoredLayout::detect(&root) {
        StoredLayout::Chunked(meta) => {
            chunk::join_chunks_strict(&meta, &root).map_err(Error::ImportParse)?
        }
        StoredLayout::Legacy => serde_json::from_value(root[LEGACY_KEY].clone())
            .map_err(|e| Error::ImportParse(format!("dial list is malformed: {e}")))?,
        StoredLayout::Empty => {
            return Err(Error::ImportParse("no shortcuts found".to_string()));
        }
    };
    for dial in &dials {
        dial.validate()
            .map_err(|e| Error::ImportParse(e.to_string()))?;
    }

    let settings = root.get(SETTINGS_KEY).map(Settings::merged_over_defaults);
    Ok(ImportPayload::Native { dials, settings })
}

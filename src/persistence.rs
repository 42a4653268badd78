//! Load/save orchestration across the sync and local tiers.
//!
//! A save is a full rewrite: the chunked dial set and settings go to the
//! sync tier when they fit its budget, and the same entries are always
//! mirrored to the local tier. Keys left over from an earlier, longer
//! layout (and the legacy single-key list) are removed after the new
//! entries are written.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::chunk::{self, ChunkMeta, LEGACY_KEY, META_KEY, SETTINGS_KEY};
use crate::config::{Config, QuotaConfig};
use crate::dial::{default_dials, Dial};
use crate::error::{Error, Result};
use crate::quota;
use crate::settings::Settings;
use crate::storage::{KvStore, RedbStore};
use crate::transfer::ExportDocument;

/// Local-tier flag set when the newest data never reached the sync tier.
pub const LOCAL_ONLY_KEY: &str = "local_only";

/// Local-tier digest of the sync data this device last read or wrote.
pub const SYNC_BASE_KEY: &str = "sync_base";

/// Sync usage above this share of the quota is reported as near the limit.
const NEAR_LIMIT_PERCENT: f64 = 80.0;

/// Where loaded data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Sync,
    Local,
    /// Neither tier could be read.
    Defaults,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub dials: Vec<Dial>,
    pub settings: Settings,
    pub source: LoadSource,
    /// Set when data may be missing and the user should be told.
    pub warning: Option<String>,
}

#[derive(Debug)]
pub enum SaveOutcome {
    /// Written to the sync tier (and mirrored locally).
    Synced,
    /// Only the local tier holds the new data; carries why sync was skipped.
    LocalOnly(Error),
    /// Neither tier accepted the data.
    Failed(Error),
}

#[derive(Debug)]
pub struct SaveReport {
    pub outcome: SaveOutcome,
    /// Chunk count of the written layout.
    pub chunks: usize,
}

impl SaveReport {
    pub fn is_synced(&self) -> bool {
        matches!(self.outcome, SaveOutcome::Synced)
    }

    /// Message for the user when the save did not reach the sync tier.
    pub fn warning(&self) -> Option<String> {
        match &self.outcome {
            SaveOutcome::Synced => None,
            SaveOutcome::LocalOnly(Error::QuotaExceeded { .. }) => Some(
                "Data is too large to sync and was saved on this device only. \
                 Remove some shortcuts or simplify SVG icons."
                    .to_string(),
            ),
            SaveOutcome::LocalOnly(e) => {
                Some(format!("Sync failed, saved on this device only: {e}"))
            }
            SaveOutcome::Failed(e) => Some(format!("Could not save shortcuts: {e}")),
        }
    }
}

/// Steps of a save; every save ends in `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    SizeChecking,
    SyncWriting,
    LocalWriting,
    Done,
}

impl SaveState {
    pub fn can_advance_to(self, next: SaveState) -> bool {
        use SaveState::*;
        matches!(
            (self, next),
            (Idle, SizeChecking)
                | (SizeChecking, SyncWriting)
                | (SizeChecking, LocalWriting)
                | (SyncWriting, LocalWriting)
                | (LocalWriting, Done)
        )
    }

    fn advance(&mut self, next: SaveState) {
        debug_assert!(
            self.can_advance_to(next),
            "invalid save transition {:?} -> {:?}",
            self,
            next
        );
        tracing::debug!("save: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Sync and local tier usage, for the settings page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageUsage {
    /// None when the tier could not be queried
    pub sync_bytes: Option<usize>,
    pub local_bytes: Option<usize>,
    pub sync_quota: usize,
}

impl StorageUsage {
    pub fn percent_used(&self) -> Option<f64> {
        self.sync_bytes.map(|bytes| quota::percent_of(bytes, self.sync_quota))
    }

    pub fn near_limit(&self) -> bool {
        self.percent_used().is_some_and(|p| p > NEAR_LIMIT_PERCENT)
    }
}

impl fmt::Display for StorageUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sync_bytes, self.percent_used()) {
            (Some(bytes), Some(percent)) => write!(
                f,
                "{:.2} KB / {:.0} KB ({:.1}%)",
                bytes as f64 / 1024.0,
                self.sync_quota as f64 / 1024.0,
                percent
            ),
            _ => f.write_str("sync usage unavailable"),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    dials: &'a [Dial],
    settings: &'a Settings,
}

/// Everything one save writes.
struct SavePlan {
    meta: ChunkMeta,
    entries: Map<String, Value>,
    /// Serialized size of the whole `{dials, settings}` payload
    estimated: usize,
}

impl SavePlan {
    fn build(dials: &[Dial], settings: &Settings, limits: &QuotaConfig) -> Result<Self> {
        let estimated = quota::size_of(&Payload { dials, settings })?;
        let (meta, mut entries) = chunk::encode_dials(dials, limits.chunk_budget())?;
        entries.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);
        Ok(Self { meta, entries, estimated })
    }

    /// Refuse before writing anything the sync tier would reject.
    fn check_quota(&self, limits: &QuotaConfig) -> Result<()> {
        if self.estimated > limits.sync_budget() {
            return Err(Error::QuotaExceeded {
                estimated: self.estimated,
                budget: limits.sync_budget(),
            });
        }
        for (key, value) in &self.entries {
            let size = quota::item_size(key, value)?;
            if size > limits.per_item_bytes {
                return Err(Error::QuotaExceeded {
                    estimated: size,
                    budget: limits.per_item_bytes,
                });
            }
        }
        Ok(())
    }
}

pub struct Persistence {
    sync: Arc<dyn KvStore>,
    local: Arc<dyn KvStore>,
    quota: QuotaConfig,
    /// Fingerprint of the sync data the in-memory state is based on
    sync_base: Mutex<Option<String>>,
}

impl Persistence {
    pub fn new(sync: Arc<dyn KvStore>, local: Arc<dyn KvStore>, quota: QuotaConfig) -> Self {
        Self {
            sync,
            local,
            quota,
            sync_base: Mutex::new(None),
        }
    }

    /// Use the configured redb file as the local tier.
    pub fn open(config: &Config, sync: Arc<dyn KvStore>) -> anyhow::Result<Self> {
        let local = RedbStore::open_default(&config.storage)?;
        Ok(Self::new(sync, Arc::new(local), config.quota))
    }

    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    /// Read dials and settings, falling back to the local tier and finally
    /// to defaults. Never fails.
    ///
    /// A readable sync tier wins, unless this device's last save was
    /// local-only and nothing has been synced since.
    pub async fn load(&self) -> Loaded {
        let sync = self.sync.get_all().await;
        let local = self.local.get_all().await;

        match (sync, local) {
            (Ok(sync_raw), Ok(local_raw)) => {
                let current = sync_fingerprint(&sync_raw);
                if flag_set(&local_raw) {
                    if recorded_base(&local_raw) == current {
                        tracing::info!(
                            "Newest data was saved locally only, loading from local tier"
                        );
                        self.remember_sync_base(Some(current));
                        return decode(&local_raw, LoadSource::Local);
                    }
                    tracing::info!("Sync tier changed since the last local-only save, using it");
                }
                self.remember_sync_base(Some(current));
                decode(&sync_raw, LoadSource::Sync)
            }
            (Ok(sync_raw), Err(e)) => {
                tracing::warn!("Could not read local tier: {}", e);
                self.remember_sync_base(Some(sync_fingerprint(&sync_raw)));
                decode(&sync_raw, LoadSource::Sync)
            }
            (Err(e), Ok(local_raw)) => {
                tracing::warn!("Could not read sync tier, using local tier: {}", e);
                decode(&local_raw, LoadSource::Local)
            }
            (Err(sync_err), Err(local_err)) => {
                tracing::error!(
                    "Both storage tiers failed, using defaults (sync: {}, local: {})",
                    sync_err,
                    local_err
                );
                Loaded {
                    dials: default_dials(),
                    settings: Settings::default(),
                    source: LoadSource::Defaults,
                    warning: Some(format!(
                        "Saved shortcuts could not be read and defaults are shown: {local_err}"
                    )),
                }
            }
        }
    }

    /// Persist `dials` and `settings`.
    ///
    /// The local mirror is attempted whatever happened on the sync tier.
    /// Callers must not start a second save while one is in flight.
    pub async fn save(&self, dials: &[Dial], settings: &Settings) -> SaveReport {
        let mut state = SaveState::Idle;
        state.advance(SaveState::SizeChecking);

        let plan = match SavePlan::build(dials, settings, &self.quota) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Could not encode shortcuts: {}", e);
                return SaveReport {
                    outcome: SaveOutcome::Failed(e),
                    chunks: 0,
                };
            }
        };

        let sync_result = match plan.check_quota(&self.quota) {
            Ok(()) => {
                state.advance(SaveState::SyncWriting);
                write_tier(self.sync.as_ref(), plan.entries.clone(), &plan.meta).await
            }
            Err(e) => {
                tracing::warn!("Skipping sync tier: {}", e);
                Err(e)
            }
        };

        let base = match &sync_result {
            Ok(()) => {
                let written = sync_fingerprint(&plan.entries);
                self.remember_sync_base(Some(written.clone()));
                Some(written)
            }
            Err(_) => self.sync_base(),
        };

        state.advance(SaveState::LocalWriting);
        let mut local_entries = plan.entries;
        local_entries.insert(LOCAL_ONLY_KEY.to_string(), Value::Bool(sync_result.is_err()));
        if let Some(base) = base {
            local_entries.insert(SYNC_BASE_KEY.to_string(), Value::String(base));
        }
        let local_result = write_tier(self.local.as_ref(), local_entries, &plan.meta).await;
        state.advance(SaveState::Done);

        let outcome = match (sync_result, local_result) {
            (Ok(()), Ok(())) => {
                tracing::info!(
                    "Saved {} shortcuts in {} chunks",
                    plan.meta.count,
                    plan.meta.chunks
                );
                SaveOutcome::Synced
            }
            (Ok(()), Err(e)) => {
                tracing::warn!("Synced, but local backup failed: {}", e);
                SaveOutcome::Synced
            }
            (Err(e), Ok(())) => {
                tracing::warn!("Saved to local tier only: {}", e);
                SaveOutcome::LocalOnly(e)
            }
            (Err(sync_err), Err(local_err)) => {
                tracing::error!(
                    "Save failed on both tiers (sync: {}, local: {})",
                    sync_err,
                    local_err
                );
                SaveOutcome::Failed(local_err)
            }
        };

        SaveReport {
            outcome,
            chunks: plan.meta.chunks,
        }
    }

    /// Clear both tiers, each best-effort, and hand back the defaults.
    pub async fn reset(&self) -> (Vec<Dial>, Settings) {
        for tier in [&self.sync, &self.local] {
            if let Err(e) = tier.clear().await {
                tracing::warn!("Could not clear {} tier: {}", tier.tier_name(), e);
            }
        }
        self.remember_sync_base(None);
        (default_dials(), Settings::default())
    }

    /// Current tier usage; a tier that cannot be queried reports None.
    pub async fn usage(&self) -> StorageUsage {
        let sync_bytes = self
            .sync
            .bytes_in_use(None)
            .await
            .map_err(|e| tracing::warn!("Could not query sync usage: {}", e))
            .ok();
        let local_bytes = self
            .local
            .bytes_in_use(None)
            .await
            .map_err(|e| tracing::warn!("Could not query local usage: {}", e))
            .ok();
        StorageUsage {
            sync_bytes,
            local_bytes,
            sync_quota: self.quota.total_bytes,
        }
    }

    fn sync_base(&self) -> Option<String> {
        match self.sync_base.lock() {
            Ok(base) => base.clone(),
            Err(e) => {
                tracing::warn!("Sync base lock poisoned: {}", e);
                None
            }
        }
    }

    fn remember_sync_base(&self, fingerprint: Option<String>) {
        match self.sync_base.lock() {
            Ok(mut base) => *base = fingerprint,
            Err(e) => tracing::warn!("Sync base lock poisoned: {}", e),
        }
    }

    /// De-chunked snapshot of what `load` sees.
    pub async fn export(&self) -> ExportDocument {
        let loaded = self.load().await;
        ExportDocument {
            dials: loaded.dials,
            settings: loaded.settings,
        }
    }
}

/// Write `entries`, then drop keys the new layout no longer uses.
async fn write_tier(
    tier: &dyn KvStore,
    entries: Map<String, Value>,
    meta: &ChunkMeta,
) -> Result<()> {
    let existing = tier.get_all().await?;
    tier.set_many(entries).await?;

    let stale = chunk::stale_keys(existing.keys(), meta);
    if !stale.is_empty() {
        tracing::debug!("Removing {} stale keys from {} tier", stale.len(), tier.tier_name());
        tier.remove_many(&stale).await?;
    }
    Ok(())
}

fn flag_set(raw: &Map<String, Value>) -> bool {
    raw.get(LOCAL_ONLY_KEY).and_then(Value::as_bool).unwrap_or(false)
}

/// blake3 digest of the dial data and settings in a tier dump, in key
/// order. Keys outside the dial layout are ignored.
fn sync_fingerprint(raw: &Map<String, Value>) -> String {
    let data: BTreeMap<&str, &Value> = raw
        .iter()
        .filter(|(key, _)| {
            matches!(key.as_str(), META_KEY | LEGACY_KEY | SETTINGS_KEY)
                || chunk::parse_chunk_key(key).is_some()
        })
        .map(|(key, value)| (key.as_str(), value))
        .collect();

    let mut hasher = blake3::Hasher::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(value.to_string().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Sync fingerprint stored with the last local save. Missing means the
/// device never saw any sync data.
fn recorded_base(local_raw: &Map<String, Value>) -> String {
    local_raw
        .get(SYNC_BASE_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| sync_fingerprint(&Map::new()))
}

fn decode(raw: &Map<String, Value>, source: LoadSource) -> Loaded {
    let mut dials = chunk::decode_dials(raw)
        .filter(|dials| !dials.is_empty())
        .unwrap_or_else(default_dials);
    for dial in &mut dials {
        if dial.scrub_icon() {
            tracing::warn!("Cleared invalid icon of '{}'", dial.name);
        }
    }

    let settings = raw
        .get(SETTINGS_KEY)
        .map(Settings::merged_over_defaults)
        .unwrap_or_default();

    Loaded {
        dials,
        settings,
        source,
        warning: None,
    }
}

//! Persistence for a speed dial new-tab page.
//!
//! The dial list is split into chunks that fit a quota-limited sync tier,
//! with a device-local tier as backup and fallback. See [`persistence`] for
//! the load/save rules and [`chunk`] for the on-disk layout.

pub mod chunk;
pub mod config;
pub mod dial;
pub mod error;
pub mod persistence;
pub mod quota;
pub mod repository;
pub mod session;
pub mod settings;
pub mod storage;
pub mod transfer;

pub use config::{Config, QuotaConfig};
pub use dial::Dial;
pub use error::{Error, Result};
pub use persistence::{LoadSource, Loaded, Persistence, SaveOutcome, SaveReport};
pub use repository::DialRepository;
pub use session::Session;
pub use settings::{Language, Settings};
pub use storage::{KvStore, MemoryStore, RedbStore};

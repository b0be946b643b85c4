use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

pub const DEFAULT_DB_PATH: &str = "order_draft.db";
pub const DEFAULT_FLUSH_MS: u64 = 500;

/// Where the draft database lives and how eagerly sled flushes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    path: PathBuf,
    temporary: bool,
    flush_every_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            temporary: false,
            flush_every_ms: Some(DEFAULT_FLUSH_MS),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
    /// Drop the database when the handle closes. Meant for previews and tests.
    pub fn set_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
    /// `None` turns background flushing off; writes then land on explicit flush only.
    pub fn set_flush_every_ms(mut self, flush_every_ms: Option<u64>) -> Self {
        self.flush_every_ms = flush_every_ms;
        self
    }
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
    pub fn temporary(&self) -> bool {
        self.temporary
    }
    pub fn flush_every_ms(&self) -> Option<u64> {
        self.flush_every_ms
    }

    /// Read `ORDER_DRAFT_DB_PATH`, `ORDER_DRAFT_TEMPORARY` and `ORDER_DRAFT_FLUSH_MS`.
    /// A flush interval of 0 disables background flushing.
    pub fn from_env() -> Self {
        let flush_ms: u64 = try_load("ORDER_DRAFT_FLUSH_MS", DEFAULT_FLUSH_MS);

        Self {
            path: try_load("ORDER_DRAFT_DB_PATH", PathBuf::from(DEFAULT_DB_PATH)),
            temporary: try_load("ORDER_DRAFT_TEMPORARY", false),
            flush_every_ms: (flush_ms > 0).then_some(flush_ms),
        }
    }

    pub fn open(&self) -> anyhow::Result<sled::Db> {
        sled::Config::new()
            .path(&self.path)
            .temporary(self.temporary)
            .flush_every_ms(self.flush_every_ms)
            .open()
            .with_context(|| format!("failed to open draft store at {}", self.path.display()))
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            default
        }
    }
}

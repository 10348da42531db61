//! Persistence layer for runtime state
//!
//! Keeps the most recently refreshed cookie and the time of the last
//! successful sync across restarts, as a small JSON document.

use crate::cookies::CookieBundle;
use crate::error::Result;
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent state structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentState {
    /// Last known good cookie string (`MM_SID=...; __RequestVerificationToken=...`)
    pub cookie: Option<String>,

    /// When the cookie was obtained
    pub cookie_updated_at: Option<DateTime<Utc>>,

    /// End of the last successful sync
    pub last_sync: Option<DateTime<Utc>>,

    /// Records imported by the last successful sync
    pub last_sync_records: usize,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info("Loaded persistent state from disk");

        Ok(())
    }

    /// Save state to disk, creating the parent directory when needed
    pub fn save(&self) -> Result<()> {
        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(path, contents)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    /// Stored cookie, if it still contains any allow-listed value
    pub fn cookie(&self) -> Option<CookieBundle> {
        self.state
            .cookie
            .as_deref()
            .map(CookieBundle::parse)
            .filter(|b| !b.is_empty())
    }

    /// Remember a freshly obtained cookie
    pub fn record_cookie(&mut self, bundle: &CookieBundle) -> Result<()> {
        self.state.cookie = Some(bundle.to_header_string());
        self.state.cookie_updated_at = Some(Utc::now());
        self.save()
    }

    /// Remember a successful sync
    pub fn record_sync(&mut self, records: usize) -> Result<()> {
        self.state.last_sync = Some(Utc::now());
        self.state.last_sync_records = records;
        self.save()
    }
}

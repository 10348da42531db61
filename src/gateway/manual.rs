//! Manually banked cookies
//!
//! When automated login is blocked, an operator pastes the cookie string
//! copied from the browser's developer tools. It is kept as
//! `{"cookies": "...", "saved_at": "..."}`.

use crate::cookies::CookieBundle;
use crate::error::{PsegError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCookies {
    pub cookies: String,
    #[serde(default)]
    pub saved_at: String,
}

impl SavedCookies {
    /// Allow-listed part of the saved string
    pub fn bundle(&self) -> CookieBundle {
        CookieBundle::parse(&self.cookies)
    }
}

#[derive(Clone)]
pub struct ManualCookieStore {
    path: PathBuf,
    logger: StructuredLogger,
}

impl ManualCookieStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            logger: get_logger("manual_cookies"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved entry, `None` when nothing was saved or the file is unreadable
    pub fn load(&self) -> Option<SavedCookies> {
        if !self.path.exists() {
            return None;
        }
        let parsed = std::fs::read_to_string(&self.path)
            .map_err(PsegError::from)
            .and_then(|s| serde_json::from_str::<SavedCookies>(&s).map_err(PsegError::from));
        match parsed {
            Ok(saved) if !saved.cookies.trim().is_empty() => Some(saved),
            Ok(_) => None,
            Err(e) => {
                self.logger.error(&format!("Error loading cookies: {}", e));
                None
            }
        }
    }

    /// Non-empty banked bundle, if any
    pub fn bundle(&self) -> Option<CookieBundle> {
        self.load().map(|s| s.bundle()).filter(|b| !b.is_empty())
    }

    /// Store a pasted cookie string, trimmed
    pub fn save(&self, cookies: &str) -> Result<SavedCookies> {
        let cookies = cookies.trim();
        if cookies.is_empty() {
            return Err(PsegError::validation("cookies", "cookie string is empty"));
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let saved = SavedCookies {
            cookies: cookies.to_string(),
            saved_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&saved)?)?;
        self.logger
            .info(&format!("Cookies saved at {}", saved.saved_at));
        Ok(saved)
    }
}

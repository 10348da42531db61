//! # psegli - PSEG usage bridge for Home Assistant
//!
//! Obtains session cookies for the utility's smart-energy portal and turns
//! its hourly usage charts into long-term Home Assistant statistics.
//!
//! ## Features
//!
//! - **Cookie Gateway**: scripted browser login over WebDriver, plus a
//!   manual cookie bank for when automation is blocked
//! - **Gateway Discovery**: health probing of candidate gateway addresses
//! - **Usage Client**: hourly chart series fetched with the session cookie
//! - **Continuity Engine**: per-interval readings become monotonic
//!   cumulative totals anchored on what is already stored
//! - **Auth Recovery**: one serialized cookie refresh and retry when the
//!   portal rejects the cookie
//! - **Configuration**: YAML-based configuration with environment overrides
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `cookies`: Credentials and allow-listed cookie bundles
//! - `gateway`: Cookie acquisition (browser flow, manual bank, discovery)
//! - `web`: Gateway HTTP server
//! - `utility`: Smart-energy portal client
//! - `ingest`: Classification and cumulative series construction
//! - `statistics`: Statistics store trait and backends
//! - `coordinator`: Sync orchestration and cookie refresh
//! - `notify`: Operator notifications
//! - `persistence`: State persistence across restarts

pub mod cli;
pub mod config;
pub mod cookies;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod logging;
pub mod notify;
pub mod persistence;
pub mod statistics;
pub mod utility;
pub mod web;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod web_tests;

// Re-export commonly used types
pub use config::Config;
pub use cookies::{CookieBundle, Credential};
pub use coordinator::SyncCoordinator;
pub use error::{PsegError, Result};

//! Smart-energy portal usage API
//!
//! Split into the HTTP client and payload decoding.

pub mod client;
pub mod types;

pub use client::{UsageClient, UsageSource};
pub use types::decode_chart_payload;

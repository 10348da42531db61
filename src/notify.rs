//! Operator notifications
//!
//! Sync problems that need a human (no cookie, rejected cookie) are raised
//! as Home Assistant persistent notifications with fixed ids, so a repeated
//! failure replaces the previous notice instead of stacking.

use crate::config::StatisticsConfig;
use crate::error::{PsegError, Result};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

pub const COOKIE_REQUIRED: &str = "psegli_cookie_required";
pub const COOKIE_REFRESHED: &str = "psegli_cookie_refreshed";
pub const COOKIE_REFRESH_FAILED: &str = "psegli_cookie_refresh_failed";
pub const AUTH_FAILED: &str = "psegli_auth_failed";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification_id: &str, title: &str, message: &str) -> Result<()>;
}

/// `persistent_notification.create` over the Home Assistant REST API
pub struct HomeAssistantNotifier {
    base_url: String,
    token: String,
    http: reqwest::Client,
    logger: StructuredLogger,
}

impl HomeAssistantNotifier {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
            logger: get_logger("notify"),
        })
    }
}

#[async_trait]
impl Notifier for HomeAssistantNotifier {
    async fn notify(&self, notification_id: &str, title: &str, message: &str) -> Result<()> {
        let url = format!(
            "{}/api/services/persistent_notification/create",
            self.base_url
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "title": title,
                "message": message,
                "notification_id": notification_id,
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                self.logger.debug(&format!("Notification {} created", notification_id));
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(PsegError::auth("Home Assistant rejected the access token"))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PsegError::api(format!(
                    "persistent_notification.create failed ({}): {}",
                    status, body
                )))
            }
        }
    }
}

/// Writes notices to the log only
pub struct LogNotifier {
    logger: StructuredLogger,
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self {
            logger: get_logger("notify"),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification_id: &str, title: &str, message: &str) -> Result<()> {
        self.logger
            .with_field("notification_id", notification_id)
            .warn(&format!("{}: {}", title, message));
        Ok(())
    }
}

/// Home Assistant notifier when a token is configured, else log-only
pub fn from_config(config: &StatisticsConfig) -> Result<Box<dyn Notifier>> {
    if config.ha_token.trim().is_empty() {
        Ok(Box::new(LogNotifier::default()))
    } else {
        Ok(Box::new(HomeAssistantNotifier::new(
            &config.ha_url,
            &config.ha_token,
        )?))
    }
}

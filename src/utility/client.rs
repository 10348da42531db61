use super::types::decode_chart_payload;
use crate::config::UtilityConfig;
use crate::cookies::CookieBundle;
use crate::error::{PsegError, Result};
use crate::ingest::SeriesSet;
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT};
use reqwest::{Response, StatusCode, redirect};
use tokio::sync::RwLock;

const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Source of usage data that authenticates with a swappable cookie
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Named hourly series covering the last `days_back` days plus today
    async fn get_usage_data(&self, days_back: u32) -> Result<SeriesSet>;

    /// Cheap authenticated request; `Auth` when the cookie is rejected
    async fn test_connection(&self) -> Result<()>;

    /// Replace the cookie used by subsequent calls
    async fn update_cookies(&self, bundle: CookieBundle);
}

/// Smart-energy portal client
pub struct UsageClient {
    url_root: String,
    http: reqwest::Client,
    cookies: RwLock<CookieBundle>,
    timezone: Tz,
    logger: StructuredLogger,
}

impl UsageClient {
    pub fn new(url_root: &str, bundle: CookieBundle, timeout: std::time::Duration) -> Result<Self> {
        // Redirects are inspected, not followed: a bounce to the login page means the cookie is dead
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            url_root: url_root.trim_end_matches('/').to_string(),
            http,
            cookies: RwLock::new(bundle),
            timezone: chrono_tz::America::New_York,
            logger: get_logger("utility"),
        })
    }

    pub fn from_config(config: &UtilityConfig, bundle: CookieBundle) -> Result<Self> {
        Self::new(
            &config.url_root,
            bundle,
            std::time::Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Zone used to turn `days_back` into calendar dates
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn url_root(&self) -> &str {
        &self.url_root
    }

    pub async fn cookies(&self) -> CookieBundle {
        self.cookies.read().await.clone()
    }

    /// Inclusive local date range requested for `days_back`
    pub fn window(&self, days_back: u32) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        (today - Duration::days(i64::from(days_back)), today)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let bundle = self.cookies.read().await.clone();
        if bundle.is_empty() {
            return Err(PsegError::auth("no cookie available"));
        }
        let url = format!("{}{}", self.url_root, path);
        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(COOKIE, bundle.to_header_string())
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, "application/json, text/html;q=0.9")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(token) = bundle.get("__RequestVerificationToken") {
            request = request.header("__RequestVerificationToken", token);
        }
        let response = request.send().await?;
        check_auth(&response)?;
        Ok(response)
    }
}

/// Map rejected-session responses to `Auth`
fn check_auth(response: &Response) -> Result<()> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PsegError::auth(format!("session rejected ({})", status)));
    }
    if status.is_redirection() {
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if location.contains("login") || location.contains("/account") || location.is_empty() {
            return Err(PsegError::auth(format!(
                "redirected to login ({})",
                if location.is_empty() { "no location" } else { location.as_str() }
            )));
        }
        return Err(PsegError::api(format!("unexpected redirect to {}", location)));
    }
    Ok(())
}

#[async_trait]
impl UsageSource for UsageClient {
    async fn get_usage_data(&self, days_back: u32) -> Result<SeriesSet> {
        let (start, end) = self.window(days_back);
        self.logger.info(&format!(
            "Fetching usage {} .. {} ({} days back)",
            start, end, days_back
        ));

        let response = self
            .get(
                "/Dashboard/Chart",
                &[
                    ("start", start.format("%Y-%m-%d").to_string()),
                    ("end", end.format("%Y-%m-%d").to_string()),
                    ("interval", "Hourly".to_string()),
                ],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            self.logger
                .error(&format!("Usage API error: {}", status));
            return Err(PsegError::api(format!("usage request failed: {}", status)));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        if is_html {
            // The portal serves its login page with 200 once the session is gone
            return Err(PsegError::auth("received HTML instead of chart data"));
        }

        let body: serde_json::Value = response.json().await?;
        let series = decode_chart_payload(&body, &self.logger)?;
        self.logger
            .info(&format!("Received {} series", series.len()));
        Ok(series)
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self.get("/Dashboard", &[]).await?;
        let status = response.status();
        if status.is_success() {
            self.logger.info("Connection test successful");
            Ok(())
        } else {
            Err(PsegError::api(format!("connection test failed: {}", status)))
        }
    }

    async fn update_cookies(&self, bundle: CookieBundle) {
        let mut slot = self.cookies.write().await;
        *slot = bundle.restricted();
        self.logger.info(&format!(
            "Cookie updated ({} values)",
            slot.len()
        ));
    }
}

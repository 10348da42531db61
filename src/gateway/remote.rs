//! Client side of the gateway HTTP API

use super::discovery::GatewayDiscovery;
use super::flow::AcquireOutcome;
use super::{CookieSource, GatewayResponse, LoginRequest};
use crate::config::GatewayConfig;
use crate::cookies::{CookieBundle, Credential};
use crate::error::{PsegError, Result};
use crate::logging::{StructuredLogger, get_logger, redact};
use async_trait::async_trait;
use std::time::Duration;

/// Obtains cookies from a gateway running elsewhere (usually the add-on)
pub struct RemoteGateway {
    discovery: GatewayDiscovery,
    http: reqwest::Client,
    login_timeout: Duration,
    manual_timeout: Duration,
    logger: StructuredLogger,
}

impl RemoteGateway {
    pub fn new(discovery: GatewayDiscovery, login_timeout: Duration, manual_timeout: Duration) -> Result<Self> {
        Ok(Self {
            discovery,
            http: reqwest::Client::builder().build()?,
            login_timeout,
            manual_timeout,
            logger: get_logger("remote_gateway"),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Self::new(
            GatewayDiscovery::from_config(config)?,
            Duration::from_secs(config.login_timeout_secs),
            Duration::from_secs(config.manual_cookies_timeout_secs),
        )
    }

    pub fn discovery(&self) -> &GatewayDiscovery {
        &self.discovery
    }

    /// `GET /cookies/get`
    pub async fn manual_cookies(&self, base_url: &str) -> Result<Option<CookieBundle>> {
        let body: GatewayResponse = self
            .http
            .get(format!("{}/cookies/get", base_url))
            .timeout(self.manual_timeout)
            .send()
            .await?
            .json()
            .await?;
        Ok(body
            .success
            .then_some(body.cookies)
            .flatten()
            .map(|c| CookieBundle::parse(&c))
            .filter(|b| !b.is_empty()))
    }

    /// `POST /login`
    pub async fn login(&self, base_url: &str, credential: &Credential) -> Result<AcquireOutcome> {
        let response = self
            .http
            .post(format!("{}/login", base_url))
            .timeout(self.login_timeout)
            .json(&LoginRequest {
                username: credential.username.clone(),
                password: credential.password.clone(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PsegError::api(format!(
                "gateway login answered {}",
                response.status()
            )));
        }
        let body: GatewayResponse = response.json().await?;
        if body.success {
            let bundle = body
                .cookies
                .as_deref()
                .map(CookieBundle::parse)
                .unwrap_or_default();
            if !bundle.is_empty() {
                return Ok(AcquireOutcome::Cookies(bundle));
            }
        }
        let reason = body.error.unwrap_or_else(|| "Login failed".to_string());
        Ok(if body.rejected {
            AcquireOutcome::Rejected(reason)
        } else {
            AcquireOutcome::Failed(reason)
        })
    }
}

#[async_trait]
impl CookieSource for RemoteGateway {
    async fn is_available(&self) -> bool {
        self.discovery.probe().await.is_some()
    }

    async fn fetch(&self, credential: &Credential) -> AcquireOutcome {
        let Some(base) = self.discovery.probe().await else {
            self.logger.warn("Gateway not available");
            return AcquireOutcome::Failed("gateway unreachable".to_string());
        };

        match self.manual_cookies(&base).await {
            Ok(Some(bundle)) => {
                self.logger.info(&format!(
                    "Using manually saved cookies: {}",
                    redact(&bundle.to_header_string())
                ));
                return AcquireOutcome::Cookies(bundle);
            }
            Ok(None) => self.logger.debug("No manual cookies saved"),
            Err(e) => self.logger.debug(&format!("Manual cookie check failed: {}", e)),
        }

        self.logger.info("Requesting fresh cookies from gateway");
        match self.login(&base, credential).await {
            Ok(AcquireOutcome::Cookies(bundle)) => {
                self.logger.info("Successfully obtained fresh cookies from gateway");
                AcquireOutcome::Cookies(bundle)
            }
            Ok(other) => {
                self.logger.warn(&format!("Gateway login did not yield cookies: {:?}", other));
                self.logger.warn(&format!(
                    "Tip: save cookies manually at {}/cookies",
                    base
                ));
                other
            }
            Err(e) => {
                self.logger.error(&format!("Error getting cookies from gateway: {}", e));
                self.logger.warn(&format!(
                    "Tip: save cookies manually at {}/cookies",
                    base
                ));
                AcquireOutcome::Failed(e.to_string())
            }
        }
    }
}

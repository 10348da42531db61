//! Cookie acquisition gateway
//!
//! [`CookieGateway`] is the server side: it hands out banked cookies or runs
//! the scripted portal login. [`RemoteGateway`] is the client side used by
//! the sync process. Both implement [`CookieSource`].

pub mod browser;
pub mod discovery;
pub mod flow;
pub mod manual;
pub mod remote;
pub mod webdriver;

pub use browser::{
    BrowserCookie, BrowserLauncher, BrowserSession, DirectResponse, ObservedRequest, SessionGuard,
};
pub use discovery::{Clock, DiscoveryCache, GatewayDiscovery, SystemClock};
pub use flow::{AcquireOutcome, LoginFlow, LoginStep, PortalUrls};
pub use manual::{ManualCookieStore, SavedCookies};
pub use remote::RemoteGateway;
pub use webdriver::WebDriverLauncher;

use crate::config::{GatewayConfig, StepTimeouts};
use crate::cookies::Credential;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger, redact};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /login`
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `{success, cookies?, error?}` as returned by `/login` and `/cookies/get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the portal refused the credentials
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rejected: bool,
}

impl GatewayResponse {
    pub fn from_outcome(outcome: &AcquireOutcome) -> Self {
        match outcome {
            AcquireOutcome::Cookies(bundle) => Self {
                success: true,
                cookies: Some(bundle.to_header_string()),
                ..Self::default()
            },
            AcquireOutcome::Empty => Self::failure("Login failed"),
            AcquireOutcome::Rejected(reason) => Self {
                rejected: true,
                ..Self::failure(reason.clone())
            },
            AcquireOutcome::Failed(reason) => Self::failure(reason.clone()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Anything that can hand out a fresh cookie bundle
#[async_trait]
pub trait CookieSource: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn fetch(&self, credential: &Credential) -> AcquireOutcome;
}

/// Server-side acquisition: manual bank first, then a browser login
pub struct CookieGateway {
    launcher: Arc<dyn BrowserLauncher>,
    manual: ManualCookieStore,
    urls: PortalUrls,
    timeouts: StepTimeouts,
    logger: StructuredLogger,
}

impl CookieGateway {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        manual: ManualCookieStore,
        urls: PortalUrls,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            launcher,
            manual,
            urls,
            timeouts,
            logger: get_logger("gateway"),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let launcher = WebDriverLauncher::new(&config.webdriver_url, config.headless)?;
        Ok(Self::new(
            Arc::new(launcher),
            ManualCookieStore::new(&config.manual_cookie_file),
            PortalUrls::default(),
            config.timeouts.clone(),
        ))
    }

    pub fn manual(&self) -> &ManualCookieStore {
        &self.manual
    }

    /// Obtain cookies for `credential`
    ///
    /// No retries. The browser session is closed whatever the outcome.
    pub async fn acquire(&self, credential: &Credential) -> AcquireOutcome {
        if let Some(bundle) = self.manual.bundle() {
            self.logger.info(&format!(
                "Using manually saved cookies: {}",
                redact(&bundle.to_header_string())
            ));
            return AcquireOutcome::Cookies(bundle);
        }

        let logger = self.logger.for_run();
        logger.info(&format!("Starting login for {}", credential.username));

        let mut guard = match self.launcher.launch().await {
            Ok(session) => SessionGuard::new(session),
            Err(e) => {
                logger.error(&format!("Browser launch failed: {}", e));
                return AcquireOutcome::Failed(e.to_string());
            }
        };

        let outcome = match guard.session() {
            Some(session) => {
                let mut flow =
                    LoginFlow::new(session, credential, &self.urls, &self.timeouts, &logger);
                let outcome = flow.run().await;
                logger.debug(&format!("Login flow took {} transitions", flow.trace().len()));
                outcome
            }
            None => AcquireOutcome::Failed("browser session already closed".to_string()),
        };

        if let Err(e) = guard.close().await {
            logger.warn(&format!("Browser close failed: {}", e));
        }

        match &outcome {
            AcquireOutcome::Cookies(bundle) => logger.info(&format!(
                "Captured {} cookies: {}",
                bundle.len(),
                redact(&bundle.to_header_string())
            )),
            AcquireOutcome::Empty => logger.warn("Login completed but no cookies were captured"),
            AcquireOutcome::Rejected(reason) => logger.warn(&format!("Credentials rejected: {}", reason)),
            AcquireOutcome::Failed(reason) => logger.warn(&format!("Login failed: {}", reason)),
        }
        outcome
    }
}

#[async_trait]
impl CookieSource for CookieGateway {
    async fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, credential: &Credential) -> AcquireOutcome {
        self.acquire(credential).await
    }
}

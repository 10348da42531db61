//! Browser automation seam
//!
//! The login flow drives a [`BrowserSession`]; production sessions come from
//! the WebDriver launcher, tests script their own.

use crate::error::Result;
use crate::logging::get_logger;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// A request the page issued, as seen by the browser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedRequest {
    pub method: String,
    pub url: String,
    /// Header names are lower-cased
    pub headers: BTreeMap<String, String>,
}

impl ObservedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// One cookie from the browser jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Status and redirect target of a request issued outside the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectResponse {
    pub status: u16,
    pub location: Option<String>,
}

/// A live browser tab
///
/// Waiting methods fail with `NavigationTimeout` when their deadline passes.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until any element matching the selector list exists
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    async fn click(&mut self, selector: &str) -> Result<()>;

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()>;

    /// Wait until the current URL contains `needle`
    async fn wait_for_url(&mut self, needle: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Every cookie in the jar, across domains
    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>>;

    /// Requests issued since the session started
    async fn observed_requests(&mut self) -> Result<Vec<ObservedRequest>>;

    /// Issue a GET without following redirects
    async fn get_direct(&mut self, url: &str, headers: &[(String, String)]) -> Result<DirectResponse>;

    /// Release the browser; called on every exit path
    async fn close(&mut self) -> Result<()>;
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Owns a launched session and closes it on every exit path
///
/// [`SessionGuard::close`] closes in place. If the guard is dropped first
/// (the acquiring future was cancelled), closing moves to a spawned task.
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// The guarded session; `None` once closed
    pub fn session(&mut self) -> Option<&mut (dyn BrowserSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub async fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let logger = get_logger("browser");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                logger.warn("Login abandoned, closing browser session in the background");
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        get_logger("browser").warn(&format!("Browser close failed: {}", e));
                    }
                });
            }
            Err(_) => logger.error("Login abandoned outside a runtime, browser session leaked"),
        }
    }
}

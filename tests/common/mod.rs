//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use psegli::config::StepTimeouts;
use psegli::error::{PsegError, Result};
use psegli::gateway::flow::{
    LOGIN_BUTTON_SELECTOR, PASSWORD_SELECTOR, SUBMIT_SELECTOR, USERNAME_SELECTOR,
};
use psegli::gateway::{
    BrowserCookie, BrowserLauncher, BrowserSession, DirectResponse, ObservedRequest,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ID_LOGIN_URL: &str = "https://id.myaccount.nj.pseg.com/oauth2/default/v1/authorize?client_id=x";
pub const DASHBOARDS_URL: &str = "https://myaccount.nj.pseg.com/dashboards/exceptionaldashboard";
pub const SMART_ENERGY_URL: &str = "https://mysmartenergy.nj.pseg.com/Dashboard?sso=1";

/// How the fake portal behaves
#[derive(Debug, Clone, Default)]
pub struct BrowserScript {
    /// Selectors that exist on every page
    pub present: BTreeSet<String>,
    /// URLs whose navigation times out
    pub fail_goto: BTreeSet<String>,
    /// URLs whose navigation never returns
    pub stall_goto: BTreeSet<String>,
    /// Navigation target -> URL the browser ends up on
    pub redirects: BTreeMap<String, String>,
    /// Clicked selector -> URL the browser ends up on
    pub on_click: BTreeMap<String, String>,
    pub jar: Vec<BrowserCookie>,
    pub requests: Vec<ObservedRequest>,
    pub direct: Option<DirectResponse>,
}

impl BrowserScript {
    /// A portal where every step works
    pub fn happy() -> Self {
        let mut script = Self::default();
        for selector in [
            LOGIN_BUTTON_SELECTOR,
            USERNAME_SELECTOR,
            PASSWORD_SELECTOR,
            SUBMIT_SELECTOR,
        ] {
            script.present.insert(selector.to_string());
        }
        script
            .on_click
            .insert(LOGIN_BUTTON_SELECTOR.to_string(), ID_LOGIN_URL.to_string());
        script
            .on_click
            .insert(SUBMIT_SELECTOR.to_string(), DASHBOARDS_URL.to_string());
        script.requests = vec![
            request(
                "POST",
                "https://myaccount.nj.pseg.com/dashboards/exceptionaldashboard?handler=widget",
                &[("Referer", DASHBOARDS_URL), ("Accept", "text/html")],
            ),
            request(
                "GET",
                "https://mysmartenergy.nj.pseg.com/Dashboard",
                &[(
                    "Cookie",
                    "MM_SID=sid-from-request; __RequestVerificationToken=tok-1; ASP.NET_SessionId=asp",
                )],
            ),
        ];
        script.jar = vec![
            cookie("MM_SID", "sid-from-jar", ".mysmartenergy.nj.pseg.com"),
            cookie("portal", "p1", ".myaccount.nj.pseg.com"),
            cookie("MM_SID", "elsewhere", ".example.com"),
        ];
        script.direct = Some(DirectResponse {
            status: 302,
            location: Some(SMART_ENERGY_URL.to_string()),
        });
        script
    }
}

pub fn request(method: &str, url: &str, headers: &[(&str, &str)]) -> ObservedRequest {
    ObservedRequest {
        method: method.to_string(),
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect(),
    }
}

pub fn cookie(name: &str, value: &str, domain: &str) -> BrowserCookie {
    BrowserCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: domain.to_string(),
    }
}

/// What the fake browser was asked to do
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub visited: Vec<String>,
    pub clicked: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub direct_calls: Vec<(String, Vec<(String, String)>)>,
    pub closed: usize,
}

pub struct ScriptedBrowser {
    script: BrowserScript,
    log: Arc<Mutex<BrowserLog>>,
    current: String,
}

impl ScriptedBrowser {
    pub fn new(script: BrowserScript, log: Arc<Mutex<BrowserLog>>) -> Self {
        Self {
            script,
            log,
            current: "about:blank".to_string(),
        }
    }

    fn require(&self, selector: &str) -> Result<()> {
        if self.script.present.contains(selector) {
            Ok(())
        } else {
            Err(PsegError::navigation_timeout(
                selector,
                format!("{} not found", selector),
            ))
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.log.lock().unwrap().visited.push(url.to_string());
        if self.script.fail_goto.contains(url) {
            return Err(PsegError::navigation_timeout("goto", url));
        }
        if self.script.stall_goto.contains(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.current = self
            .script
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
        self.require(selector)
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.require(selector)?;
        self.log.lock().unwrap().clicked.push(selector.to_string());
        if let Some(url) = self.script.on_click.get(selector) {
            self.current = url.clone();
        }
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        self.require(selector)?;
        self.log
            .lock()
            .unwrap()
            .filled
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn wait_for_url(&mut self, needle: &str, _timeout: Duration) -> Result<()> {
        if self.current.contains(needle) {
            Ok(())
        } else {
            Err(PsegError::navigation_timeout("wait_for_url", needle))
        }
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>> {
        Ok(self.script.jar.clone())
    }

    async fn observed_requests(&mut self) -> Result<Vec<ObservedRequest>> {
        Ok(self.script.requests.clone())
    }

    async fn get_direct(&mut self, url: &str, headers: &[(String, String)]) -> Result<DirectResponse> {
        self.log
            .lock()
            .unwrap()
            .direct_calls
            .push((url.to_string(), headers.to_vec()));
        self.script
            .direct
            .clone()
            .ok_or_else(|| PsegError::navigation("direct request failed"))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

pub struct ScriptedLauncher {
    pub script: BrowserScript,
    pub log: Arc<Mutex<BrowserLog>>,
    pub launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(script: BrowserScript) -> Self {
        Self {
            script,
            log: Arc::default(),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBrowser::new(
            self.script.clone(),
            self.log.clone(),
        )))
    }
}

/// Millisecond timeouts so failing waits return at once
pub fn fast_timeouts() -> StepTimeouts {
    StepTimeouts {
        navigation_ms: 10,
        selector_ms: 10,
        login_page_ms: 10,
        dashboard_ms: 10,
        settle_ms: 0,
    }
}

/// Serve an axum router on an ephemeral local port
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

//! W3C WebDriver browser sessions (chromedriver)
//!
//! Network requests are read back from Chrome's performance log, cookies
//! across all domains through the DevTools `Network.getAllCookies` command.
//! Playwright-style `:has-text("...")` selectors are translated to XPath.

use super::browser::{BrowserCookie, BrowserLauncher, BrowserSession, DirectResponse, ObservedRequest};
use crate::error::{PsegError, Result};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735fcf5a5d";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches Chrome sessions through a WebDriver endpoint
#[derive(Clone)]
pub struct WebDriverLauncher {
    endpoint: String,
    headless: bool,
    http: reqwest::Client,
}

impl WebDriverLauncher {
    pub fn new(endpoint: &str, headless: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            headless,
            http,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
            "--lang=en-US",
        ];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "goog:loggingPrefs": { "performance": "ALL" }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let response = self
            .http
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities())
            .send()
            .await
            .map_err(|e| PsegError::navigation(format!("WebDriver unreachable: {}", e)))?;
        let body: Value = response.json().await?;
        let value = unwrap_value(body, "new session")?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| PsegError::navigation("WebDriver returned no session id"))?
            .to_string();

        let direct = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()?;

        let logger = get_logger("webdriver").with_field("session", &session_id[..session_id.len().min(8)]);
        logger.info("Browser session started");
        Ok(Box::new(WebDriverSession {
            base: format!("{}/session/{}", self.endpoint, session_id),
            http: self.http.clone(),
            direct,
            requests: BTreeMap::new(),
            order: Vec::new(),
            closed: false,
            logger,
        }))
    }
}

/// One Chrome tab driven over WebDriver
pub struct WebDriverSession {
    base: String,
    http: reqwest::Client,
    direct: reqwest::Client,
    /// Requests by DevTools request id
    requests: BTreeMap<String, ObservedRequest>,
    order: Vec<String>,
    closed: bool,
    logger: StructuredLogger,
}

impl WebDriverSession {
    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let body: Value = response.json().await?;
        unwrap_value(body, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.command(reqwest::Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.command(reqwest::Method::GET, path, None).await
    }

    /// First element matching any alternative of the selector list
    async fn find_first(&self, selector: &str) -> Result<Option<String>> {
        for (using, value) in locators(selector) {
            match self
                .post("/element", json!({"using": using, "value": value}))
                .await
            {
                Ok(found) => {
                    if let Some(id) = found[ELEMENT_KEY].as_str() {
                        return Ok(Some(id.to_string()));
                    }
                }
                Err(PsegError::Navigation { message }) if message.contains("no such element") => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn require(&self, selector: &str) -> Result<String> {
        self.find_first(selector)
            .await?
            .ok_or_else(|| PsegError::navigation(format!("no element matches {}", selector)))
    }

    /// Drain the performance log into the request table
    async fn drain_performance_log(&mut self) -> Result<()> {
        let entries = self.post("/se/log", json!({"type": "performance"})).await?;
        for entry in entries.as_array().into_iter().flatten() {
            let Some(message) = entry["message"].as_str() else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<Value>(message) else {
                continue;
            };
            self.absorb_devtools_event(&parsed["message"]);
        }
        Ok(())
    }

    fn absorb_devtools_event(&mut self, event: &Value) {
        let params = &event["params"];
        let Some(id) = params["requestId"].as_str() else {
            return;
        };
        match event["method"].as_str() {
            Some("Network.requestWillBeSent") => {
                let request = &params["request"];
                let entry = self.entry(id);
                entry.method = request["method"].as_str().unwrap_or("GET").to_string();
                entry.url = request["url"].as_str().unwrap_or_default().to_string();
                merge_headers(&mut entry.headers, &request["headers"]);
            }
            // Carries the Cookie header the renderer does not see
            Some("Network.requestWillBeSentExtraInfo") => {
                let entry = self.entry(id);
                merge_headers(&mut entry.headers, &params["headers"]);
            }
            _ => {}
        }
    }

    fn entry(&mut self, id: &str) -> &mut ObservedRequest {
        if !self.requests.contains_key(id) {
            self.order.push(id.to_string());
        }
        self.requests.entry(id.to_string()).or_default()
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.post(
            "/timeouts",
            json!({"pageLoad": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)}),
        )
        .await?;
        self.logger.debug(&format!("Navigating to {}", url));
        match self.post("/url", json!({"url": url})).await {
            Ok(_) => Ok(()),
            Err(PsegError::Navigation { message }) if message.starts_with("timeout") => {
                Err(PsegError::navigation_timeout(url, message))
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.find_first(selector).await?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PsegError::navigation_timeout(
                    selector,
                    format!("not found within {:?}", timeout),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let id = self.require(selector).await?;
        self.post(&format!("/element/{}/click", id), json!({}))
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        let id = self.require(selector).await?;
        self.post(&format!("/element/{}/click", id), json!({}))
            .await?;
        self.post(&format!("/element/{}/clear", id), json!({}))
            .await?;
        self.post(&format!("/element/{}/value", id), json!({"text": text}))
            .await?;
        Ok(())
    }

    async fn wait_for_url(&mut self, needle: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.current_url().await?.contains(needle) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PsegError::navigation_timeout(
                    needle,
                    format!("URL not reached within {:?}", timeout),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.get("/url").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>> {
        let all = self
            .post(
                "/goog/cdp/execute",
                json!({"cmd": "Network.getAllCookies", "params": {}}),
            )
            .await;
        let list = match all {
            Ok(value) => value["cookies"].clone(),
            Err(e) => {
                // Only the current page's cookies are reachable without DevTools
                self.logger.debug(&format!("DevTools cookies unavailable: {}", e));
                self.get("/cookie").await?
            }
        };
        Ok(list
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| {
                Some(BrowserCookie {
                    name: c["name"].as_str()?.to_string(),
                    value: c["value"].as_str().unwrap_or_default().to_string(),
                    domain: c["domain"].as_str().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn observed_requests(&mut self) -> Result<Vec<ObservedRequest>> {
        self.drain_performance_log().await?;
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.requests.get(id).cloned())
            .collect())
    }

    async fn get_direct(&mut self, url: &str, headers: &[(String, String)]) -> Result<DirectResponse> {
        let mut request = self.direct.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        Ok(DirectResponse {
            status: response.status().as_u16(),
            location: response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(reqwest::Method::DELETE, "", None).await?;
        self.logger.info("Browser session closed");
        Ok(())
    }
}

/// Pull `value` out of a WebDriver reply, mapping `{"error": ..}` to a navigation error
fn unwrap_value(mut body: Value, what: &str) -> Result<Value> {
    let value = body["value"].take();
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value["message"].as_str().unwrap_or_default();
        return Err(PsegError::navigation(format!("{}: {} ({})", error, message, what)));
    }
    Ok(value)
}

fn merge_headers(target: &mut BTreeMap<String, String>, headers: &Value) {
    if let Some(map) = headers.as_object() {
        for (k, v) in map {
            if let Some(v) = v.as_str() {
                target.insert(k.to_ascii_lowercase(), v.to_string());
            }
        }
    }
}

/// Split a selector list into WebDriver locators
pub fn locators(selector: &str) -> Vec<(&'static str, String)> {
    selector
        .split(", ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|alt| match alt.split_once(":has-text(") {
            Some((css, rest)) => {
                let text = rest.trim_end_matches(')').trim_matches('"');
                ("xpath", has_text_xpath(css, text))
            }
            None => ("css selector", alt.to_string()),
        })
        .collect()
}

/// `tag[attr="v"]` plus visible text as an XPath expression
fn has_text_xpath(css: &str, text: &str) -> String {
    let (tag, mut rest) = match css.find('[') {
        Some(i) => (&css[..i], &css[i..]),
        None => (css, ""),
    };
    let tag = if tag.is_empty() { "*" } else { tag };
    let mut xpath = format!("//{}", tag);
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(end) = stripped.find(']') else {
            break;
        };
        let attr = &stripped[..end];
        if let Some((name, value)) = attr.split_once('=') {
            xpath.push_str(&format!("[@{}='{}']", name.trim(), value.trim_matches('"')));
        } else {
            xpath.push_str(&format!("[@{}]", attr.trim()));
        }
        rest = &stripped[end + 1..];
    }
    xpath.push_str(&format!("[contains(normalize-space(.), '{}')]", text));
    xpath
}

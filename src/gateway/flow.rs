//! Scripted portal login
//!
//! The login is an explicit state machine. Every state has its own deadline;
//! non-critical states fall back to navigating straight to the next page,
//! critical ones (credential fields, submit) fail the attempt.
//!
//! ```text
//! Navigate(Search) -> Navigate(Home) -> WaitForField(LoginButton)
//!   -> WaitForRedirect(LoginPage) -> WaitForField(Username) -> WaitForField(Password)
//!   -> Submit -> WaitForRedirect(Dashboards) -> Navigate(Handoff)
//!   -> WaitForRedirect(SmartEnergy) -> Done
//! ```

use super::browser::{BrowserCookie, BrowserSession, ObservedRequest};
use crate::config::StepTimeouts;
use crate::cookies::{CAPTURE_NAMES, CookieBundle, Credential};
use crate::logging::StructuredLogger;

/// Portal addresses visited by the flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    pub search: String,
    pub home: String,
    pub login_page: String,
    /// Host of the identity provider
    pub id_host: String,
    /// URL fragment of the account dashboards
    pub dashboards: String,
    /// Fragment of the identity provider's form post
    pub oauth_marker: String,
    /// Fragment of the dashboard widget POST whose headers are replayed
    pub exceptional_marker: String,
    pub exceptional_dashboard: String,
    pub handoff: String,
    pub final_dashboard: String,
    /// Fragment identifying the smart-energy dashboard
    pub smart_energy_dashboard: String,
    /// Host whose request cookies are captured
    pub smart_energy_host: String,
    /// Jar domains sent along with the handoff request
    pub handoff_cookie_domains: Vec<String>,
    /// Jar domains captured after the flow
    pub capture_cookie_domains: Vec<String>,
}

impl Default for PortalUrls {
    fn default() -> Self {
        let domain = "nj.pseg";
        Self {
            search: "https://search.brave.com/search?q=pseg+long+island&source=desktop".to_string(),
            home: format!("https://{}.com/", domain),
            login_page: format!("https://myaccount.{}.com/user/login", domain),
            id_host: format!("id.myaccount.{}.com", domain),
            dashboards: format!("myaccount.{}.com/dashboards", domain),
            oauth_marker: format!("id.myaccount.{}.com/oauth2", domain),
            exceptional_marker: "exceptionaldashboard".to_string(),
            exceptional_dashboard: format!(
                "https://myaccount.{}.com/dashboards/exceptionaldashboard",
                domain
            ),
            handoff: format!("https://myaccount.{}.com/LI/Header/RedirectMDMWidget", domain),
            final_dashboard: format!("https://mysmartenergy.{}.com/Dashboard", domain),
            smart_energy_dashboard: format!("mysmartenergy.{}.com/Dashboard", domain),
            smart_energy_host: format!("mysmartenergy.{}.com", domain),
            handoff_cookie_domains: vec![
                format!(".{}.com", domain),
                format!(".myaccount.{}.com", domain),
            ],
            capture_cookie_domains: vec![
                format!(".{}.com", domain),
                format!(".myaccount.{}.com", domain),
                format!(".mysmartenergy.{}.com", domain),
            ],
        }
    }
}

pub const LOGIN_BUTTON_SELECTOR: &str = "#login";
pub const USERNAME_SELECTOR: &str =
    r#"input[name="username"], input[type="email"], input[type="text"]"#;
pub const PASSWORD_SELECTOR: &str = r#"input[name="password"], input[type="password"]"#;
pub const SUBMIT_SELECTOR: &str =
    r#"button[type="submit"]:has-text("LOG IN"), button:has-text("LOG IN")"#;

/// Upper bound on transitions; the graph has no cycles, so this only trips on a bug
const MAX_TRANSITIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Search,
    Home,
    /// Direct navigation to the login form, bypassing the home page button
    LoginForm,
    /// Hand-off from the account portal to the smart-energy site
    Handoff,
    FinalDashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LoginButton,
    Username,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    LoginPage,
    Dashboards,
    SmartEnergy,
}

/// Why an attempt ended without reaching the final dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: String,
    /// The identity provider kept us on its form after submit
    pub credentials_rejected: bool,
}

impl Failure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            credentials_rejected: false,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            credentials_rejected: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    Navigate(Page),
    WaitForField(Field),
    Submit,
    WaitForRedirect(Landing),
    Done,
    Failed(Failure),
}

impl LoginStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginStep::Done | LoginStep::Failed(_))
    }
}

/// Result of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Allow-listed cookies were captured
    Cookies(CookieBundle),
    /// The flow completed but no allow-listed cookie was seen
    Empty,
    /// The portal refused the credentials
    Rejected(String),
    /// Navigation or browser failure
    Failed(String),
}

impl AcquireOutcome {
    pub fn cookies(&self) -> Option<&CookieBundle> {
        match self {
            AcquireOutcome::Cookies(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AcquireOutcome::Rejected(_))
    }
}

/// One login attempt against one browser session
pub struct LoginFlow<'a> {
    browser: &'a mut dyn BrowserSession,
    credential: &'a Credential,
    urls: &'a PortalUrls,
    timeouts: &'a StepTimeouts,
    logger: &'a StructuredLogger,
    trace: Vec<LoginStep>,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        browser: &'a mut dyn BrowserSession,
        credential: &'a Credential,
        urls: &'a PortalUrls,
        timeouts: &'a StepTimeouts,
        logger: &'a StructuredLogger,
    ) -> Self {
        Self {
            browser,
            credential,
            urls,
            timeouts,
            logger,
            trace: Vec::new(),
        }
    }

    /// States visited so far, in order
    pub fn trace(&self) -> &[LoginStep] {
        &self.trace
    }

    /// Run to a terminal state and collect cookies
    ///
    /// The caller owns the session and closes it afterwards.
    pub async fn run(&mut self) -> AcquireOutcome {
        let mut step = LoginStep::Navigate(Page::Search);
        while !step.is_terminal() {
            if self.trace.len() >= MAX_TRANSITIONS {
                step = LoginStep::Failed(Failure::new("login flow did not converge"));
                break;
            }
            self.trace.push(step.clone());
            step = self.advance(step).await;
        }
        self.trace.push(step.clone());

        match step {
            LoginStep::Failed(failure) => {
                self.logger.error(&format!("Login flow failed: {}", failure.reason));
                if failure.credentials_rejected {
                    AcquireOutcome::Rejected(failure.reason)
                } else {
                    AcquireOutcome::Failed(failure.reason)
                }
            }
            _ => self.capture().await,
        }
    }

    async fn advance(&mut self, step: LoginStep) -> LoginStep {
        let t = self.timeouts;
        let urls = self.urls;
        let credential = self.credential;
        match step {
            LoginStep::Navigate(Page::Search) => {
                self.logger.info("Step 1: opening search page");
                if let Err(e) = self.browser.goto(&self.urls.search, t.navigation()).await {
                    self.logger.warn(&format!("Search page failed, continuing: {}", e));
                }
                LoginStep::Navigate(Page::Home)
            }
            LoginStep::Navigate(Page::Home) => {
                self.logger.info("Step 2: opening portal home");
                match self.browser.goto(&self.urls.home, t.navigation()).await {
                    Ok(()) => LoginStep::WaitForField(Field::LoginButton),
                    Err(e) => {
                        self.logger.warn(&format!("Home page failed, going to login form: {}", e));
                        LoginStep::Navigate(Page::LoginForm)
                    }
                }
            }
            LoginStep::WaitForField(Field::LoginButton) => {
                self.logger.info("Step 3: looking for login button");
                let clicked = match self
                    .browser
                    .wait_for_selector(LOGIN_BUTTON_SELECTOR, t.selector())
                    .await
                {
                    Ok(()) => self.browser.click(LOGIN_BUTTON_SELECTOR).await,
                    Err(e) => Err(e),
                };
                match clicked {
                    Ok(()) => LoginStep::WaitForRedirect(Landing::LoginPage),
                    Err(e) => {
                        self.logger.warn(&format!("Login button unavailable, going to login form: {}", e));
                        LoginStep::Navigate(Page::LoginForm)
                    }
                }
            }
            LoginStep::Navigate(Page::LoginForm) => {
                match self.browser.goto(&self.urls.login_page, t.navigation()).await {
                    Ok(()) => LoginStep::WaitForRedirect(Landing::LoginPage),
                    Err(e) => LoginStep::Failed(Failure::new(format!("login form unreachable: {}", e))),
                }
            }
            LoginStep::WaitForRedirect(Landing::LoginPage) => {
                if self.landed_on(&urls.id_host, t.login_page()).await {
                    LoginStep::WaitForField(Field::Username)
                } else {
                    let url = self.browser.current_url().await.unwrap_or_default();
                    LoginStep::Failed(Failure::new(format!("not on expected login page: {}", url)))
                }
            }
            LoginStep::WaitForField(field @ (Field::Username | Field::Password)) => {
                let (selector, text, next) = match field {
                    Field::Username => (
                        USERNAME_SELECTOR,
                        credential.username.as_str(),
                        LoginStep::WaitForField(Field::Password),
                    ),
                    _ => (
                        PASSWORD_SELECTOR,
                        credential.password.as_str(),
                        LoginStep::Submit,
                    ),
                };
                if field == Field::Username {
                    self.logger.info("Step 4: filling login form");
                }
                let filled = match self.browser.wait_for_selector(selector, t.selector()).await {
                    Ok(()) => self.browser.fill(selector, text).await,
                    Err(e) => Err(e),
                };
                match filled {
                    Ok(()) => next,
                    Err(e) => LoginStep::Failed(Failure::new(format!("{:?} field: {}", field, e))),
                }
            }
            LoginStep::Submit => {
                let submitted = match self.browser.wait_for_selector(SUBMIT_SELECTOR, t.selector()).await {
                    Ok(()) => self.browser.click(SUBMIT_SELECTOR).await,
                    Err(e) => Err(e),
                };
                match submitted {
                    Ok(()) => LoginStep::WaitForRedirect(Landing::Dashboards),
                    Err(e) => LoginStep::Failed(Failure::new(format!("LOG IN button: {}", e))),
                }
            }
            LoginStep::WaitForRedirect(Landing::Dashboards) => {
                match self.browser.wait_for_url(&urls.dashboards, t.dashboard()).await {
                    Ok(()) => {
                        self.logger.info("Dashboard loaded");
                        LoginStep::Navigate(Page::Handoff)
                    }
                    Err(_) => {
                        let url = self.browser.current_url().await.unwrap_or_default();
                        if url.contains(&self.urls.oauth_marker) {
                            LoginStep::Failed(Failure::rejected(format!(
                                "login failed, still on login page: {}",
                                url
                            )))
                        } else {
                            LoginStep::Failed(Failure::new(format!("failed to reach dashboard: {}", url)))
                        }
                    }
                }
            }
            LoginStep::Navigate(Page::Handoff) => {
                self.logger.info("Step 5: handing off to smart-energy dashboard");
                tokio::time::sleep(t.settle()).await;
                self.handoff().await;
                LoginStep::WaitForRedirect(Landing::SmartEnergy)
            }
            LoginStep::WaitForRedirect(Landing::SmartEnergy) => {
                if self.landed_on(&urls.smart_energy_dashboard, t.dashboard()).await {
                    LoginStep::Done
                } else {
                    LoginStep::Navigate(Page::FinalDashboard)
                }
            }
            LoginStep::Navigate(Page::FinalDashboard) => {
                match self.browser.goto(&self.urls.final_dashboard, t.dashboard()).await {
                    Ok(()) => LoginStep::Done,
                    Err(e) => LoginStep::Failed(Failure::new(format!("smart-energy dashboard: {}", e))),
                }
            }
            terminal @ (LoginStep::Done | LoginStep::Failed(_)) => terminal,
        }
    }

    /// Wait for a URL fragment; on timeout accept it if the page is already there
    async fn landed_on(&mut self, needle: &str, timeout: std::time::Duration) -> bool {
        match self.browser.wait_for_url(needle, timeout).await {
            Ok(()) => true,
            Err(e) => {
                let url = self.browser.current_url().await.unwrap_or_default();
                let there = url.contains(needle);
                if !there {
                    self.logger.warn(&format!("Waiting for {} failed at {}: {}", needle, url, e));
                }
                there
            }
        }
    }

    /// Replay the dashboard widget request by hand, else navigate to the hand-off URL
    async fn handoff(&mut self) {
        let t = self.timeouts;
        let urls = self.urls;
        let captured = match self.browser.observed_requests().await {
            Ok(requests) => requests.into_iter().find(|r| {
                r.method.eq_ignore_ascii_case("POST") && r.url.contains(&urls.exceptional_marker)
            }),
            Err(e) => {
                self.logger.debug(&format!("Request log unavailable: {}", e));
                None
            }
        };

        let Some(original) = captured else {
            self.logger.warn("Widget request not captured, navigating directly");
            self.goto_or_warn(&urls.handoff, t.dashboard()).await;
            return;
        };

        let jar = self.browser.cookies().await.unwrap_or_default();
        let headers = self.handoff_headers(&original, &jar);
        let handoff = urls.handoff.as_str();
        match self.browser.get_direct(handoff, &headers).await {
            Ok(resp) if resp.status == 302 => match resp.location {
                Some(location) => {
                    self.logger.info(&format!("Following hand-off redirect to {}", location));
                    if let Err(e) = self.browser.goto(&location, t.dashboard()).await {
                        self.logger.warn(&format!("Redirect navigation failed: {}", e));
                        self.goto_or_warn(handoff, t.dashboard()).await;
                    }
                }
                None => {
                    self.logger.warn("Hand-off redirect without location, navigating directly");
                    self.goto_or_warn(handoff, t.dashboard()).await;
                }
            },
            Ok(resp) => {
                self.logger.warn(&format!("Unexpected hand-off status {}, navigating directly", resp.status));
                self.goto_or_warn(handoff, t.dashboard()).await;
            }
            Err(e) => {
                self.logger.warn(&format!("Manual hand-off failed: {}", e));
                self.goto_or_warn(handoff, t.dashboard()).await;
            }
        }
    }

    fn handoff_headers(&self, original: &ObservedRequest, jar: &[BrowserCookie]) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "accept".to_string(),
                original
                    .header("accept")
                    .unwrap_or("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
                    .to_string(),
            ),
            (
                "accept-language".to_string(),
                original.header("accept-language").unwrap_or("en-US,en;q=0.5").to_string(),
            ),
            (
                "referer".to_string(),
                original
                    .header("referer")
                    .unwrap_or(&self.urls.exceptional_dashboard)
                    .to_string(),
            ),
            ("sec-fetch-dest".to_string(), "document".to_string()),
            ("sec-fetch-mode".to_string(), "navigate".to_string()),
            ("sec-fetch-site".to_string(), "same-origin".to_string()),
            ("upgrade-insecure-requests".to_string(), "1".to_string()),
        ];
        let cookie = jar
            .iter()
            .filter(|c| self.urls.handoff_cookie_domains.contains(&c.domain))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if !cookie.is_empty() {
            headers.push(("cookie".to_string(), cookie));
        }
        headers
    }

    async fn goto_or_warn(&mut self, url: &str, timeout: std::time::Duration) {
        if let Err(e) = self.browser.goto(url, timeout).await {
            self.logger.warn(&format!("Navigation to {} failed: {}", url, e));
        }
    }

    /// Collect cookies from smart-energy request headers and the jar
    async fn capture(&mut self) -> AcquireOutcome {
        self.logger.info("Step 6: capturing cookies");
        tokio::time::sleep(self.timeouts.settle()).await;

        let mut bundle = CookieBundle::new();
        match self.browser.observed_requests().await {
            Ok(requests) => {
                for request in requests
                    .iter()
                    .filter(|r| r.url.contains(&self.urls.smart_energy_host))
                {
                    if let Some(header) = request.header("cookie") {
                        bundle.absorb_header(header, &CAPTURE_NAMES);
                    }
                }
            }
            Err(e) => self.logger.debug(&format!("Request log unavailable: {}", e)),
        }
        match self.browser.cookies().await {
            Ok(jar) => {
                for c in jar
                    .iter()
                    .filter(|c| self.urls.capture_cookie_domains.contains(&c.domain))
                {
                    bundle.absorb(&c.name, &c.value, &CAPTURE_NAMES);
                }
            }
            Err(e) => self.logger.warn(&format!("Cookie jar unavailable: {}", e)),
        }

        let restricted = bundle.restricted();
        if restricted.is_empty() {
            self.logger.warn("No cookies captured, but browsing completed");
            AcquireOutcome::Empty
        } else {
            self.logger.info(&format!("Captured cookies: {:?}", restricted));
            AcquireOutcome::Cookies(restricted)
        }
    }
}

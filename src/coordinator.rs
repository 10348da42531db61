//! Sync orchestration
//!
//! Fetches usage with the current cookie, refreshes the cookie once when the
//! portal rejects it, and imports the cumulative statistics. Scheduled syncs,
//! manual syncs and manual refreshes all run under one async lock, so a
//! refresh never races a fetch.

use crate::config::Config;
use crate::cookies::{CookieBundle, Credential};
use crate::error::{PsegError, Result};
use crate::gateway::{AcquireOutcome, CookieSource, RemoteGateway};
use crate::ingest::{IngestPolicy, ingest};
use crate::logging::{StructuredLogger, get_logger, redact};
use crate::notify::{self, Notifier};
use crate::persistence::PersistenceManager;
use crate::statistics::{HomeAssistantStatistics, StatisticsStore};
use crate::utility::{UsageClient, UsageSource};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Summary of one completed sync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Records the store accepted
    pub records: usize,
    /// Statistic ids that received records
    pub statistics: Vec<String>,
    /// Statistic ids whose import the store refused
    pub failed_statistics: Vec<String>,
    pub skipped_series: usize,
    pub degraded_anchors: usize,
    /// The cookie was replaced during this sync
    pub refreshed: bool,
}

pub struct SyncCoordinator {
    usage: Arc<dyn UsageSource>,
    cookies: Arc<dyn CookieSource>,
    store: Arc<dyn StatisticsStore>,
    notifier: Arc<dyn Notifier>,
    persistence: Mutex<PersistenceManager>,
    credential: Credential,
    policy: IngestPolicy,
    lock: Mutex<()>,
    logger: StructuredLogger,
}

impl SyncCoordinator {
    pub fn new(
        usage: Arc<dyn UsageSource>,
        cookies: Arc<dyn CookieSource>,
        store: Arc<dyn StatisticsStore>,
        notifier: Arc<dyn Notifier>,
        persistence: PersistenceManager,
        credential: Credential,
        policy: IngestPolicy,
    ) -> Self {
        Self {
            usage,
            cookies,
            store,
            notifier,
            persistence: Mutex::new(persistence),
            credential,
            policy,
            lock: Mutex::new(()),
            logger: get_logger("coordinator"),
        }
    }

    /// Production wiring: portal client, remote gateway, Home Assistant recorder
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.statistics.ha_token.trim().is_empty() {
            return Err(PsegError::config(
                "statistics.ha_token is required to import statistics",
            ));
        }
        let policy = IngestPolicy::from_config(&config.statistics)?;
        let usage = UsageClient::from_config(&config.utility, CookieBundle::new())?
            .with_timezone(policy.timezone);
        let store = HomeAssistantStatistics::new(
            config.statistics.ha_url.as_str(),
            config.statistics.ha_token.as_str(),
        );

        let mut persistence = PersistenceManager::new(&config.sync.state_file);
        if let Err(e) = persistence.load() {
            get_logger("coordinator").warn(&format!("Ignoring unreadable state file: {}", e));
        }

        Ok(Self::new(
            Arc::new(usage),
            Arc::new(RemoteGateway::from_config(&config.gateway)?),
            Arc::new(store),
            Arc::from(notify::from_config(&config.statistics)?),
            persistence,
            Credential::new(
                config.account.username.as_str(),
                config.account.password.as_str(),
            ),
            policy,
        ))
    }

    /// Configured cookie if any, else the last refreshed one
    pub async fn initial_cookie(&self, configured: Option<&str>) -> Option<CookieBundle> {
        configured
            .map(CookieBundle::parse)
            .filter(|b| !b.is_empty())
            .or(self.persistence.lock().await.cookie())
    }

    /// Make sure a working cookie is in place before the first sync
    ///
    /// Without a cookie one is requested from the gateway; if that fails too
    /// the operator is notified and startup fails. A cookie the portal
    /// rejects is fatal.
    pub async fn startup(&self, initial: Option<CookieBundle>) -> Result<()> {
        if !self.credential.is_complete() {
            return Err(PsegError::config("No username/password provided"));
        }
        let _guard = self.lock.lock().await;

        let bundle = match initial {
            Some(bundle) => bundle,
            None => {
                self.logger.info("No cookie provided, requesting one from the gateway");
                match self.acquire().await {
                    Some(bundle) => {
                        self.remember(&bundle).await;
                        bundle
                    }
                    None => {
                        self.logger.error(
                            "No cookie available and the gateway failed to provide one",
                        );
                        self.notice(
                            notify::COOKIE_REQUIRED,
                            "PSEG Integration: Cookie Required",
                            "No authentication cookie available. Save one on the gateway's /cookies page or set account.cookie in the configuration.",
                        )
                        .await;
                        return Err(PsegError::auth("No cookie available"));
                    }
                }
            }
        };
        self.usage.update_cookies(bundle).await;

        match self.usage.test_connection().await {
            Ok(()) => {
                self.logger.info("Connection test successful");
                Ok(())
            }
            Err(e) if e.is_auth() => {
                self.logger.error(&format!("Authentication failed: {}", e));
                Err(e)
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Connection test failed, continuing: {}", e));
                Ok(())
            }
        }
    }

    /// Fetch, ingest and import one window
    ///
    /// An `Auth` error triggers one cookie refresh and one retry. A second
    /// `Auth` is returned and reported to the operator.
    pub async fn run_sync(&self, days_back: u32) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let logger = self.logger.for_run();
        logger.info(&format!("Starting sync, days_back={}", days_back));

        let (series, refreshed) = match self.usage.get_usage_data(days_back).await {
            Ok(series) => (series, false),
            Err(e) if e.is_auth() => {
                logger.warn(&format!("Cookie rejected, refreshing: {}", e));
                if let Err(refresh_err) = self.refresh_locked(&logger).await {
                    logger.error(&format!("Cookie refresh failed: {}", refresh_err));
                    self.report_auth_failure(&e).await;
                    return Err(e);
                }
                match self.usage.get_usage_data(days_back).await {
                    Ok(series) => (series, true),
                    Err(e) => {
                        if e.is_auth() {
                            logger.error(&format!("Cookie rejected again after refresh: {}", e));
                            self.report_auth_failure(&e).await;
                        }
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let ingested = ingest(&series, self.store.as_ref(), &self.policy).await;
        for skipped in &ingested.skipped {
            logger.debug(&format!("Skipped {}: {:?}", skipped.name, skipped.reason));
        }

        let mut statistics = Vec::new();
        let mut failed_statistics = Vec::new();
        let mut records = 0;
        for batch in &ingested.batches {
            if batch.records.is_empty() {
                continue;
            }
            if let Err(e) = self.store.import(&batch.metadata, &batch.records).await {
                logger.error(&format!(
                    "Import into {} failed: {}",
                    batch.statistic_id(),
                    e
                ));
                failed_statistics.push(batch.statistic_id().to_string());
                continue;
            }
            records += batch.records.len();
            logger.info(&format!(
                "Imported {} records into {} (anchor {:.3}, final sum {:.3})",
                batch.records.len(),
                batch.statistic_id(),
                batch.anchor,
                batch.final_sum().unwrap_or(batch.anchor)
            ));
            self.verify(batch.statistic_id(), &logger).await;
            statistics.push(batch.statistic_id().to_string());
        }

        let report = SyncReport {
            records,
            statistics,
            failed_statistics,
            skipped_series: ingested.skipped.len(),
            degraded_anchors: ingested.degraded_anchors,
            refreshed,
        };
        if let Err(e) = self.persistence.lock().await.record_sync(report.records) {
            logger.warn(&format!("Failed to persist sync state: {}", e));
        }
        logger.info(&format!(
            "Sync finished: {} records across {} statistics, {} failed",
            report.records,
            report.statistics.len(),
            report.failed_statistics.len()
        ));
        Ok(report)
    }

    /// Operator-triggered refresh, serialized with syncs
    pub async fn refresh_cookie(&self) -> Result<CookieBundle> {
        let _guard = self.lock.lock().await;
        let logger = self.logger.for_run();
        self.refresh_locked(&logger).await
    }

    /// Sync `days_back = 0` every `interval` until the task is dropped
    pub async fn run_scheduler(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        self.logger.info(&format!(
            "Scheduler started, interval {} min",
            interval.as_secs() / 60
        ));
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_sync(0).await {
                self.logger.error(&format!("Scheduled sync failed: {}", e));
            }
        }
    }

    /// Swap in a fresh cookie; the caller holds the sync lock
    async fn refresh_locked(&self, logger: &StructuredLogger) -> Result<CookieBundle> {
        if !self.cookies.is_available().await {
            self.notice(
                notify::COOKIE_REFRESH_FAILED,
                "PSEG Integration: Cookie Refresh Failed",
                "The cookie gateway is not reachable. Please check the add-on status or provide a cookie manually.",
            )
            .await;
            return Err(PsegError::unreachable("Gateway not available"));
        }

        let Some(bundle) = self.acquire().await else {
            self.notice(
                notify::COOKIE_REFRESH_FAILED,
                "PSEG Integration: Cookie Refresh Failed",
                "Failed to refresh your PSEG authentication cookie. Please check the add-on status or provide a cookie manually.",
            )
            .await;
            return Err(PsegError::auth("Gateway did not provide fresh cookies"));
        };

        self.usage.update_cookies(bundle.clone()).await;
        logger.info(&format!(
            "Updated client cookie: {}",
            redact(&bundle.to_header_string())
        ));

        if let Err(e) = self.usage.test_connection().await {
            self.notice(
                notify::COOKIE_REFRESH_FAILED,
                "PSEG Integration: Cookie Refresh Failed",
                &format!("The refreshed cookie did not work: {}", e),
            )
            .await;
            return Err(e);
        }
        logger.info("New cookie validation successful");

        self.remember(&bundle).await;
        self.notice(
            notify::COOKIE_REFRESHED,
            "PSEG Integration: Cookie Refreshed",
            "Successfully refreshed your PSEG authentication cookie. The integration should now work properly.",
        )
        .await;
        Ok(bundle)
    }

    async fn acquire(&self) -> Option<CookieBundle> {
        match self.cookies.fetch(&self.credential).await {
            AcquireOutcome::Cookies(bundle) => Some(bundle),
            AcquireOutcome::Empty => {
                self.logger.warn("Gateway completed login without cookies");
                None
            }
            AcquireOutcome::Rejected(reason) => {
                self.logger.error(&format!("Portal rejected the credentials: {}", reason));
                None
            }
            AcquireOutcome::Failed(reason) => {
                self.logger.warn(&format!("Failed to get cookies from gateway: {}", reason));
                None
            }
        }
    }

    async fn remember(&self, bundle: &CookieBundle) {
        if let Err(e) = self.persistence.lock().await.record_cookie(bundle) {
            self.logger.warn(&format!("Failed to persist cookie: {}", e));
        }
    }

    async fn report_auth_failure(&self, error: &PsegError) {
        self.notice(
            notify::AUTH_FAILED,
            "PSEG Integration: Authentication Failed",
            &format!(
                "Your PSEG cookie has expired and could not be refreshed. Save a new cookie on the gateway's /cookies page.\n\nError: {}",
                error
            ),
        )
        .await;
    }

    /// Log what the store now holds for the last day
    async fn verify(&self, statistic_id: &str, logger: &StructuredLogger) {
        let since = Utc::now() - chrono::Duration::hours(24);
        match self.store.records_since(statistic_id, since).await {
            Ok(records) => match records.last() {
                Some(last) => logger.debug(&format!(
                    "{}: {} records in the last 24h, last sum {:.3} at {}",
                    statistic_id,
                    records.len(),
                    last.sum,
                    last.start
                )),
                None => logger.debug(&format!("{}: no records in the last 24h", statistic_id)),
            },
            Err(e) => logger.debug(&format!("Verification query for {} failed: {}", statistic_id, e)),
        }
    }

    async fn notice(&self, id: &str, title: &str, message: &str) {
        if let Err(e) = self.notifier.notify(id, title, message).await {
            self.logger
                .warn(&format!("Failed to send notification {}: {}", id, e));
        }
    }
}

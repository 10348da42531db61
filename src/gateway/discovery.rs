//! Gateway health probing and discovery
//!
//! Candidates are probed in order with `GET /health`; the first healthy one
//! is remembered in a [`DiscoveryCache`] so later lookups skip the scan.

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Remembers the last healthy gateway address
pub struct DiscoveryCache {
    clock: Arc<dyn Clock>,
    /// `None` keeps an entry for the process lifetime
    ttl: Option<Duration>,
    entry: Mutex<Option<(String, Instant)>>,
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), None)
    }
}

impl DiscoveryCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Option<Duration>) -> Self {
        Self {
            clock,
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<String> {
        let mut guard = self.entry.lock().ok()?;
        let (url, stored_at) = guard.clone()?;
        if let Some(ttl) = self.ttl
            && self.clock.now().saturating_duration_since(stored_at) >= ttl
        {
            *guard = None;
            return None;
        }
        Some(url)
    }

    pub fn set(&self, url: &str) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = Some((url.to_string(), self.clock.now()));
        }
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = None;
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
}

/// Locates a healthy gateway among candidate base URLs
pub struct GatewayDiscovery {
    candidates: Vec<String>,
    fixed: Option<String>,
    http: reqwest::Client,
    cache: Arc<DiscoveryCache>,
    logger: StructuredLogger,
}

impl GatewayDiscovery {
    pub fn new(candidates: Vec<String>, probe_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(probe_timeout).build()?;
        Ok(Self {
            candidates: candidates
                .into_iter()
                .map(|c| c.trim_end_matches('/').to_string())
                .collect(),
            fixed: None,
            http,
            cache: Arc::new(DiscoveryCache::default()),
            logger: get_logger("discovery"),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let discovery = Self::new(
            config.candidates.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        )?;
        Ok(match &config.fixed_url {
            Some(url) => discovery.with_fixed(url),
            None => discovery,
        })
    }

    /// Only ever check this address
    pub fn with_fixed(mut self, url: &str) -> Self {
        self.fixed = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// Healthy base URL, scanning candidates when nothing is cached
    pub async fn probe(&self) -> Option<String> {
        if let Some(fixed) = &self.fixed {
            return self.probe_fixed(fixed).await;
        }

        if let Some(cached) = self.cache.get() {
            return Some(cached);
        }

        for url in &self.candidates {
            if self.check_health(url).await {
                self.logger.info(&format!("Found gateway at {}", url));
                self.cache.set(url);
                return Some(url.clone());
            }
        }

        self.logger.warn("Gateway not found at any candidate address");
        None
    }

    /// Check one address without touching the candidate list or cache
    pub async fn probe_fixed(&self, url: &str) -> Option<String> {
        let url = url.trim_end_matches('/');
        if self.check_health(url).await {
            Some(url.to_string())
        } else {
            self.logger.warn(&format!("Gateway at {} is not healthy", url));
            None
        }
    }

    /// HTTP 200 with `status == "healthy"`
    pub async fn check_health(&self, base_url: &str) -> bool {
        let response = match self.http.get(format!("{}/health", base_url)).send().await {
            Ok(r) => r,
            Err(e) => {
                self.logger.debug(&format!("Gateway not reachable at {}: {}", base_url, e));
                return false;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            self.logger.debug(&format!(
                "Gateway at {} answered {}",
                base_url,
                response.status()
            ));
            return false;
        }
        match response.json::<HealthBody>().await {
            Ok(body) => body.status.as_deref() == Some("healthy"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            if let Ok(mut now) = self.0.lock() {
                *now += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn cache_without_ttl_never_expires() {
        let clock = Arc::new(ManualClock(Mutex::new(Instant::now())));
        let cache = DiscoveryCache::new(clock.clone(), None);
        cache.set("http://localhost:8000");
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(cache.get().as_deref(), Some("http://localhost:8000"));
        cache.reset();
        assert!(cache.get().is_none());
    }

    #[test]
    fn cache_with_ttl_expires_on_clock() {
        let clock = Arc::new(ManualClock(Mutex::new(Instant::now())));
        let cache = DiscoveryCache::new(clock.clone(), Some(Duration::from_secs(60)));
        cache.set("http://a");
        clock.advance(Duration::from_secs(59));
        assert!(cache.get().is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get().is_none());
    }
}

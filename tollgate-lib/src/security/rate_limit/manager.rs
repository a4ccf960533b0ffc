use http::HeaderMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::class::{path_is_endpoint, ClassResolver, RouteClass};
use super::limiter::{FixedWindowLimiter, RateLimitResult};
use crate::analytics::{AnalyticsStore, Method};
use crate::config::{IdentityConfig, RateLimitConfig};
use crate::monitor::MemoryMonitor;
use crate::security::block_list::{BlockList, NoBlockList};
use crate::security::identity::{extract_credential, Identity, IdentityVerifier};
use crate::telemetry::Metrics;

/// What the rate limiter needs to know about an inbound request
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip: String,
    pub path: String,
    pub method: Method,
    pub user_agent: String,
    /// Verified caller, if a credential was presented and accepted
    pub identity: Option<Identity>,
}

impl RequestMeta {
    pub fn is_privileged(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_privileged)
    }
}

/// Outcome of [`RateLimitManager::check`]
#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    /// Health and logout paths, never counted
    Exempt,
    /// Verified admin or moderator, not counted
    Privileged { class: RouteClass },
    Allowed { class: RouteClass, result: RateLimitResult },
    Limited { class: RouteClass, result: RateLimitResult, window: Duration, message: String },
    /// Rejected by the block list before any counting
    Blocked,
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            RateDecision::Exempt | RateDecision::Privileged { .. } | RateDecision::Allowed { .. }
        )
    }

    fn class_label(&self) -> &'static str {
        match self {
            RateDecision::Exempt => "exempt",
            RateDecision::Blocked => "blocked",
            RateDecision::Privileged { class }
            | RateDecision::Allowed { class, .. }
            | RateDecision::Limited { class, .. } => class.as_str(),
        }
    }
}

/// Current limit of one class, for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveLimit {
    pub class: RouteClass,
    pub base: u32,
    pub effective: u32,
    pub window_ms: u64,
}

/// Per-class fixed-window limiting with memory-pressure and privilege adjustments.
///
/// Every decision is recorded in the analytics store: rejections as blocked,
/// everything else as allowed.
pub struct RateLimitManager {
    config: RateLimitConfig,
    resolver: ClassResolver,
    limiters: [FixedWindowLimiter; 5],
    monitor: Arc<MemoryMonitor>,
    store: Arc<AnalyticsStore>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    cookie_name: String,
    block_list: Arc<dyn BlockList>,
    metrics: Option<Arc<Metrics>>,
}

impl RateLimitManager {
    pub fn new(
        config: &RateLimitConfig,
        monitor: Arc<MemoryMonitor>,
        store: Arc<AnalyticsStore>,
    ) -> Self {
        let limiters = RouteClass::ALL.map(|class| {
            FixedWindowLimiter::new(Duration::from_secs(class.limit(config).window_secs))
        });
        Self {
            config: config.clone(),
            resolver: ClassResolver::new(config),
            limiters,
            monitor,
            store,
            verifier: None,
            cookie_name: IdentityConfig::default().cookie_name,
            block_list: Arc::new(NoBlockList),
            metrics: None,
        }
    }

    pub fn with_identity(
        mut self,
        verifier: Option<Arc<dyn IdentityVerifier>>,
        config: &IdentityConfig,
    ) -> Self {
        self.verifier = verifier;
        self.cookie_name = config.cookie_name.clone();
        self
    }

    pub fn with_block_list(mut self, block_list: Arc<dyn BlockList>) -> Self {
        self.block_list = block_list;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    fn limiter(&self, class: RouteClass) -> &FixedWindowLimiter {
        &self.limiters[class as usize]
    }

    /// Health-check and logout paths skip both rate limiting and the admission queue
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.exempt_paths.iter().any(|p| path_is_endpoint(path, p))
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.resolver.resolve(path)
    }

    /// Verify the request's credential, if any.
    ///
    /// Failures are logged and yield `None`: a bad token only loses the exemption.
    pub fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        let verifier = self.verifier.as_ref()?;
        let credential = extract_credential(headers, &self.cookie_name)?;
        match verifier.verify(credential) {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!(error = %e, "Credential rejected, caller treated as unprivileged");
                None
            }
        }
    }

    /// `base × pressure_factor (under pressure)`, then for admin paths
    /// `max(× admin_multiplier, admin_floor)`. Never below 1.
    pub fn effective_max(&self, class: RouteClass, under_pressure: bool) -> u32 {
        let base = f64::from(class.limit(&self.config).max);
        let factor = if under_pressure { self.config.pressure_factor } else { 1.0 };
        let adjusted = (base * factor).floor();

        let effective = if class == RouteClass::Admin {
            let boosted = (adjusted * f64::from(self.config.admin_multiplier)).floor();
            boosted.max(f64::from(self.config.admin_floor))
        } else {
            adjusted
        };
        (effective.min(f64::from(u32::MAX)) as u32).max(1)
    }

    /// Decide whether the request may proceed and record the decision
    pub fn check(&self, meta: &RequestMeta) -> RateDecision {
        let decision = self.decide(meta);

        self.store.log_request(
            &meta.ip,
            &meta.path,
            meta.method,
            !decision.is_admitted(),
            &meta.user_agent,
        );
        if let Some(m) = &self.metrics {
            m.record_rate_limit(decision.class_label(), decision.is_admitted());
        }
        decision
    }

    fn decide(&self, meta: &RequestMeta) -> RateDecision {
        if self.is_exempt(&meta.path) {
            return RateDecision::Exempt;
        }

        if self.block_list.is_blocked(&meta.ip) {
            warn!(ip = %meta.ip, endpoint = %meta.path, "Request from blocked IP rejected");
            return RateDecision::Blocked;
        }

        let class = self.classify(&meta.path);
        if meta.is_privileged() {
            return RateDecision::Privileged { class };
        }

        let max = self.effective_max(class, self.monitor.is_under_pressure());
        let limiter = self.limiter(class);
        let result = limiter.check(&meta.ip, max);

        if result.is_limited() {
            warn!(
                ip = %meta.ip,
                endpoint = %meta.path,
                class = %class,
                limit = max,
                retry_after = result.retry_after_secs(),
                "Rate limit exceeded"
            );
            return RateDecision::Limited {
                class,
                result,
                window: limiter.window(),
                message: class.limit(&self.config).message.clone(),
            };
        }

        RateDecision::Allowed { class, result }
    }

    /// Base and current effective limit of every class
    pub fn effective_limits(&self) -> Vec<EffectiveLimit> {
        let under_pressure = self.monitor.is_under_pressure();
        RouteClass::ALL
            .iter()
            .map(|class| {
                let limit = class.limit(&self.config);
                EffectiveLimit {
                    class: *class,
                    base: limit.max,
                    effective: self.effective_max(*class, under_pressure),
                    window_ms: limit.window_secs.saturating_mul(1000),
                }
            })
            .collect()
    }

    /// Forget windows that have already elapsed
    pub fn purge_expired(&self) -> usize {
        self.limiters.iter().map(FixedWindowLimiter::purge_expired).sum()
    }
}

/// Client IP: first `X-Forwarded-For` entry, else the peer address
pub fn extract_client_ip(peer: SocketAddr, headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|xff| xff.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admission::AdmissionQueue;
use crate::analytics::{AnalyticsQueryService, AnalyticsStore, LivenessProbe, TcpProbe};
use crate::config::Config;
use crate::monitor::{MemoryMonitor, MemorySource, ProcMemorySource};
use crate::security::{
    BlockList, IdentityVerifier, IpFilterBlockList, JwtVerifier, RateLimitManager,
};
use crate::telemetry::Metrics;

/// Every traffic-control component of the process, constructed once at startup.
///
/// Components are shared through `Arc`s; the three periodic jobs hold clones and
/// stop when [`TrafficContext::shutdown`] is called.
pub struct TrafficContext {
    config: Arc<Config>,
    monitor: Arc<MemoryMonitor>,
    store: Arc<AnalyticsStore>,
    rate_limits: Arc<RateLimitManager>,
    queue: AdmissionQueue,
    queries: Arc<AnalyticsQueryService>,
    metrics: Option<Arc<Metrics>>,
    started_at: Instant,
    shutdown: CancellationToken,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder for [`TrafficContext`] with injectable seams.
///
/// Anything not supplied is derived from the configuration.
pub struct TrafficContextBuilder {
    config: Config,
    memory_source: Option<Box<dyn MemorySource>>,
    verifier: Option<Option<Arc<dyn IdentityVerifier>>>,
    block_list: Option<Arc<dyn BlockList>>,
    probe: Option<Option<Arc<dyn LivenessProbe>>>,
    metrics: Option<Arc<Metrics>>,
}

impl TrafficContextBuilder {
    pub fn memory_source(mut self, source: Box<dyn MemorySource>) -> Self {
        self.memory_source = Some(source);
        self
    }

    /// `None` disables the privileged-caller exemption
    pub fn identity_verifier(mut self, verifier: Option<Arc<dyn IdentityVerifier>>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn block_list(mut self, block_list: Arc<dyn BlockList>) -> Self {
        self.block_list = Some(block_list);
        self
    }

    /// `None` reports the database as unconfigured
    pub fn liveness_probe(mut self, probe: Option<Arc<dyn LivenessProbe>>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> TrafficContext {
        let config = self.config;
        let metrics = self.metrics;
        let started_at = Instant::now();

        let source = self.memory_source.unwrap_or_else(|| Box::new(ProcMemorySource::default()));
        let monitor =
            Arc::new(MemoryMonitor::new(source, &config.memory).with_metrics(metrics.clone()));

        let store = Arc::new(AnalyticsStore::new(&config.analytics));

        let verifier = self.verifier.unwrap_or_else(|| {
            config
                .identity
                .jwt_secret
                .as_deref()
                .map(|secret| Arc::new(JwtVerifier::new(secret)) as Arc<dyn IdentityVerifier>)
        });
        let block_list = self
            .block_list
            .unwrap_or_else(|| Arc::new(IpFilterBlockList::new(config.ip_filter.clone())));
        let rate_limits = Arc::new(
            RateLimitManager::new(&config.rate_limit, monitor.clone(), store.clone())
                .with_identity(verifier, &config.identity)
                .with_block_list(block_list)
                .with_metrics(metrics.clone()),
        );

        let queue = AdmissionQueue::new(
            &config.admission,
            &config.rate_limit.exempt_paths,
            monitor.clone(),
            metrics.clone(),
        );

        let probe = self.probe.unwrap_or_else(|| {
            config.health.probe_addr.as_ref().map(|addr| {
                let timeout = Duration::from_millis(config.health.probe_timeout_ms);
                Arc::new(TcpProbe::new(addr.clone(), timeout)) as Arc<dyn LivenessProbe>
            })
        });
        let queries = Arc::new(AnalyticsQueryService::new(
            store.clone(),
            monitor.clone(),
            probe,
            &config.health,
            started_at,
        ));

        TrafficContext {
            config: Arc::new(config),
            monitor,
            store,
            rate_limits,
            queue,
            queries,
            metrics,
            started_at,
            shutdown: CancellationToken::new(),
            jobs: Mutex::new(Vec::new()),
        }
    }
}

impl TrafficContext {
    pub fn builder(config: Config) -> TrafficContextBuilder {
        TrafficContextBuilder {
            config,
            memory_source: None,
            verifier: None,
            block_list: None,
            probe: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<AnalyticsStore> {
        &self.store
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitManager> {
        &self.rate_limits
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub fn queries(&self) -> &Arc<AnalyticsQueryService> {
        &self.queries
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cancelled by [`TrafficContext::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn memory sampling, hourly rollup and stale-data cleanup
    pub fn start_background_jobs(&self) {
        let memory = &self.config.memory;
        let analytics = &self.config.analytics;

        let sample_every = Duration::from_secs(memory.sample_interval_secs);
        let rollup_every = Duration::from_secs(analytics.rollup_interval_secs);
        let cleanup_every = Duration::from_secs(analytics.cleanup_interval_secs);

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);

        let monitor = self.monitor.clone();
        let queue = self.queue.clone();
        let token = &self.shutdown;
        jobs.push(spawn_periodic("memory-sampling", sample_every, true, token, move || {
            // queued entries otherwise only drain when a request completes
            if !monitor.sample() {
                queue.drain();
            }
        }));

        let store = self.store.clone();
        jobs.push(spawn_periodic("hourly-rollup", rollup_every, false, token, move || {
            store.update_hourly_stats();
        }));

        let store = self.store.clone();
        let rate_limits = self.rate_limits.clone();
        jobs.push(spawn_periodic("analytics-cleanup", cleanup_every, false, token, move || {
            store.cleanup_old_data();
            let purged = rate_limits.purge_expired();
            debug!(purged, "Expired rate-limit windows purged");
        }));

        info!(
            sample_secs = sample_every.as_secs(),
            rollup_secs = rollup_every.as_secs(),
            cleanup_secs = cleanup_every.as_secs(),
            "Background jobs started"
        );
    }

    /// Cancel the periodic jobs and wait for them to stop
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let jobs = mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner));
        for job in jobs {
            let _ = job.await;
        }
        info!("Background jobs stopped");
    }
}

fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    immediate: bool,
    shutdown: &CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = if immediate {
            interval(period)
        } else {
            interval_at(tokio::time::Instant::now() + period, period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(job = name, "Background job cancelled");
                    break;
                }
                _ = ticker.tick() => tick(),
            }
        }
    })
}

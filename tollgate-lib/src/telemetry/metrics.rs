use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const CLASS: &str = "class";
    pub const OUTCOME: &str = "outcome";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const ERROR_TYPE: &str = "error_type";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const OUTCOME_RATE_LIMITED: &str = "rate_limited";
    pub const OUTCOME_SERVER_BUSY: &str = "server_busy";
    pub const OUTCOME_BLOCKED: &str = "blocked";
    pub const OUTCOME_FORBIDDEN: &str = "forbidden";
    pub const OUTCOME_SERVED: &str = "served";
}

#[derive(Clone)]
pub struct Metrics {
    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,
    pub requests_active: UpDownCounter<i64>,

    // Rate limiting metrics
    pub rate_limit_allowed_total: Counter<u64>,
    pub rate_limit_rejected_total: Counter<u64>,

    // Admission queue metrics
    // outcome label: "immediate" | "queued" | "timed_out"
    pub admission_total: Counter<u64>,
    pub queue_wait_seconds: Histogram<f64>,

    // Memory monitor metrics
    pub memory_usage_percent: Gauge<f64>,
    pub memory_pressure: Gauge<u64>,

    pub upstream_errors_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("tollgate_requests_total")
                .with_description("Total number of requests by route class and outcome")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("tollgate_requests_duration_seconds")
                .with_description("Request duration in seconds, queue wait included")
                .build(),
            requests_active: meter
                .i64_up_down_counter("tollgate_requests_active")
                .with_description("Number of requests holding an admission slot")
                .build(),

            rate_limit_allowed_total: meter
                .u64_counter("tollgate_rate_limit_allowed_total")
                .with_description("Total number of requests allowed by the rate limiter")
                .build(),
            rate_limit_rejected_total: meter
                .u64_counter("tollgate_rate_limit_rejected_total")
                .with_description("Total number of requests rejected by the rate limiter")
                .build(),

            admission_total: meter
                .u64_counter("tollgate_admission_total")
                .with_description("Admission queue decisions. outcome=immediate|queued|timed_out")
                .build(),
            queue_wait_seconds: meter
                .f64_histogram("tollgate_queue_wait_seconds")
                .with_description("Time spent waiting in the admission queue in seconds")
                .build(),

            memory_usage_percent: meter
                .f64_gauge("tollgate_memory_usage_percent")
                .with_description("Resident memory as a percentage of the limit")
                .build(),
            memory_pressure: meter
                .u64_gauge("tollgate_memory_pressure")
                .with_description("1 while memory is above the pressure threshold")
                .build(),

            upstream_errors_total: meter
                .u64_counter("tollgate_upstream_errors_total")
                .with_description("Total number of failed forwards to the upstream application")
                .build(),

            build_info: meter
                .u64_gauge("tollgate_build_info")
                .with_description("Build information")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_rate_limit(&self, class: &str, allowed: bool) {
        let attrs = &[KeyValue::new(labels::CLASS, class.to_string())];
        if allowed {
            self.rate_limit_allowed_total.add(1, attrs);
        } else {
            self.rate_limit_rejected_total.add(1, attrs);
        }
    }

    pub fn record_admission(&self, outcome: &str) {
        self.admission_total
            .add(1, &[KeyValue::new(labels::OUTCOME, outcome.to_string())]);
    }

    pub fn record_queue_wait(&self, duration_secs: f64) {
        self.queue_wait_seconds.record(duration_secs, &[]);
    }

    pub fn record_active_requests(&self, delta: i64) {
        self.requests_active.add(delta, &[]);
    }

    pub fn record_memory(&self, percentage: f64, under_pressure: bool) {
        self.memory_usage_percent.record(percentage, &[]);
        self.memory_pressure.record(u64::from(under_pressure), &[]);
    }

    pub fn record_request(&self, method: &str, class: &str, outcome: &str, status_code: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::CLASS, class.to_string()),
                KeyValue::new(labels::OUTCOME, outcome.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            ],
        );
    }

    pub fn record_request_duration(&self, duration: f64, class: &str, status_code: u16) {
        self.requests_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::CLASS, class.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
            ],
        );
    }

    pub fn record_upstream_error(&self, error_type: &str) {
        self.upstream_errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("tollgate");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}

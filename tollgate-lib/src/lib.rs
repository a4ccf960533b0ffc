#![forbid(unsafe_code)]

pub mod admission;
pub mod analytics;
pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod security;
pub mod server;
pub mod telemetry;

pub use admission::{AdmissionPermit, AdmissionQueue, CapacityExceeded, QueueStats};
pub use analytics::{AnalyticsQueryService, AnalyticsStore};
pub use config::{load_from_path, Config};
pub use context::{TrafficContext, TrafficContextBuilder};
pub use error::{GateError, Result};
pub use monitor::MemoryMonitor;
pub use pipeline::{RequestHandler, TrafficGate, UpstreamHandler};
pub use security::RateLimitManager;
pub use server::{run, serve};

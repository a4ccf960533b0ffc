mod admission;
mod loader;
mod monitor;
mod root;
mod security;
mod telemetry;

pub use admission::AdmissionConfig;
pub use loader::{load_from_path, validate_config};
pub use monitor::{AnalyticsConfig, HealthConfig, MemoryConfig};
pub use root::Config;
pub use security::{ClassLimit, IdentityConfig, IpFilterConfig, IpFilterMode, RateLimitConfig};
pub use telemetry::{LoggingConfig, TelemetryConfig};

use serde::Deserialize;

/// Admission queue configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdmissionConfig {
    /// Maximum number of requests processed concurrently
    /// Default: 30
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum time a request waits in the queue, in milliseconds
    /// Default: 10000
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_ms: u64,
    /// Path prefixes whose requests jump to the head of the queue
    /// Default: ["/api/admin", "/api/analytics"]
    #[serde(default = "default_priority_prefixes")]
    pub priority_prefixes: Vec<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_timeout_ms: default_queue_timeout(),
            priority_prefixes: default_priority_prefixes(),
        }
    }
}

fn default_max_concurrent() -> usize {
    30
}

fn default_queue_timeout() -> u64 {
    10_000
}

fn default_priority_prefixes() -> Vec<String> {
    vec!["/api/admin".to_string(), "/api/analytics".to_string()]
}

use std::io::Write;
use tempfile::NamedTempFile;
use tollgate_lib::config::{load_from_path, validate_config, IpFilterMode};

use crate::common::test_config;

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap_or_else(|e| panic!("temp file: {e}"));
    file.write_all(toml.as_bytes()).unwrap_or_else(|e| panic!("write config: {e}"));
    file
}

#[test]
fn test_minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = write_config(
        r#"
listen = "127.0.0.1:0"
"#,
    );

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:0");
    assert!(cfg.upstream.is_none());
    assert_eq!(cfg.shutdown_secs, 30);
    assert_eq!(cfg.memory.pressure_threshold, 0.85);
    assert_eq!(cfg.admission.max_concurrent, 30);
    assert_eq!(cfg.admission.queue_timeout_ms, 10_000);
    assert_eq!(cfg.rate_limit.auth.max, 5);
    assert_eq!(cfg.rate_limit.register.window_secs, 3600);
    assert_eq!(cfg.rate_limit.api.max, 100);
    assert_eq!(cfg.rate_limit.admin_multiplier, 4);
    assert_eq!(cfg.analytics.retention_secs, 3600);
    assert_eq!(cfg.ip_filter.mode, IpFilterMode::Disabled);
    assert!(cfg.identity.jwt_secret.is_none());
    Ok(())
}

#[test]
fn test_full_config_sections() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = write_config(
        r#"
listen = "0.0.0.0:8080"
upstream = "127.0.0.1:3000"
shutdown_secs = 5

[logging]
level = "debug"
show_target = true

[telemetry]
metrics_port = 9090

[memory]
sample_interval_secs = 10
pressure_threshold = 0.9

[admission]
max_concurrent = 8
queue_timeout_ms = 2500
priority_prefixes = ["/api/admin"]

[rate_limit]
pressure_factor = 0.25
exempt_paths = ["/health"]

[rate_limit.auth]
max = 10
window_secs = 60
message = "slow down"
prefixes = ["/login"]

[identity]
jwt_secret = "s3cret"
cookie_name = "session"

[ip_filter]
mode = "denylist"
denylist = ["10.0.0.0/8", "192.168.1.7"]

[health]
probe_addr = "127.0.0.1:5432"
degraded_queue_length = 3
critical_queue_length = 6
"#,
    );

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.upstream.as_deref(), Some("127.0.0.1:3000"));
    assert_eq!(cfg.shutdown_secs, 5);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.telemetry.metrics_port, Some(9090));
    assert_eq!(cfg.memory.sample_interval_secs, 10);
    assert_eq!(cfg.admission.max_concurrent, 8);
    assert_eq!(cfg.admission.priority_prefixes, vec!["/api/admin".to_string()]);
    assert_eq!(cfg.rate_limit.pressure_factor, 0.25);
    assert_eq!(cfg.rate_limit.auth.max, 10);
    assert_eq!(cfg.rate_limit.auth.prefixes, vec!["/login".to_string()]);
    // sections left out keep their defaults
    assert_eq!(cfg.rate_limit.api.max, 100);
    assert_eq!(cfg.identity.cookie_name, "session");
    assert_eq!(cfg.ip_filter.mode, IpFilterMode::Denylist);
    assert_eq!(cfg.ip_filter.denylist.len(), 2);
    assert_eq!(cfg.ip_filter.denylist[1].to_string(), "192.168.1.7/32");
    assert_eq!(cfg.health.critical_queue_length, 6);
    Ok(())
}

#[test]
fn test_missing_file_is_a_config_error() {
    let err = load_from_path("/nonexistent/tollgate.toml").err();
    assert!(err.is_some_and(|e| e.to_string().contains("Failed to read config file")));
}

#[test]
fn test_malformed_values_are_rejected() {
    for toml in [
        "listen = \"not-an-address\"\n",
        "listen = \"127.0.0.1:0\"\n[ip_filter]\nmode = \"denylist\"\ndenylist = [\"bogus\"]\n",
        "listen = \"127.0.0.1:0\"\n[admission]\nmax_concurrent = 0\n",
        "listen = \"127.0.0.1:0\"\n[memory]\npressure_threshold = 1.5\n",
    ] {
        let file = write_config(toml);
        assert!(load_from_path(file.path()).is_err(), "accepted: {toml}");
    }
}

#[test]
fn test_validation_rules() {
    assert!(validate_config(&test_config()).is_ok());

    let mut cfg = test_config();
    cfg.rate_limit.pressure_factor = 0.0;
    assert!(validate_config(&cfg).is_err());

    let mut cfg = test_config();
    cfg.rate_limit.api.window_secs = 0;
    assert!(validate_config(&cfg).is_err());

    let mut cfg = test_config();
    cfg.rate_limit.admin.prefixes.push("api/ops".to_string());
    assert!(validate_config(&cfg).is_err());

    let mut cfg = test_config();
    cfg.health.critical_queue_length = 1;
    cfg.health.degraded_queue_length = 5;
    assert!(validate_config(&cfg).is_err());

    let mut cfg = test_config();
    cfg.identity.jwt_secret = Some("   ".to_string());
    assert!(validate_config(&cfg).is_err());
}

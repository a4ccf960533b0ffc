use std::fs;
use std::path::Path;

use crate::config::{ClassLimit, Config};
use crate::error::{GateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.admission.max_concurrent == 0 {
        return Err(GateError::Config("admission.max_concurrent must be > 0".into()));
    }
    if cfg.admission.queue_timeout_ms == 0 {
        return Err(GateError::Config("admission.queue_timeout_ms must be > 0".into()));
    }

    if !in_unit_interval(cfg.memory.pressure_threshold) {
        return Err(GateError::Config(format!(
            "memory.pressure_threshold must be in (0, 1], got {}",
            cfg.memory.pressure_threshold
        )));
    }
    if cfg.memory.sample_interval_secs == 0 {
        return Err(GateError::Config("memory.sample_interval_secs must be > 0".into()));
    }

    let analytics = &cfg.analytics;
    if analytics.retention_secs == 0
        || analytics.rollup_interval_secs == 0
        || analytics.cleanup_interval_secs == 0
    {
        return Err(GateError::Config("analytics intervals must be > 0".into()));
    }
    if analytics.hourly_window_hours == 0 || analytics.max_records == 0 {
        return Err(GateError::Config(
            "analytics.hourly_window_hours and analytics.max_records must be > 0".into(),
        ));
    }

    let rate_limit = &cfg.rate_limit;
    if !in_unit_interval(rate_limit.pressure_factor) {
        return Err(GateError::Config(format!(
            "rate_limit.pressure_factor must be in (0, 1], got {}",
            rate_limit.pressure_factor
        )));
    }
    if rate_limit.admin_multiplier == 0 {
        return Err(GateError::Config("rate_limit.admin_multiplier must be > 0".into()));
    }
    for (name, class) in [
        ("auth", &rate_limit.auth),
        ("register", &rate_limit.register),
        ("api", &rate_limit.api),
        ("public", &rate_limit.public),
        ("admin", &rate_limit.admin),
    ] {
        validate_class(name, class)?;
    }

    if cfg.health.critical_queue_length < cfg.health.degraded_queue_length {
        return Err(GateError::Config(
            "health.critical_queue_length must be >= health.degraded_queue_length".into(),
        ));
    }

    if let Some(secret) = &cfg.identity.jwt_secret {
        if secret.trim().is_empty() {
            return Err(GateError::Config("identity.jwt_secret cannot be empty".into()));
        }
    }

    Ok(())
}

fn validate_class(name: &str, class: &ClassLimit) -> Result<()> {
    if class.max == 0 {
        return Err(GateError::Config(format!("rate_limit.{name}.max must be > 0")));
    }
    if class.window_secs == 0 {
        return Err(GateError::Config(format!("rate_limit.{name}.window_secs must be > 0")));
    }
    if let Some(prefix) = class.prefixes.iter().find(|p| !p.starts_with('/')) {
        return Err(GateError::Config(format!(
            "rate_limit.{name}.prefixes entry '{prefix}' must start with '/'"
        )));
    }
    Ok(())
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

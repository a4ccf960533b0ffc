use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::info;

use crate::config::{IpFilterConfig, IpFilterMode};

/// Consulted before the rate-limit window check
pub trait BlockList: Send + Sync {
    /// True when the client must be rejected outright
    fn is_blocked(&self, ip: &str) -> bool;
}

/// Never blocks anyone
pub struct NoBlockList;

impl BlockList for NoBlockList {
    fn is_blocked(&self, _ip: &str) -> bool {
        false
    }
}

/// Static allow/deny networks from the `[ip_filter]` section
pub struct IpFilterBlockList {
    config: IpFilterConfig,
}

impl IpFilterBlockList {
    pub fn new(config: IpFilterConfig) -> Self {
        Self { config }
    }
}

impl BlockList for IpFilterBlockList {
    fn is_blocked(&self, ip: &str) -> bool {
        // client IPs that do not parse (garbled X-Forwarded-For) are left to the rate limiter
        match ip.parse::<IpAddr>() {
            Ok(addr) => !is_ip_allowed(addr, &self.config),
            Err(_) => false,
        }
    }
}

/// Check if an IP address is allowed based on the filter configuration
///
/// # Logic:
/// - `Disabled`: always allow
/// - `Allowlist`: allow only if IP matches allowlist (empty list denies all)
/// - `Denylist`: block if IP matches denylist
pub fn is_ip_allowed(ip: IpAddr, config: &IpFilterConfig) -> bool {
    match config.mode {
        IpFilterMode::Disabled => true,
        IpFilterMode::Allowlist => config.allowlist.iter().any(|net| net.contains(&ip)),
        IpFilterMode::Denylist => !config.denylist.iter().any(|net| net.contains(&ip)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockAction {
    Block,
    Unblock,
}

/// Acknowledgement of a manual block/unblock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAck {
    pub ip: String,
    pub action: BlockAction,
    /// Always false: manual actions are audited, not enforced
    pub enforced: bool,
    pub message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockActionError {
    #[error("invalid IP address '{0}'")]
    InvalidIp(String),
}

/// Record an operator's block/unblock request in the audit log.
///
/// Enforcement is the job of a [`BlockList`] implementation; this only validates
/// the input and leaves an audit trail.
pub fn manual_block_action(
    ip: &str,
    action: BlockAction,
    reason: Option<&str>,
    actor: &str,
) -> Result<BlockAck, BlockActionError> {
    let addr = ip
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| BlockActionError::InvalidIp(ip.to_string()))?;

    info!(
        target: "audit",
        ip = %addr,
        ?action,
        reason = reason.unwrap_or("none"),
        actor,
        "Manual IP block action recorded (not enforced)"
    );

    let verb = match action {
        BlockAction::Block => "block",
        BlockAction::Unblock => "unblock",
    };
    Ok(BlockAck {
        ip: addr.to_string(),
        action,
        enforced: false,
        message: format!("IP {addr} {verb} request recorded"),
    })
}

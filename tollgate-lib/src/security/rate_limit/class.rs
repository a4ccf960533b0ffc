use serde::Serialize;
use std::fmt;

use crate::config::{ClassLimit, RateLimitConfig};

/// Named category of endpoints sharing one rate-limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    Auth,
    Register,
    Api,
    Public,
    Admin,
}

impl RouteClass {
    pub const ALL: [RouteClass; 5] = [
        RouteClass::Auth,
        RouteClass::Register,
        RouteClass::Api,
        RouteClass::Public,
        RouteClass::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Auth => "auth",
            RouteClass::Register => "register",
            RouteClass::Api => "api",
            RouteClass::Public => "public",
            RouteClass::Admin => "admin",
        }
    }

    pub fn limit(self, config: &RateLimitConfig) -> &ClassLimit {
        match self {
            RouteClass::Auth => &config.auth,
            RouteClass::Register => &config.register,
            RouteClass::Api => &config.api,
            RouteClass::Public => &config.public,
            RouteClass::Admin => &config.admin,
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `path` equals `prefix` or continues it with a new segment
pub fn path_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// `path` names exactly `endpoint`, tolerating one trailing slash
pub fn path_is_endpoint(path: &str, endpoint: &str) -> bool {
    path == endpoint || path.strip_suffix('/') == Some(endpoint)
}

/// Longest-prefix match from request path to route class
#[derive(Debug, Clone)]
pub struct ClassResolver {
    /// Sorted by prefix length, longest first
    prefixes: Vec<(String, RouteClass)>,
}

impl ClassResolver {
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut prefixes: Vec<(String, RouteClass)> = RouteClass::ALL
            .iter()
            .flat_map(|class| class.limit(config).prefixes.iter().map(move |p| (p.clone(), *class)))
            .collect();
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { prefixes }
    }

    /// Unmatched paths fall into [`RouteClass::Public`]
    pub fn resolve(&self, path: &str) -> RouteClass {
        self.prefixes
            .iter()
            .find(|(prefix, _)| path_matches(path, prefix))
            .map(|(_, class)| *class)
            .unwrap_or(RouteClass::Public)
    }
}

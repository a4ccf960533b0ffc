use ipnet::IpNet;
use serde::Deserialize;

/// Rate limiting configuration
///
/// One fixed-window limit per route class. The effective limit of a request is
/// derived from the class limit, the memory pressure signal and whether the path
/// belongs to the admin class.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Paths that are never counted nor queued (exact match or prefix followed by `/`)
    /// Default: ["/health", "/api/auth/logout"]
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
    /// Multiplier applied to every class limit while memory is under pressure
    /// Must be in (0, 1]
    /// Default: 0.5
    #[serde(default = "default_pressure_factor")]
    pub pressure_factor: f64,
    /// Multiplier applied to admin-class limits
    /// Default: 4
    #[serde(default = "default_admin_multiplier")]
    pub admin_multiplier: u32,
    /// Lower bound for admin-class limits after all adjustments
    /// Default: 200
    #[serde(default = "default_admin_floor")]
    pub admin_floor: u32,
    /// Login and password endpoints
    #[serde(default = "ClassLimit::auth")]
    pub auth: ClassLimit,
    /// Account creation
    #[serde(default = "ClassLimit::register")]
    pub register: ClassLimit,
    /// Authenticated application API
    #[serde(default = "ClassLimit::api")]
    pub api: ClassLimit,
    /// Everything not matched by another class
    #[serde(default = "ClassLimit::public")]
    pub public: ClassLimit,
    /// Administration and analytics endpoints
    #[serde(default = "ClassLimit::admin")]
    pub admin: ClassLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            exempt_paths: default_exempt_paths(),
            pressure_factor: default_pressure_factor(),
            admin_multiplier: default_admin_multiplier(),
            admin_floor: default_admin_floor(),
            auth: ClassLimit::auth(),
            register: ClassLimit::register(),
            api: ClassLimit::api(),
            public: ClassLimit::public(),
            admin: ClassLimit::admin(),
        }
    }
}

/// Limit for a single route class
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClassLimit {
    /// Base number of requests allowed per window and client IP
    pub max: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Message returned to rejected clients
    pub message: String,
    /// Path prefixes routed to this class (longest prefix wins across classes)
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl ClassLimit {
    fn auth() -> Self {
        Self {
            max: 5,
            window_secs: 15 * 60,
            message: "Too many authentication attempts, please try again later.".to_string(),
            prefixes: vec!["/api/auth".to_string()],
        }
    }

    fn register() -> Self {
        Self {
            max: 3,
            window_secs: 60 * 60,
            message: "Too many accounts created from this IP, please try again later."
                .to_string(),
            prefixes: vec!["/api/auth/register".to_string()],
        }
    }

    fn api() -> Self {
        Self {
            max: 100,
            window_secs: 15 * 60,
            message: "Too many requests, please try again later.".to_string(),
            prefixes: vec!["/api".to_string()],
        }
    }

    fn public() -> Self {
        Self {
            max: 200,
            window_secs: 15 * 60,
            message: "Too many requests, please try again later.".to_string(),
            prefixes: vec![],
        }
    }

    fn admin() -> Self {
        Self {
            max: 1000,
            window_secs: 15 * 60,
            message: "Too many admin requests, please try again later.".to_string(),
            prefixes: vec!["/api/admin".to_string(), "/api/analytics".to_string()],
        }
    }
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string(), "/api/auth/logout".to_string()]
}

fn default_pressure_factor() -> f64 {
    0.5
}

fn default_admin_multiplier() -> u32 {
    4
}

fn default_admin_floor() -> u32 {
    200
}

/// Identity verification used to recognise privileged callers
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IdentityConfig {
    /// HMAC secret for HS256 bearer tokens
    /// Default: None (no caller is ever treated as privileged)
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Cookie consulted when no `Authorization: Bearer` header is present
    /// Default: "token"
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { jwt_secret: None, cookie_name: default_cookie_name() }
    }
}

fn default_cookie_name() -> String {
    "token".to_string()
}

/// IP filtering mode
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpFilterMode {
    /// IP filtering is disabled (allow all)
    #[default]
    Disabled,
    /// Only allow IPs in the allowlist
    Allowlist,
    /// Block IPs in the denylist
    Denylist,
}

/// IP filtering (ACL) configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct IpFilterConfig {
    /// Filtering mode
    #[serde(default)]
    pub mode: IpFilterMode,
    /// Allowlist: Only these IPs/networks are allowed (when mode = "allowlist")
    /// Supports CIDR notation: ["127.0.0.1/32", "192.168.1.0/24", "::1/128"]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_ip_networks")]
    pub allowlist: Vec<IpNet>,
    /// Denylist: These IPs/networks are blocked (when mode = "denylist")
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_ip_networks")]
    pub denylist: Vec<IpNet>,
}

fn deserialize_ip_networks<'de, D>(deserializer: D) -> Result<Vec<IpNet>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strings: Vec<String> = Vec::deserialize(deserializer)?;
    strings
        .into_iter()
        .map(|s| {
            // bare addresses are accepted as host networks
            s.parse::<IpNet>()
                .or_else(|e| s.parse::<std::net::IpAddr>().map(IpNet::from).map_err(|_| e))
                .map_err(|e| serde::de::Error::custom(format!("Invalid IP network '{s}': {e}")))
        })
        .collect()
}

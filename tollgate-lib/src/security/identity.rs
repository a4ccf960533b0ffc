use http::header::{AUTHORIZATION, COOKIE};
use http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// Caller role asserted by a verified credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Admins and moderators skip rate limiting and may read analytics
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("credential rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Verifies a raw credential and returns who presented it
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(alias = "userId", alias = "id")]
    sub: String,
    #[serde(default = "unknown_role")]
    role: Role,
}

fn unknown_role() -> Role {
    Role::Unknown
}

/// HS256 bearer tokens signed with a shared secret
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, IdentityError> {
        let data = jsonwebtoken::decode::<Claims>(credential, &self.key, &self.validation)?;
        Ok(Identity { subject: data.claims.sub, role: data.claims.role })
    }
}

/// Credential from `Authorization: Bearer`, else the named cookie
pub fn extract_credential<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            if let Some((name, token)) = pair.trim().split_once('=') {
                if name == cookie_name && !token.is_empty() {
                    return Some(token);
                }
            }
        }
    }
    None
}

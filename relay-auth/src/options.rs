// Token verification options.

use std::time::Duration;

use relay_core::RelayConfigSnapshot;
use serde::{Deserialize, Serialize};

/// HMAC signing algorithms accepted for caller tokens.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    #[default]
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl std::str::FromStr for JwtAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(format!("Unsupported JWT algorithm: {other}")),
        }
    }
}

/// JWT-specific configuration options.
///
/// Relay does not issue tokens; it only checks the ones callers present.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtOptions {
    /// JWT signing algorithm
    pub algorithm: JwtAlgorithm,
    /// Expected issuer (iss claim)
    pub issuer: String,
    /// Accepted audiences (aud claim)
    pub audience: Vec<String>,
    /// Shared HMAC secret
    pub secret: Option<String>,
    /// Clock skew tolerated on exp/nbf
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// Lifetime of tokens minted by [`crate::Authenticator::sign`]
    #[serde(with = "humantime_serde")]
    pub expires_in: Duration,
}

impl Default for JwtOptions {
    fn default() -> Self {
        Self {
            algorithm: JwtAlgorithm::default(),
            issuer: "relay-auth".to_string(),
            audience: vec!["relay-gateway".to_string()],
            secret: None,
            leeway: Duration::from_secs(30),
            expires_in: Duration::from_secs(3600),
        }
    }
}

impl JwtOptions {
    /// Read `auth.jwt.*` keys over the defaults.
    ///
    /// `auth.jwt.audience` is a comma separated list; `auth.jwt.leeway_ms`
    /// is milliseconds.
    pub fn from_config(cfg: &RelayConfigSnapshot) -> Result<Self, String> {
        let mut opts = Self::default();
        if let Some(alg) = cfg.get("auth.jwt.algorithm") {
            opts.algorithm = alg.parse()?;
        }
        if let Some(issuer) = cfg.get_string("auth.jwt.issuer") {
            opts.issuer = issuer;
        }
        if let Some(audience) = cfg.get_list("auth.jwt.audience") {
            opts.audience = audience;
        }
        if let Some(secret) = cfg.get_string("auth.jwt.secret") {
            opts.secret = Some(secret);
        }
        if let Some(leeway) = cfg.get_duration_ms("auth.jwt.leeway_ms") {
            opts.leeway = leeway;
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Validate JWT configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("JWT issuer cannot be empty".to_string());
        }
        if self.audience.is_empty() {
            return Err("JWT audience cannot be empty".to_string());
        }
        match &self.secret {
            None => return Err("HMAC algorithms require a secret".to_string()),
            Some(s) if s.len() < 16 => {
                return Err("JWT secret must be at least 16 bytes".to_string())
            }
            Some(_) => {}
        }
        if self.expires_in.is_zero() {
            return Err("Token expiration must be greater than 0".to_string());
        }
        Ok(())
    }
}

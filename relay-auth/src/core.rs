// Bearer token verification.

use std::sync::Arc;

use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use relay_core::{Principal, RelayError, Role, TenantId};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::options::JwtOptions;

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
use crate::options::JwtAlgorithm;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT support is disabled (enable one of: jwt-aws-lc-rs, jwt-rust-crypto)")]
    Disabled,
    #[error("JWT secret is not configured")]
    MissingSecret,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token is missing the `{0}` claim")]
    MissingClaim(&'static str),
    #[error("Token carries an unknown role: {0}")]
    UnknownRole(String),
}

impl From<AuthError> for RelayError {
    fn from(err: AuthError) -> Self {
        RelayError::not_authenticated(err.to_string())
    }
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = v.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub trait JwtProvider: Send + Sync {
    fn sign(&self, jwt: &JwtOptions, claims: Map<String, Value>) -> Result<String, AuthError>;

    fn verify(&self, jwt: &JwtOptions, token: &str) -> Result<Value, AuthError>;
}

#[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
struct NoJwtProvider;

#[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
impl JwtProvider for NoJwtProvider {
    fn sign(&self, _jwt: &JwtOptions, _claims: Map<String, Value>) -> Result<String, AuthError> {
        Err(AuthError::Disabled)
    }

    fn verify(&self, _jwt: &JwtOptions, _token: &str) -> Result<Value, AuthError> {
        Err(AuthError::Disabled)
    }
}

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
struct JsonwebtokenProvider;

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
impl JsonwebtokenProvider {
    fn algorithm(alg: JwtAlgorithm) -> jsonwebtoken::Algorithm {
        match alg {
            JwtAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            JwtAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            JwtAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
impl JwtProvider for JsonwebtokenProvider {
    fn sign(&self, jwt: &JwtOptions, claims: Map<String, Value>) -> Result<String, AuthError> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let secret = jwt.secret.as_ref().ok_or(AuthError::MissingSecret)?;
        let header = Header::new(Self::algorithm(jwt.algorithm));
        encode(&header, &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AuthError::Invalid(e.to_string()))
    }

    fn verify(&self, jwt: &JwtOptions, token: &str) -> Result<Value, AuthError> {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let secret = jwt.secret.as_ref().ok_or(AuthError::MissingSecret)?;

        let mut validation = Validation::new(Self::algorithm(jwt.algorithm));
        validation.leeway = jwt.leeway.as_secs();
        validation.set_issuer(&[jwt.issuer.as_str()]);
        validation.set_audience(&jwt.audience.iter().map(|s| s.as_str()).collect::<Vec<_>>());

        let decoded = decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?;
        Ok(decoded.claims)
    }
}

/// Map verified claims to a caller: `sub`, `tenant_id` and `role`.
pub fn principal_from_claims(claims: &Value) -> Result<Principal, AuthError> {
    let claim = |name: &'static str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingClaim(name))
    };

    let role = claim("role")?;
    Ok(Principal {
        user_id: claim("sub")?.to_string(),
        tenant_id: TenantId::new(claim("tenant_id")?),
        role: role
            .parse::<Role>()
            .map_err(|_| AuthError::UnknownRole(role.to_string()))?,
    })
}

/// Verifies caller tokens into [`Principal`]s.
#[derive(Clone)]
pub struct Authenticator {
    options: JwtOptions,
    jwt: Arc<dyn JwtProvider>,
}

impl Authenticator {
    pub fn new(options: JwtOptions) -> Self {
        let jwt: Arc<dyn JwtProvider> = {
            #[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
            {
                Arc::new(JsonwebtokenProvider)
            }
            #[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
            {
                Arc::new(NoJwtProvider)
            }
        };
        Self { options, jwt }
    }

    pub fn options(&self) -> &JwtOptions {
        &self.options
    }

    /// No `Authorization` header is an anonymous caller; a header that does
    /// not verify is a 401.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Principal>, RelayError> {
        if !headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }
        let token = extract_bearer_token(headers)
            .ok_or_else(|| RelayError::not_authenticated("Malformed Authorization header"))?;
        self.verify(&token).map(Some)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, RelayError> {
        let claims = self.jwt.verify(&self.options, token).map_err(|e| {
            debug!(error = %e, "token rejected");
            RelayError::from(e)
        })?;
        Ok(principal_from_claims(&claims)?)
    }

    /// Mint a token for `principal`.
    ///
    /// Tokens are normally minted by the identity provider; this exists for
    /// local tooling and tests.
    pub fn sign(&self, principal: &Principal) -> Result<String, RelayError> {
        let now = Utc::now().timestamp();
        let exp = now + self.options.expires_in.as_secs() as i64;

        let mut claims = Map::new();
        claims.insert("sub".into(), Value::String(principal.user_id.clone()));
        claims.insert(
            "tenant_id".into(),
            Value::String(principal.tenant_id.to_string()),
        );
        claims.insert("role".into(), Value::String(principal.role.to_string()));
        claims.insert("iss".into(), Value::String(self.options.issuer.clone()));
        claims.insert(
            "aud".into(),
            Value::Array(
                self.options
                    .audience
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        claims.insert("iat".into(), Value::Number(now.into()));
        claims.insert("exp".into(), Value::Number(exp.into()));
        claims.insert("jti".into(), Value::String(Uuid::new_v4().to_string()));

        Ok(self.jwt.sign(&self.options, claims)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc")), Some("abc".into()));
        assert_eq!(extract_bearer_token(&headers("bearer  abc ")), Some("abc".into()));
        assert_eq!(extract_bearer_token(&headers("Basic abc")), None);
        assert_eq!(extract_bearer_token(&headers("Bearer ")), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn claims_map_to_principal() {
        let p = principal_from_claims(&json!({
            "sub": "u-1", "tenant_id": "acme", "role": "moderator"
        }))
        .unwrap();
        assert_eq!(p, Principal::new("u-1", "acme", Role::Moderator));

        assert!(matches!(
            principal_from_claims(&json!({"sub": "u-1", "role": "admin"})),
            Err(AuthError::MissingClaim("tenant_id"))
        ));
        assert!(matches!(
            principal_from_claims(&json!({"sub": "u-1", "tenant_id": "acme", "role": "owner"})),
            Err(AuthError::UnknownRole(_))
        ));
    }
}

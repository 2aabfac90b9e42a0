//! Secret Store: the only place connector credentials live.
//!
//! Instances keep an opaque [`SecretRef`]; the credentials themselves are
//! sealed with AES-256-GCM, bound to the owning tenant and connector type.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use relay_core::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::Credentials;

const NONCE_LEN: usize = 12;

/// Opaque handle to stored credentials.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    fn generate() -> Self {
        Self(format!("sec_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretRef({})", self.0)
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(
        &self,
        tenant: &TenantId,
        connector: &str,
        credentials: &Credentials,
    ) -> Result<SecretRef>;

    async fn get(
        &self,
        tenant: &TenantId,
        connector: &str,
        secret: &SecretRef,
    ) -> Result<Option<Credentials>>;

    async fn delete(&self, secret: &SecretRef) -> Result<()>;
}

/// In-process secret store holding only ciphertext.
pub struct EncryptedMemorySecretStore {
    cipher: Aes256Gcm,
    /// base64(nonce || ciphertext)
    sealed: DashMap<SecretRef, String>,
}

impl EncryptedMemorySecretStore {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            sealed: DashMap::new(),
        }
    }

    /// Store keyed with a fresh random key; sealed data does not survive
    /// the process.
    pub fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
            sealed: DashMap::new(),
        }
    }

    /// Key given as base64 of exactly 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let raw = BASE64
            .decode(encoded.trim())
            .context("secrets.key is not valid base64")?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| anyhow!("secrets.key must decode to 32 bytes, got {}", v.len()))?;
        Ok(Self::new(&key))
    }

    pub fn len(&self) -> usize {
        self.sealed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty()
    }

    /// Raw stored form, for inspection in tests.
    pub fn sealed_form(&self, secret: &SecretRef) -> Option<String> {
        self.sealed.get(secret).map(|s| s.value().clone())
    }

    fn aad(tenant: &TenantId, connector: &str) -> Vec<u8> {
        format!("{tenant}/{connector}").into_bytes()
    }

    fn seal(&self, tenant: &TenantId, connector: &str, credentials: &Credentials) -> Result<String> {
        let plaintext = serde_json::to_vec(credentials)?;
        let aad = Self::aad(tenant, connector);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: &plaintext, aad: &aad })
            .map_err(|_| anyhow!("credential encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    fn open(&self, tenant: &TenantId, connector: &str, sealed: &str) -> Result<Credentials> {
        let raw = BASE64.decode(sealed).context("sealed credentials are corrupt")?;
        if raw.len() <= NONCE_LEN {
            return Err(anyhow!("sealed credentials are truncated"));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let aad = Self::aad(tenant, connector);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: &aad })
            .map_err(|_| anyhow!("credentials do not belong to {tenant}/{connector}"))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[async_trait]
impl SecretStore for EncryptedMemorySecretStore {
    async fn put(
        &self,
        tenant: &TenantId,
        connector: &str,
        credentials: &Credentials,
    ) -> Result<SecretRef> {
        let sealed = self.seal(tenant, connector, credentials)?;
        let secret = SecretRef::generate();
        self.sealed.insert(secret.clone(), sealed);
        Ok(secret)
    }

    async fn get(
        &self,
        tenant: &TenantId,
        connector: &str,
        secret: &SecretRef,
    ) -> Result<Option<Credentials>> {
        let Some(sealed) = self.sealed_form(secret) else {
            return Ok(None);
        };
        self.open(tenant, connector, &sealed).map(Some)
    }

    async fn delete(&self, secret: &SecretRef) -> Result<()> {
        self.sealed.remove(secret);
        Ok(())
    }
}

// Apple signing key provider with JWKS fetching and caching
// Keys are cached for the process lifetime and refreshed when an unknown key ID shows up

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use log::{debug, info, warn};
use p256::ecdsa::VerifyingKey as EcdsaVerifyingKey;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Apple's published JWKS endpoint for Sign in with Apple
pub const APPLE_JWKS_URI: &str = "https://appleid.apple.com/auth/keys";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum KeyProviderError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Key provider unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// JWKS Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,         // Key type (RSA, EC)
    pub kid: Option<String>, // Key ID
    pub alg: Option<String>, // Algorithm (RS256, ES256, etc.)
    #[serde(rename = "use")]
    pub key_use: Option<String>, // "sig" for signing

    // RSA keys
    pub n: Option<String>, // Modulus
    pub e: Option<String>, // Exponent

    // EC keys
    pub crv: Option<String>, // Curve
    pub x: Option<String>,   // X coordinate
    pub y: Option<String>,   // Y coordinate
}

/// Decoded public key material
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcP256(EcdsaVerifyingKey),
}

/// A verified-ready signing key taken from the key set
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    /// Algorithm advertised by the key set, if any
    pub alg: Option<String>,
    pub key: PublicKey,
}

impl SigningKey {
    /// Decode a JWK into usable public key material
    ///
    /// # Errors
    ///
    /// Returns an error if the key has no ID, an unsupported key type or curve,
    /// or components that are missing or not valid base64url
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Self, String> {
        let kid = jwk.kid.clone().ok_or("Missing key ID (kid)")?;

        let key = match jwk.kty.as_str() {
            "RSA" => PublicKey::Rsa(decode_rsa_key(jwk)?),
            "EC" => PublicKey::EcP256(decode_p256_key(jwk)?),
            other => return Err(format!("Unsupported key type: {other}")),
        };

        Ok(Self {
            kid,
            alg: jwk.alg.clone(),
            key,
        })
    }
}

fn decode_component(value: Option<&String>, name: &str) -> Result<Vec<u8>, String> {
    let value = value.ok_or_else(|| format!("Missing {name}"))?;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| format!("Invalid {name} encoding: {e}"))
}

fn decode_rsa_key(jwk: &JsonWebKey) -> Result<RsaPublicKey, String> {
    let n_bytes = decode_component(jwk.n.as_ref(), "RSA modulus (n)")?;
    let e_bytes = decode_component(jwk.e.as_ref(), "RSA exponent (e)")?;

    RsaPublicKey::new(
        BigUint::from_bytes_be(&n_bytes),
        BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| format!("Invalid RSA key: {e}"))
}

fn decode_p256_key(jwk: &JsonWebKey) -> Result<EcdsaVerifyingKey, String> {
    match jwk.crv.as_deref() {
        Some("P-256") => {}
        other => return Err(format!("Unsupported curve: {other:?}")),
    }

    let x_bytes = decode_component(jwk.x.as_ref(), "ECDSA x coordinate")?;
    let y_bytes = decode_component(jwk.y.as_ref(), "ECDSA y coordinate")?;
    if x_bytes.len() != 32 || y_bytes.len() != 32 {
        return Err("ECDSA coordinates must be 32 bytes each".to_string());
    }

    // Uncompressed SEC1 point: 0x04 || x || y
    let mut point_bytes = Vec::with_capacity(65);
    point_bytes.push(0x04);
    point_bytes.extend_from_slice(&x_bytes);
    point_bytes.extend_from_slice(&y_bytes);

    EcdsaVerifyingKey::from_sec1_bytes(&point_bytes).map_err(|e| format!("Invalid ECDSA key: {e}"))
}

// ============================================================================
// JWKS Sources
// ============================================================================

/// Where the key set comes from
#[async_trait]
pub trait JwksSource: Send + Sync {
    /// Fetch the full key set
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::Unavailable` on network, status or parse failures
    async fn fetch(&self) -> Result<JsonWebKeySet, KeyProviderError>;
}

/// Fetches the key set over HTTPS
pub struct HttpJwksSource {
    client: reqwest::Client,
    jwks_uri: String,
}

impl HttpJwksSource {
    #[must_use]
    pub fn new(client: reqwest::Client, jwks_uri: impl Into<String>) -> Self {
        Self {
            client,
            jwks_uri: jwks_uri.into(),
        }
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<JsonWebKeySet, KeyProviderError> {
        debug!("🔑 Fetching JWKS from: {}", self.jwks_uri);

        let response = self
            .client
            .get(&self.jwks_uri)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeyProviderError::Unavailable(format!("Failed to fetch JWKS: {e}")))?;

        if !response.status().is_success() {
            return Err(KeyProviderError::Unavailable(format!(
                "JWKS request failed with status: {}",
                response.status()
            )));
        }

        let jwks: JsonWebKeySet = response
            .json()
            .await
            .map_err(|e| KeyProviderError::Unavailable(format!("Failed to parse JWKS: {e}")))?;

        debug!("Successfully fetched JWKS ({} keys)", jwks.keys.len());
        Ok(jwks)
    }
}

// ============================================================================
// Key Provider
// ============================================================================

/// Process-wide signing key cache with refresh-on-miss
///
/// Entries are immutable once stored. The lock is never held across a fetch,
/// so concurrent cold lookups may fetch redundantly; the last write wins.
#[derive(Clone)]
pub struct KeyProvider {
    keys: Arc<RwLock<HashMap<String, Arc<SigningKey>>>>,
    source: Arc<dyn JwksSource>,
}

impl KeyProvider {
    #[must_use]
    pub fn new(source: Arc<dyn JwksSource>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            source,
        }
    }

    /// Key provider backed by an HTTP JWKS endpoint
    #[must_use]
    pub fn from_uri(client: reqwest::Client, jwks_uri: &str) -> Self {
        Self::new(Arc::new(HttpJwksSource::new(client, jwks_uri)))
    }

    /// Resolve a signing key by key ID
    ///
    /// A miss triggers exactly one fetch of the key set before giving up.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent after the refresh, or
    /// `Unavailable` if the refresh itself fails
    pub async fn signing_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyProviderError> {
        if let Some(key) = self.cached_key(kid).await {
            debug!("🎯 Found cached signing key '{kid}'");
            return Ok(key);
        }

        debug!("Signing key '{kid}' not cached, refreshing key set");
        self.refresh().await?;

        self.cached_key(kid)
            .await
            .ok_or_else(|| KeyProviderError::KeyNotFound(kid.to_string()))
    }

    /// Fetch the key set and merge it into the cache
    ///
    /// Returns the number of keys stored.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the key set cannot be fetched
    pub async fn refresh(&self) -> Result<usize, KeyProviderError> {
        let jwks = self.source.fetch().await?;

        let decoded: Vec<SigningKey> = jwks
            .keys
            .iter()
            .filter_map(|jwk| match SigningKey::from_jwk(jwk) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("⚠️ Skipping unusable JWK {:?}: {e}", jwk.kid);
                    None
                }
            })
            .collect();

        let stored = decoded.len();
        let mut keys = self.keys.write().await;
        for key in decoded {
            keys.insert(key.kid.clone(), Arc::new(key));
        }

        debug!("💾 Cached {stored} signing keys ({} total)", keys.len());
        Ok(stored)
    }

    /// Warm the cache; failures are logged and left for the first request to retry
    pub async fn prefetch(&self) {
        match self.refresh().await {
            Ok(count) => info!("🔑 Prefetched {count} Apple signing keys"),
            Err(e) => warn!("⚠️ Could not prefetch Apple signing keys: {e}"),
        }
    }

    /// Number of keys currently cached
    pub async fn cached_key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    async fn cached_key(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.read().await.get(kid).cloned()
    }
}

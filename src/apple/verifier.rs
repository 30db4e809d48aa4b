// Notification token verification against Apple's signing keys
// Checks signature, issuer, audience and expiry; every failure collapses to `Unauthorized`

use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};

use super::jwks::{KeyProvider, KeyProviderError, PublicKey};

/// Issuer of every Sign in with Apple token
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Clock skew tolerated past `exp`, in seconds
pub const EXPIRY_LEEWAY_SECONDS: i64 = 5;

// ============================================================================
// Error Types
// ============================================================================

/// Opaque verification failure; the specific reason is only logged
#[derive(Debug, thiserror::Error)]
#[error("Unauthorized: invalid notification token")]
pub struct Unauthorized;

#[derive(Debug, thiserror::Error)]
enum VerificationFailure {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Token header has no key ID")]
    MissingKeyId,
    #[error(transparent)]
    KeyProvider(#[from] KeyProviderError),
    #[error("Algorithm mismatch: token uses {token}, key expects {key}")]
    AlgorithmMismatch { token: String, key: String },
    #[error("JWT signature verification failed")]
    SignatureInvalid,
    #[error("Missing required claim '{0}'")]
    MissingClaim(&'static str),
    #[error("Claim '{claim}' validation failed: expected '{expected}', got '{actual}'")]
    ClaimValidationFailed {
        claim: &'static str,
        expected: String,
        actual: String,
    },
    #[error("Token has expired")]
    TokenExpired,
}

// ============================================================================
// JWT Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    kid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JwsAlgorithm {
    Rs256,
    Rs384,
    Rs512,
    Es256,
}

impl JwsAlgorithm {
    fn parse(alg: &str) -> Result<Self, VerificationFailure> {
        match alg {
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "ES256" => Ok(Self::Es256),
            other => Err(VerificationFailure::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Audience claim (can be string or array)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Self::Single(aud) => aud == expected,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Single(aud) => aud.clone(),
            Self::Multiple(auds) => format!("{auds:?}"),
        }
    }

    fn into_values(self) -> Vec<String> {
        match self {
            Self::Single(aud) => vec![aud],
            Self::Multiple(auds) => auds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    iss: Option<String>,
    aud: Option<Audience>,
    sub: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    jti: Option<String>,
    events: Option<serde_json::Value>,
}

/// Claims of a token that passed every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    pub issuer: String,
    /// Every `aud` value as sent, a single string becoming one entry
    pub audience: Vec<String>,
    pub subject: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expiry: DateTime<Utc>,
    pub jwt_id: Option<String>,
    /// Nested JSON-encoded event, as carried by the `events` claim
    pub events: Option<String>,
}

// ============================================================================
// Token Verifier
// ============================================================================

#[derive(Clone)]
pub struct TokenVerifier {
    keys: KeyProvider,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(keys: KeyProvider) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn key_provider(&self) -> &KeyProvider {
        &self.keys
    }

    /// Verify a signed notification token for the given audience
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token is malformed, its key cannot be
    /// resolved, the signature does not verify, or issuer, audience or expiry
    /// checks fail
    pub async fn verify(
        &self,
        token: &str,
        expected_audience: &str,
    ) -> Result<VerifiedClaims, Unauthorized> {
        self.verify_at(token, expected_audience, Utc::now().timestamp())
            .await
    }

    async fn verify_at(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<VerifiedClaims, Unauthorized> {
        match self.try_verify(token, expected_audience, now).await {
            Ok(claims) => {
                info!(
                    "✅ Apple notification token verified (jti={:?})",
                    claims.jwt_id
                );
                Ok(claims)
            }
            Err(failure) => {
                warn!("🚫 Apple notification token rejected: {failure}");
                Err(Unauthorized)
            }
        }
    }

    async fn try_verify(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<VerifiedClaims, VerificationFailure> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(VerificationFailure::InvalidToken(
                "Invalid JWT format".to_string(),
            ));
        };

        let header: JwtHeader = decode_segment(header_b64, "header")?;
        debug!("📋 JWT header: alg={}, kid={:?}", header.alg, header.kid);

        let algorithm = JwsAlgorithm::parse(&header.alg)?;
        let kid = header
            .kid
            .as_deref()
            .ok_or(VerificationFailure::MissingKeyId)?;

        let signing_key = self.keys.signing_key(kid).await?;
        if let Some(key_alg) = &signing_key.alg {
            if key_alg != &header.alg {
                return Err(VerificationFailure::AlgorithmMismatch {
                    token: header.alg,
                    key: key_alg.clone(),
                });
            }
        }

        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| {
                VerificationFailure::InvalidToken(format!("Invalid signature encoding: {e}"))
            })?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        verify_signature(
            algorithm,
            &signing_key.key,
            signing_input.as_bytes(),
            &signature,
        )?;
        debug!("✅ JWT signature verified with key '{kid}'");

        let claims: RawClaims = decode_segment(claims_b64, "claims")?;
        validate_claims(claims, expected_audience, now)
    }
}

/// Decode one base64url JWT segment as JSON
fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &str,
) -> Result<T, VerificationFailure> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerificationFailure::InvalidToken(format!("Invalid {name} encoding: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| VerificationFailure::InvalidToken(format!("Invalid {name} JSON: {e}")))
}

fn verify_signature(
    algorithm: JwsAlgorithm,
    key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerificationFailure> {
    match (algorithm, key) {
        (JwsAlgorithm::Es256, PublicKey::EcP256(verifying_key)) => {
            use p256::ecdsa::{signature::Verifier, Signature};
            // JWS carries the raw 64-byte r || s form, not DER
            let signature = Signature::from_slice(signature)
                .map_err(|_| VerificationFailure::SignatureInvalid)?;
            verifying_key
                .verify(message, &signature)
                .map_err(|_| VerificationFailure::SignatureInvalid)
        }
        (rsa_alg, PublicKey::Rsa(public_key)) if rsa_alg != JwsAlgorithm::Es256 => {
            use rsa::pkcs1v15::{Signature, VerifyingKey};
            use rsa::signature::Verifier;
            let signature =
                Signature::try_from(signature).map_err(|_| VerificationFailure::SignatureInvalid)?;
            let result = match rsa_alg {
                JwsAlgorithm::Rs384 => {
                    VerifyingKey::<Sha384>::new(public_key.clone()).verify(message, &signature)
                }
                JwsAlgorithm::Rs512 => {
                    VerifyingKey::<Sha512>::new(public_key.clone()).verify(message, &signature)
                }
                _ => VerifyingKey::<Sha256>::new(public_key.clone()).verify(message, &signature),
            };
            result.map_err(|_| VerificationFailure::SignatureInvalid)
        }
        (algorithm, _) => Err(VerificationFailure::InvalidToken(format!(
            "Key type does not support {algorithm:?}"
        ))),
    }
}

fn validate_claims(
    claims: RawClaims,
    expected_audience: &str,
    now: i64,
) -> Result<VerifiedClaims, VerificationFailure> {
    let issuer = claims.iss.ok_or(VerificationFailure::MissingClaim("iss"))?;
    if issuer != APPLE_ISSUER {
        return Err(VerificationFailure::ClaimValidationFailed {
            claim: "iss",
            expected: APPLE_ISSUER.to_string(),
            actual: issuer,
        });
    }

    let audience = claims.aud.ok_or(VerificationFailure::MissingClaim("aud"))?;
    if !audience.contains(expected_audience) {
        return Err(VerificationFailure::ClaimValidationFailed {
            claim: "aud",
            expected: expected_audience.to_string(),
            actual: audience.describe(),
        });
    }

    let exp = claims.exp.ok_or(VerificationFailure::MissingClaim("exp"))?;
    if now >= exp.saturating_add(EXPIRY_LEEWAY_SECONDS) {
        return Err(VerificationFailure::TokenExpired);
    }
    let expiry = DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| VerificationFailure::InvalidToken("exp out of range".to_string()))?;

    let events = match claims.events {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(events)) => Some(events),
        // Inline objects are normalized to the string form
        Some(other) => Some(other.to_string()),
    };

    Ok(VerifiedClaims {
        issuer,
        audience: audience.into_values(),
        subject: claims.sub,
        issued_at: claims.iat.and_then(|iat| DateTime::from_timestamp(iat, 0)),
        expiry,
        jwt_id: claims.jti,
        events,
    })
}

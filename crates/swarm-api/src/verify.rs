//! Webhook signature verification.
//!
//! Each ingestion source has a distinct scheme, dispatched by route through
//! a tagged verifier table:
//!
//! - **Discord**: Ed25519 over `timestamp || body`, hex signature in
//!   `X-Signature-Ed25519`, timestamp in `X-Signature-Timestamp`
//! - **Slack**: HMAC-SHA-256 over `v0:{timestamp}:{body}`, signature
//!   `v0=<hex>` in `X-Slack-Signature`, timestamp in
//!   `X-Slack-Request-Timestamp`
//!
//! Timestamps older than the replay window are rejected. All comparisons
//! are constant-time, and every failure collapses into one opaque error so
//! responses cannot reveal whether a signature was structurally or
//! cryptographically invalid.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use swarm_core::{Error, Result};

/// Replay window: signatures older than this many seconds are rejected.
pub const REPLAY_WINDOW_SECS: i64 = 300;

/// Opaque verification failure.
///
/// One variant by design: the response body must not reveal which check
/// failed.
#[derive(Debug, thiserror::Error)]
#[error("request verification failed")]
pub struct VerifyError;

/// Which ingestion source a webhook route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookSource {
    /// Source A: Discord.
    Discord,
    /// Source B: Slack.
    Slack,
}

/// Per-source verification scheme.
pub enum SourceVerifier {
    /// Ed25519 over `timestamp || body`.
    Ed25519 {
        /// The deployment's public key.
        key: VerifyingKey,
    },
    /// HMAC-SHA-256 over `v0:{timestamp}:{body}`.
    HmacSha256 {
        /// The shared signing secret.
        secret: Vec<u8>,
    },
}

impl std::fmt::Debug for SourceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ed25519 { .. } => f.write_str("SourceVerifier::Ed25519"),
            Self::HmacSha256 { .. } => f.write_str("SourceVerifier::HmacSha256"),
        }
    }
}

impl SourceVerifier {
    /// Builds an Ed25519 verifier from a hex-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 32 hex-encoded bytes or is not a
    /// valid curve point.
    pub fn ed25519_from_hex(hex_key: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(hex_key)
            .map_err(|e| Error::InvalidInput(format!("public key must be hex: {e}")))?
            .try_into()
            .map_err(|_| Error::InvalidInput("public key must be 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::InvalidInput(format!("invalid public key: {e}")))?;
        Ok(Self::Ed25519 { key })
    }

    /// Builds an HMAC verifier from a shared secret.
    #[must_use]
    pub fn hmac_sha256(secret: impl Into<Vec<u8>>) -> Self {
        Self::HmacSha256 {
            secret: secret.into(),
        }
    }

    /// Verifies a signed request.
    ///
    /// # Errors
    ///
    /// Returns the single opaque [`VerifyError`] on any failure: stale or
    /// unparseable timestamp, malformed signature, or signature mismatch.
    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> std::result::Result<(), VerifyError> {
        check_replay_window(timestamp, now)?;
        match self {
            Self::Ed25519 { key } => verify_ed25519(key, timestamp, signature, body),
            Self::HmacSha256 { secret } => verify_hmac(secret, timestamp, signature, body),
        }
    }
}

fn check_replay_window(timestamp: &str, now: DateTime<Utc>) -> std::result::Result<(), VerifyError> {
    let ts: i64 = timestamp.parse().map_err(|_| VerifyError)?;
    if now.timestamp() - ts > REPLAY_WINDOW_SECS {
        return Err(VerifyError);
    }
    Ok(())
}

fn verify_ed25519(
    key: &VerifyingKey,
    timestamp: &str,
    signature: &str,
    body: &[u8],
) -> std::result::Result<(), VerifyError> {
    let bytes: [u8; 64] = hex::decode(signature)
        .map_err(|_| VerifyError)?
        .try_into()
        .map_err(|_| VerifyError)?;
    let signature = Signature::from_bytes(&bytes);

    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(body);
    key.verify(&message, &signature).map_err(|_| VerifyError)
}

fn verify_hmac(
    secret: &[u8],
    timestamp: &str,
    signature: &str,
    body: &[u8],
) -> std::result::Result<(), VerifyError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| VerifyError)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    // Decode failures fall through to a comparison against zeros so the
    // timing profile does not depend on signature structure.
    let provided: [u8; 32] = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .and_then(|bytes| bytes.try_into().ok())
        .unwrap_or([0u8; 32]);

    if expected.as_slice().ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(VerifyError)
    }
}

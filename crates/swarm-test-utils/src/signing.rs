//! Signed webhook builders matching the gateway's verification schemes.

use ed25519_dalek::{Signer, SigningKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use sha2::Sha256;

/// Test signer for the Ed25519 ingestion source.
pub struct DiscordSigner {
    key: SigningKey,
}

impl Default for DiscordSigner {
    fn default() -> Self {
        Self::generate()
    }
}

impl DiscordSigner {
    /// Generates a fresh keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Returns the hex-encoded public key, as configured on the gateway.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// Signs `timestamp || body`, returning the hex signature header value.
    #[must_use]
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        hex::encode(self.key.sign(&message).to_bytes())
    }
}

/// Computes the Slack-style signature header `v0=<hex>` over
/// `v0:{timestamp}:{body}`.
///
/// # Panics
///
/// Panics if the secret is unusable as an HMAC key (cannot happen for
/// SHA-256, which accepts any key length).
#[must_use]
pub fn slack_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

//! VAPID key generation for credential bootstrap.

use crate::config::Credentials;
use crate::error::{NotifyError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ece::crypto::LocalKeyPair;

/// Generate a fresh P-256 application server key pair.
///
/// Keys come back as unpadded base64url: the 32-byte private scalar and the
/// 65-byte uncompressed public point.
pub fn generate_credentials(subscriber: impl Into<String>) -> Result<Credentials> {
    let (key_pair, _auth_secret) = ece::generate_keypair_and_auth_secret()
        .map_err(|e| NotifyError::KeyGeneration(format!("key generation failed: {e}")))?;

    let components = key_pair
        .raw_components()
        .map_err(|e| NotifyError::KeyGeneration(format!("key export failed: {e}")))?;

    let mut private = components.private_key().to_vec();
    // The scalar may come back without its leading zero bytes.
    while private.len() < 32 {
        private.insert(0, 0);
    }

    let credentials = Credentials {
        subscriber: subscriber.into(),
        vapid_public_key: URL_SAFE_NO_PAD.encode(components.public_key()),
        vapid_private_key: URL_SAFE_NO_PAD.encode(&private),
    };
    credentials.validate()?;

    Ok(credentials)
}

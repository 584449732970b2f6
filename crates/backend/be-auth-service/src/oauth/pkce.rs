use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

fn random_bytes<const N: usize>() -> Result<[u8; N], AuthError> {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Internal(format!("Failed to generate random bytes: {e}")))?;
    Ok(bytes)
}

/// Opaque value tying an authorization request to its callback.
pub fn generate_state() -> Result<String, AuthError> {
    Ok(hex::encode(random_bytes::<32>()?))
}

/// A 43 character verifier, the minimum length allowed for PKCE.
pub fn generate_verifier() -> Result<String, AuthError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<32>()?))
}

/// S256 code challenge for `verifier`.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

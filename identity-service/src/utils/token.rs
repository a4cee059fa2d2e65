//! Opaque capability tokens (session handles, OAuth state correlators).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Entropy of every generated token, in bytes (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe random token from the OS-seeded CSPRNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest used as the storage key for a token.
///
/// Only the digest is persisted, so a leaked table row is not a usable capability.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

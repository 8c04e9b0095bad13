use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::warn;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Generate a random 256-bit key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Turn the configured secret into a 32-byte key.
///
/// - absent or empty: random key (anything encrypted with it is unreadable
///   after a restart)
/// - 64 hex characters: hex-decoded
/// - exactly 32 bytes: used as-is
/// - anything else: SHA-256 of the secret
pub fn derive_key(secret: Option<&str>) -> [u8; KEY_LEN] {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        warn!("No encryption key configured, using a random per-process key");
        return generate_key();
    };

    if secret.len() == KEY_LEN * 2 && secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        let mut key = [0u8; KEY_LEN];
        if hex::decode_to_slice(secret, &mut key).is_ok() {
            return key;
        }
    }

    if let Ok(key) = <[u8; KEY_LEN]>::try_from(secret.as_bytes()) {
        return key;
    }

    warn!("Encryption key format not recognized, hashing it to 32 bytes");
    Sha256::digest(secret.as_bytes()).into()
}

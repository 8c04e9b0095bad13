use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use tracing::warn;

use crate::keys::{KEY_LEN, derive_key};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// CBC initialization vector length (one AES block).
pub const IV_LEN: usize = 16;

/// Returned in place of message text that cannot be decrypted.
pub const DECRYPT_FAILED_SENTINEL: &str = "[Unable to decrypt message]";

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("malformed stored text: {0}")]
    Malformed(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Message text as it sits in storage.
///
/// Rows written before at-rest encryption hold bare plaintext; everything
/// written since is `hex(iv):hex(payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredText {
    Plain(String),
    Encrypted { iv: [u8; IV_LEN], payload: Vec<u8> },
}

impl StoredText {
    /// Parse the storage encoding. A string without `:` is legacy plaintext.
    pub fn parse(stored: &str) -> Result<Self, CipherError> {
        let Some((iv_hex, payload_hex)) = stored.split_once(':') else {
            return Ok(Self::Plain(stored.to_string()));
        };

        if iv_hex.is_empty() || payload_hex.is_empty() || payload_hex.contains(':') {
            return Err(CipherError::Malformed(
                "expected exactly two non-empty parts".into(),
            ));
        }

        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv)
            .map_err(|e| CipherError::Malformed(format!("iv: {e}")))?;
        let payload =
            hex::decode(payload_hex).map_err(|e| CipherError::Malformed(format!("payload: {e}")))?;

        Ok(Self::Encrypted { iv, payload })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            Self::Encrypted { iv, payload } => format!("{}:{}", hex::encode(iv), hex::encode(payload)),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }
}

impl fmt::Display for StoredText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// AES-256-CBC message cipher holding the server's text key.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").field("key", &"<redacted>").finish()
    }
}

impl Cipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Build a cipher from the configured secret (see [`derive_key`]).
    pub fn from_secret(secret: Option<&str>) -> Self {
        Self::new(derive_key(secret))
    }

    /// Encrypt under a fresh random IV.
    pub fn seal(&self, plaintext: &str) -> Result<StoredText, CipherError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|_| CipherError::Encryption("invalid key or iv length".into()))?;
        let payload = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(StoredText::Encrypted { iv, payload })
    }

    /// Recover plaintext. Legacy plaintext is returned unchanged.
    pub fn open(&self, stored: &StoredText) -> Result<String, CipherError> {
        let (iv, payload) = match stored {
            StoredText::Plain(text) => return Ok(text.clone()),
            StoredText::Encrypted { iv, payload } => (iv, payload),
        };

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CipherError::Decryption("invalid key or iv length".into()))?;
        let bytes = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(payload)
            .map_err(|_| CipherError::Decryption("bad padding or wrong key".into()))?;

        String::from_utf8(bytes).map_err(|_| CipherError::Decryption("plaintext is not UTF-8".into()))
    }

    /// Encrypt optional message text into its storage encoding.
    /// `None` and empty text pass through untouched.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, CipherError> {
        match plaintext {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => self.seal(text).map(|stored| Some(stored.encode())),
        }
    }

    /// Decrypt optional stored text. Never fails: anything that does not
    /// decrypt comes back as [`DECRYPT_FAILED_SENTINEL`].
    pub fn decrypt(&self, stored: Option<&str>) -> Option<String> {
        let stored = stored?;

        match StoredText::parse(stored).and_then(|text| self.open(&text)) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                warn!("Message text could not be decrypted: {}", e);
                Some(DECRYPT_FAILED_SENTINEL.to_string())
            }
        }
    }
}

/// Parley Crypto Library
///
/// At-rest encryption of direct-message text. The server holds a single
/// symmetric key (AES-256) derived from configuration; every message gets a
/// fresh random IV. Plaintext never leaves the API layer in storage form.

pub mod cipher;
pub mod keys;

pub use cipher::{Cipher, CipherError, DECRYPT_FAILED_SENTINEL, StoredText};
pub use keys::{KEY_LEN, derive_key, generate_key};

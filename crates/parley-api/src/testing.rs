use std::sync::Arc;

use tempfile::TempDir;

use parley_crypto::{Cipher, generate_key};
use parley_db::Database;
use parley_gateway::presence::PresenceRegistry;

use crate::state::{AppState, AppStateInner};
use crate::uploads::{ImageStore, LocalImageStore};

pub const JWT_SECRET: &str = "test-jwt-secret";

// 1x1 transparent PNG
pub const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// In-memory state with an upload directory that is removed when the
/// returned `TempDir` drops.
pub fn test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: JWT_SECRET.into(),
        cipher: Cipher::new(generate_key()),
        images: ImageStore::Local(LocalImageStore::new(dir.path().to_path_buf(), "http://localhost:5001")),
        presence: PresenceRegistry::new(),
    });
    (state, dir)
}

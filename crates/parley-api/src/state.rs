use std::sync::Arc;

use parley_crypto::Cipher;
use parley_db::Database;
use parley_gateway::presence::PresenceRegistry;

use crate::error::{ApiError, ApiResult};
use crate::uploads::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub cipher: Cipher,
    pub images: ImageStore,
    pub presence: PresenceRegistry,
}

/// Run a blocking DB call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Storage)
}

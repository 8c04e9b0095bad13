use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, messages, users};

/// Base64 inflates images by a third; leave room for the JSON around them.
const MAX_BODY_SIZE: usize = 15 * 1024 * 1024;

/// REST routes. Static uploads are served when the local image store is in use.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/messages/users", get(users::get_users_for_sidebar))
        .route("/api/messages/{peer_id}", get(messages::get_messages))
        .route("/api/messages/send/{peer_id}", post(messages::send_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state.clone());

    let mut app = Router::new().merge(public_routes).merge(protected_routes);

    if let Some(dir) = state.images.local_dir() {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app
}

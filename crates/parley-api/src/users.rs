use axum::{Extension, Json, extract::State, response::IntoResponse};

use parley_types::api::Claims;
use parley_types::models::UserProfile;

use crate::error::ApiResult;
use crate::rows::profile_from_row;
use crate::state::{AppState, run_db};

/// GET /api/messages/users: everyone but the caller, for the sidebar.
pub async fn get_users_for_sidebar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_other_users(&me)).await?;

    let users: Vec<UserProfile> = rows.into_iter().map(profile_from_row).collect();
    Ok(Json(users))
}

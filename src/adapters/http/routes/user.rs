use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use crate::{
    adapters::http::{
        app_state::AppState,
        extract::{AppJson, SessionUser},
    },
    app_error::AppResult,
    application::use_cases::user::UpdateProfileInput,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

async fn get_profile(
    State(app_state): State<AppState>,
    SessionUser(user_id): SessionUser,
) -> AppResult<impl IntoResponse> {
    let profile = app_state.user_use_cases.get_profile(user_id).await?;
    Ok(Json(profile))
}

async fn update_profile(
    State(app_state): State<AppState>,
    SessionUser(user_id): SessionUser,
    AppJson(payload): AppJson<UpdateProfileInput>,
) -> AppResult<impl IntoResponse> {
    let profile = app_state
        .user_use_cases
        .update_profile(user_id, payload)
        .await?;
    Ok(Json(profile))
}

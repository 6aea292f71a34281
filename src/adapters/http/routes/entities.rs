use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    adapters::http::{
        app_state::AppState,
        extract::{AppJson, SessionUser},
    },
    app_error::{AppError, AppResult},
    application::use_cases::entity::{CreateEntityInput, ListEntitiesQuery, UpdateEntityInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entities).post(create_entity))
        .route(
            "/{id}",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
}

/// Ids that are not UUIDs cannot name a stored entity.
fn parse_entity_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("Entity not found"))
}

async fn list_entities(
    State(app_state): State<AppState>,
    SessionUser(_user_id): SessionUser,
    query: Result<Query<ListEntitiesQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(query) = query.map_err(|e| AppError::validation(e.body_text()))?;
    let entities = app_state.entity_use_cases.list(&query).await?;
    Ok(Json(entities))
}

async fn create_entity(
    State(app_state): State<AppState>,
    SessionUser(user_id): SessionUser,
    AppJson(payload): AppJson<CreateEntityInput>,
) -> AppResult<impl IntoResponse> {
    let entity = app_state.entity_use_cases.create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

async fn get_entity(
    State(app_state): State<AppState>,
    SessionUser(_user_id): SessionUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entity = app_state.entity_use_cases.get(parse_entity_id(&id)?).await?;
    Ok(Json(entity))
}

async fn update_entity(
    State(app_state): State<AppState>,
    SessionUser(_user_id): SessionUser,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateEntityInput>,
) -> AppResult<impl IntoResponse> {
    let entity = app_state
        .entity_use_cases
        .update(parse_entity_id(&id)?, payload)
        .await?;
    Ok(Json(entity))
}

async fn delete_entity(
    State(app_state): State<AppState>,
    SessionUser(_user_id): SessionUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    app_state
        .entity_use_cases
        .delete(parse_entity_id(&id)?)
        .await?;
    Ok(Json(json!({ "message": "Entity deleted successfully" })))
}

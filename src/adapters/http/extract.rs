use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppError, application::jwt};

pub use crate::infra::rate_limit::USER_ID_HEADER;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// `Json` whose rejections are reported as `ValidationError` instead of axum's plain text.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::validation(rejection.body_text())),
        }
    }
}

/// The signed-in user, from the `access_token` cookie or a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUser(pub Uuid);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = match jar.get(ACCESS_TOKEN_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => bearer_token(parts).ok_or(AppError::Unauthorized)?,
        };

        let claims = jwt::verify(&token, &state.config.jwt_secret)?;
        Ok(SessionUser(claims.user_id()?))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Caller identity for billing endpoints, taken from the `x-user-id` header set by the
/// authenticating frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(CallerId)
            .ok_or(AppError::Unauthorized)
    }
}

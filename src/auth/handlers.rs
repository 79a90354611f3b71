use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{CreateUserRequest, PublicUser, TokenRequest, TokenResponse, UpdateMeRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::{ApiError, ApiJson},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/token", post(create_token))
        .route("/user/me", get(get_me).patch(update_me))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = services::create_user(
        state.users.as_ref(),
        state.config.password_min_length,
        payload,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let token = services::issue_token(state.users.as_ref(), &keys, payload).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let Some(user) = state.users.find_by_id(user_id).await? else {
        warn!(%user_id, "token refers to missing user");
        return Err(ApiError::Unauthorized("User not found".into()));
    };
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<UpdateMeRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = services::update_me(
        state.users.as_ref(),
        state.config.password_min_length,
        user_id,
        payload,
    )
    .await?;
    Ok(Json(user.into()))
}

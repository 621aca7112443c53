use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::auth::{JwtAuthenticationResponse, SignInRequest, SignUpRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::UserSummary,
    response::ApiResponse,
    routes::AppJson,
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Register user", body = ApiResponse<UserSummary>),
        (status = 400, description = "Missing field, username or email taken")
    ),
    tag = "Auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignUpRequest>,
) -> AppResult<Json<ApiResponse<UserSummary>>> {
    let resp = auth_service::sign_up(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Issue a bearer token", body = ApiResponse<JwtAuthenticationResponse>),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn signin(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignInRequest>,
) -> AppResult<Json<ApiResponse<JwtAuthenticationResponse>>> {
    let resp = auth_service::sign_in(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserSummary>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<UserSummary>>> {
    let resp = auth_service::current_user(&state, &user).await?;
    Ok(Json(resp))
}

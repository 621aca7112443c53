use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::orders::OrderWithItems,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    responses(
        (status = 200, description = "Current user's orders, newest first", body = ApiResponse<Vec<OrderWithItems>>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<OrderWithItems>>>> {
    let resp = order_service::list_orders(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    responses(
        (status = 200, description = "Order placed", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Empty cart or insufficient stock"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::checkout(&state, &user).await?;
    Ok(Json(resp))
}

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::products::SearchQuery,
    error::AppResult,
    models::Product,
    response::ApiResponse,
    routes::{AppPath, AppQuery},
    services::product_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/search", get(search_products))
        .route("/{id}", get(get_product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    responses(
        (status = 200, description = "List active products", body = ApiResponse<Vec<Product>>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let resp = product_service::list_products(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Search active products by name", body = ApiResponse<Vec<Product>>)
    ),
    tag = "Products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let resp = product_service::search_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Get product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

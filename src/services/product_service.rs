use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, Func, LockType};
use uuid::Uuid;

use crate::{
    dto::products::{DeleteOutcome, DeleteProductResponse, ProductRequest, SearchQuery},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        products::{self, ActiveModel, Column, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_products(state: &AppState) -> AppResult<ApiResponse<Vec<Product>>> {
    let items = Products::find()
        .filter(products::active_condition())
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::list("Products", items))
}

pub async fn search_products(
    state: &AppState,
    query: SearchQuery,
) -> AppResult<ApiResponse<Vec<Product>>> {
    let term = query.name.unwrap_or_default();
    let term = term.trim();
    if term.is_empty() {
        return list_products(state).await;
    }

    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    let items = Products::find()
        .filter(products::active_condition())
        .filter(Expr::expr(Func::lower(Expr::col(Column::Name))).like(pattern))
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::list("Products", items))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_active());
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::not_found("Product")),
    };
    Ok(ApiResponse::success(
        "Product",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn list_all_products(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<Product>>> {
    ensure_admin(user)?;
    let items = Products::find()
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::list("Products", items))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: ProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let valid = payload.validate()?;

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(valid.name),
        description: Set(valid.description),
        price: Set(valid.price),
        stock: Set(valid.stock),
        image_url: Set(valid.image_url),
        active: Set(Some(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(product_id = %product.id, admin_id = %user.user_id, "product created");

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let valid = payload.validate()?;

    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::not_found("Product")),
    };

    let mut active: ActiveModel = existing.into();
    active.name = Set(valid.name);
    active.description = Set(valid.description);
    active.price = Set(valid.price);
    active.stock = Set(valid.stock);
    active.image_url = Set(valid.image_url);
    let product = active.update(&state.orm).await?;

    tracing::info!(product_id = %product.id, admin_id = %user.user_id, "product updated");

    Ok(ApiResponse::success(
        "Product updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Remove a product, or deactivate it when order history still references it.
///
/// The product row is locked for the whole decision so a concurrent checkout
/// cannot attach a new order line between the reference check and the delete.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<DeleteProductResponse>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => {
            return Err(AppError::NotFound(format!(
                "Product not found with id: {id}"
            )));
        }
    };

    let removed_lines = CartItems::delete_many()
        .filter(CartCol::ProductId.eq(id))
        .exec(&txn)
        .await?
        .rows_affected;

    let referenced = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(id))
        .count(&txn)
        .await?
        > 0;

    let outcome = if referenced {
        let mut active: ActiveModel = product.into();
        active.active = Set(Some(false));
        active.update(&txn).await?;
        DeleteOutcome::Deactivated
    } else {
        Products::delete_by_id(id).exec(&txn).await?;
        DeleteOutcome::Deleted
    };

    txn.commit().await?;

    tracing::info!(
        product_id = %id,
        admin_id = %user.user_id,
        removed_cart_lines = removed_lines,
        outcome = ?outcome,
        "product delete handled"
    );

    Ok(ApiResponse::success(
        outcome.message(),
        DeleteProductResponse { outcome },
        Some(Meta::empty()),
    ))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("widget"), "widget");
    }
}

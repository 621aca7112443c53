use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, OnConflict};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Upper bound on a single cart line, after merging.
pub const MAX_CART_QUANTITY: i32 = 10_000;

fn check_quantity(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if quantity > MAX_CART_QUANTITY {
        return Err(quantity_too_large());
    }
    Ok(())
}

fn quantity_too_large() -> AppError {
    AppError::BadRequest(format!("quantity cannot exceed {MAX_CART_QUANTITY}"))
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<CartItem>>> {
    let items = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .find_also_related(Products)
        .order_by_asc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(line, product)| product.map(|p| CartItem::from_entity(line, p)))
        .collect();

    Ok(ApiResponse::list("OK", items))
}

/// Add a product to the cart, merging into the existing line for it.
///
/// The merge is a single upsert against the `(user_id, product_id)` unique
/// key, so concurrent adds of one product never produce two lines. The
/// update only fires while the merged quantity stays within
/// `MAX_CART_QUANTITY`; otherwise nothing is written and the add is a 400.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    check_quantity(payload.quantity)?;

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::not_found("Product")),
    };
    if !product.is_active() {
        return Err(AppError::BadRequest(format!(
            "Product {} is no longer available",
            product.name
        )));
    }

    let line = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        quantity: Set(payload.quantity),
        created_at: NotSet,
    };

    let written = CartItems::insert(line)
        .on_conflict(
            OnConflict::columns([CartCol::UserId, CartCol::ProductId])
                .value(
                    CartCol::Quantity,
                    Expr::cust("cart_items.quantity + EXCLUDED.quantity"),
                )
                .action_and_where(Expr::cust(format!(
                    "cart_items.quantity + EXCLUDED.quantity <= {MAX_CART_QUANTITY}"
                )))
                .to_owned(),
        )
        .exec_without_returning(&state.orm)
        .await?;
    if written == 0 {
        return Err(quantity_too_large());
    }

    let merged = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(payload.product_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Cart item"))?;

    tracing::debug!(
        user_id = %user.user_id,
        product_id = %payload.product_id,
        quantity = merged.quantity,
        "cart line merged"
    );

    Ok(ApiResponse::success(
        "Product added to cart successfully",
        CartItem::from_entity(merged, product),
        Some(Meta::empty()),
    ))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    check_quantity(payload.quantity)?;

    let found = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::Id.eq(id))
                .add(CartCol::UserId.eq(user.user_id)),
        )
        .find_also_related(Products)
        .one(&state.orm)
        .await?;
    let (line, product) = match found {
        Some((line, Some(product))) => (line, product),
        _ => return Err(AppError::not_found("Cart item")),
    };

    let mut active: CartActive = line.into();
    active.quantity = Set(payload.quantity);
    let line = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Cart item updated successfully",
        CartItem::from_entity(line, product),
        Some(Meta::empty()),
    ))
}

/// Delete one of the caller's cart lines. Missing lines are not an error.
pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartCol::Id.eq(id))
                .add(CartCol::UserId.eq(user.user_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        tracing::debug!(user_id = %user.user_id, cart_item_id = %id, "cart line already gone");
    }

    Ok(ApiResponse::success(
        "Item removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::{MAX_CART_QUANTITY, check_quantity};
    use crate::error::AppError;

    #[test]
    fn quantity_must_be_positive() {
        assert!(check_quantity(1).is_ok());
        assert!(matches!(check_quantity(0), Err(AppError::BadRequest(_))));
        assert!(matches!(check_quantity(-3), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn quantity_is_capped_well_below_integer_range() {
        assert!(check_quantity(MAX_CART_QUANTITY).is_ok());
        match check_quantity(MAX_CART_QUANTITY + 1) {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "quantity cannot exceed 10000"),
            other => panic!("expected bad request, got {other:?}"),
        }
        assert!(matches!(check_quantity(i32::MAX), Err(AppError::BadRequest(_))));
    }
}

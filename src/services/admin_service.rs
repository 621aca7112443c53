use std::collections::HashMap;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    dto::orders::{AdminOrder, UpdateStatusQuery},
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Order,
    response::{ApiResponse, Meta},
    services::order_service::attach_items,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<AdminOrder>>> {
    ensure_admin(user)?;

    let orders = Orders::find()
        .order_by_desc(OrderCol::OrderDate)
        .all(&state.orm)
        .await?;

    let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
    let usernames: HashMap<Uuid, String> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        Users::find()
            .filter(UserCol::Id.is_in(user_ids))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect()
    };

    let items = attach_items(&state.orm, orders)
        .await?
        .into_iter()
        .map(|order| AdminOrder {
            customer: usernames
                .get(&order.order.user_id)
                .cloned()
                .unwrap_or_default(),
            order,
        })
        .collect();

    Ok(ApiResponse::list("Orders", items))
}

/// Overwrite an order's status. Any status may follow any other.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    query: UpdateStatusQuery,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let status = query
        .status
        .parse::<OrderStatus>()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::not_found("Order")),
    };
    let previous = existing.status;

    let mut active: OrderActive = existing.into();
    active.status = Set(status);
    let order = active.update(&state.orm).await?;

    tracing::info!(
        order_id = %order.id,
        admin_id = %user.user_id,
        from = %previous,
        to = %order.status,
        "order status updated"
    );

    Ok(ApiResponse::success(
        "Order status updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

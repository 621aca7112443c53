use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, LoaderTrait, QueryFilter,
    QueryOrder, QuerySelect, SelectTwo, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    dto::orders::OrderWithItems,
    entity::{
        cart_items::{self, Column as CartCol, Entity as CartItems},
        order_items::{self, ActiveModel as OrderItemActive, Entity as OrderItems},
        orders::{self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus},
        products::{self, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// One cart line joined with the product state it was locked against.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub stock: i32,
    pub active: bool,
}

impl CheckoutLine {
    fn from_entity(line: cart_items::Model, product: products::Model) -> Self {
        let active = product.is_active();
        Self {
            product_id: product.id,
            product_name: product.name,
            unit_price: product.price,
            quantity: line.quantity,
            stock: product.stock,
            active,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Validate every line against its product and return the order total.
///
/// Nothing is written here; any rejection leaves the cart and stock as they were.
pub fn price_cart(lines: &[CheckoutLine]) -> AppResult<Decimal> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut total = Decimal::ZERO;
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if !line.active {
            return Err(AppError::BadRequest(format!(
                "Product {} is no longer available",
                line.product_name
            )));
        }
        if line.stock < line.quantity {
            return Err(insufficient_stock(&line.product_name));
        }
        total += line.subtotal();
    }
    Ok(total)
}

fn insufficient_stock(product_name: &str) -> AppError {
    AppError::BadRequest(format!("Insufficient stock for product: {product_name}"))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<OrderWithItems>>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::OrderDate)
        .all(&state.orm)
        .await?;

    let orders = attach_items(&state.orm, orders).await?;
    Ok(ApiResponse::list("Ok", orders))
}

/// The caller's cart lines joined with their products, locked for update.
fn locked_cart(user_id: Uuid) -> SelectTwo<CartItems, Products> {
    CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .inner_join(Products)
        .select_also(Products)
        .order_by_asc(CartCol::ProductId)
        .lock(LockType::Update)
}

/// Turn the caller's cart into an order in one transaction.
///
/// Cart rows and their products are inner-joined and read `FOR UPDATE` in
/// product-id order. The join must stay inner: Postgres refuses row locks on
/// the nullable side of an outer join. Each stock decrement only applies
/// while `stock >= quantity`, so two checkouts racing for the same product
/// cannot both take the last units.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let rows = locked_cart(user.user_id).all(&txn).await?;

    let lines: Vec<CheckoutLine> = rows
        .into_iter()
        .filter_map(|(line, product)| product.map(|p| CheckoutLine::from_entity(line, p)))
        .collect();

    let total_amount = price_cart(&lines)?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        order_date: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());

    for line in &lines {
        let decremented = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .filter(ProdCol::Stock.gte(line.quantity))
            .exec(&txn)
            .await?;
        if decremented.rows_affected != 1 {
            // Dropping the transaction rolls back the order insert above.
            return Err(insufficient_stock(&line.product_name));
        }

        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
        }
        .insert(&txn)
        .await?;

        order_items.push(OrderItem::from_entity(item, line.product_name.clone()));
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(
        user_id = %user.user_id,
        order_id = %order.id,
        lines = order_items.len(),
        total = %order.total_amount,
        "checkout completed"
    );

    Ok(ApiResponse::success(
        "Order placed successfully",
        OrderWithItems {
            order: Order::from(order),
            order_items,
        },
        Some(Meta::empty()),
    ))
}

/// Load the items of each order, with product names, preserving order.
pub async fn attach_items<C>(db: &C, orders: Vec<orders::Model>) -> AppResult<Vec<OrderWithItems>>
where
    C: ConnectionTrait,
{
    let items_per_order: Vec<Vec<order_items::Model>> = orders.load_many(OrderItems, db).await?;

    let product_ids: Vec<Uuid> = items_per_order
        .iter()
        .flatten()
        .map(|item| item.product_id)
        .collect();
    let names: HashMap<Uuid, String> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect()
    };

    let result = orders
        .into_iter()
        .zip(items_per_order)
        .map(|(order, items)| OrderWithItems {
            order: Order::from(order),
            order_items: items
                .into_iter()
                .map(|item| {
                    let name = names.get(&item.product_id).cloned().unwrap_or_default();
                    OrderItem::from_entity(item, name)
                })
                .collect(),
        })
        .collect();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::QueryTrait;

    fn line(name: &str, price: Decimal, quantity: i32, stock: i32) -> CheckoutLine {
        CheckoutLine {
            product_id: Uuid::new_v4(),
            product_name: name.into(),
            unit_price: price,
            quantity,
            stock,
            active: true,
        }
    }

    fn bad_request(result: AppResult<Decimal>) -> String {
        match result {
            Err(AppError::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn checkout_locks_cart_through_an_inner_join() {
        let sql = locked_cart(Uuid::new_v4())
            .build(sea_orm::DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("INNER JOIN \"products\""), "{sql}");
        assert!(!sql.contains("LEFT JOIN"), "{sql}");
        assert!(sql.ends_with("FOR UPDATE"), "{sql}");
    }

    #[test]
    fn totals_widget_and_gadget_exactly() {
        let lines = vec![
            line("Widget", dec!(10.00), 2, 5),
            line("Gadget", dec!(5.00), 1, 1),
        ];
        assert_eq!(price_cart(&lines).unwrap(), dec!(25.00));
    }

    #[test]
    fn decimal_total_has_no_float_drift() {
        let lines = vec![line("Dime", dec!(0.10), 3, 10), line("Fifth", dec!(0.20), 1, 10)];
        assert_eq!(price_cart(&lines).unwrap(), dec!(0.50));
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert_eq!(bad_request(price_cart(&[])), "Cart is empty");
    }

    #[test]
    fn any_short_line_rejects_the_whole_cart() {
        let lines = vec![
            line("Widget", dec!(10.00), 2, 5),
            line("Gadget", dec!(5.00), 3, 2),
        ];
        assert_eq!(
            bad_request(price_cart(&lines)),
            "Insufficient stock for product: Gadget"
        );
    }

    #[test]
    fn exact_stock_is_enough() {
        let lines = vec![line("Widget", dec!(1.25), 4, 4)];
        assert_eq!(price_cart(&lines).unwrap(), dec!(5.00));
    }

    #[test]
    fn inactive_product_is_rejected() {
        let mut retired = line("Retired", dec!(3.00), 1, 10);
        retired.active = false;
        assert_eq!(
            bad_request(price_cart(&[retired])),
            "Product Retired is no longer available"
        );
    }
}

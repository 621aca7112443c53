use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    cart_items, order_items, orders,
    orders::OrderStatus,
    products,
    users::{self, Role},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<users::Model> for UserSummary {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: model.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "10.00")]
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        let active = model.is_active();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            image_url: model.image_url,
            active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_entity(model: cart_items::Model, product: products::Model) -> Self {
        Self {
            id: model.id,
            product: product.into(),
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String, example = "25.00")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_amount: model.total_amount,
            status: model.status,
            order_date: model.order_date.with_timezone(&Utc),
        }
    }
}

/// The product an order line refers to, as far as history needs it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderedProduct {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product: OrderedProduct,
    pub quantity: i32,
    /// Unit price captured at checkout.
    #[schema(value_type = String, example = "10.00")]
    pub price: Decimal,
}

impl OrderItem {
    pub fn from_entity(model: order_items::Model, product_name: String) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product: OrderedProduct {
                id: model.product_id,
                name: product_name,
            },
            quantity: model.quantity,
            price: model.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use rust_decimal_macros::dec;

    fn product_model(active: Option<bool>) -> products::Model {
        products::Model {
            id: Uuid::new_v4(),
            name: "Widget".into(),
            description: None,
            price: dec!(10.00),
            stock: 3,
            image_url: None,
            active,
            created_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()),
        }
    }

    #[test]
    fn unset_active_flag_is_reported_active() {
        assert!(Product::from(product_model(None)).active);
        assert!(Product::from(product_model(Some(true))).active);
        assert!(!Product::from(product_model(Some(false))).active);
    }

    #[test]
    fn product_json_uses_camel_case_and_exact_price() {
        let mut model = product_model(None);
        model.image_url = Some("http://img/widget.png".into());
        let json = serde_json::to_value(Product::from(model)).unwrap();
        assert_eq!(json["imageUrl"], "http://img/widget.png");
        assert_eq!(json["price"], "10.00");
    }
}

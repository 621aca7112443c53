use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;

/// Largest price a `NUMERIC(12, 2)` column holds.
const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Body for both create and full update of a product.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "10.00")]
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
}

/// A product request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
}

impl ProductRequest {
    pub fn validate(self) -> Result<ValidProduct, AppError> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("Product name is required".into()))?;

        let mut price = self
            .price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| AppError::BadRequest("Product price must be greater than 0".into()))?
            .normalize();
        if price.scale() > 2 {
            return Err(AppError::BadRequest(
                "Product price cannot have more than 2 decimal places".into(),
            ));
        }
        if price > MAX_PRICE {
            return Err(AppError::BadRequest(format!(
                "Product price cannot exceed {MAX_PRICE}"
            )));
        }
        price.rescale(2);

        let stock = self
            .stock
            .filter(|s| *s >= 0)
            .ok_or_else(|| AppError::BadRequest("Product stock cannot be negative".into()))?;

        Ok(ValidProduct {
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            price,
            stock,
            image_url: self.image_url.filter(|u| !u.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive substring of the product name.
    pub name: Option<String>,
}

/// What a delete request ended up doing to the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Deactivated,
}

impl DeleteOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            DeleteOutcome::Deleted => "Product deleted successfully (removed from active carts)",
            DeleteOutcome::Deactivated => {
                "Product deactivated successfully (exists in order history, so marked as inactive instead of deleted)"
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteProductResponse {
    pub outcome: DeleteOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> ProductRequest {
        ProductRequest {
            name: Some("  Widget ".into()),
            description: Some("A widget".into()),
            price: Some(dec!(10.00)),
            stock: Some(5),
            image_url: Some(String::new()),
        }
    }

    fn bad_request_message(result: Result<ValidProduct, AppError>) -> String {
        match result {
            Err(AppError::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn accepts_valid_product_and_normalizes_fields() {
        let valid = request().validate().unwrap();
        assert_eq!(valid.name, "Widget");
        assert_eq!(valid.price, dec!(10.00));
        assert_eq!(valid.image_url, None);
    }

    #[test]
    fn rejects_blank_name() {
        let mut req = request();
        req.name = Some("   ".into());
        assert_eq!(bad_request_message(req.validate()), "Product name is required");
    }

    #[test]
    fn rejects_non_positive_price() {
        let mut req = request();
        req.price = Some(Decimal::ZERO);
        assert_eq!(
            bad_request_message(req.validate()),
            "Product price must be greater than 0"
        );
    }

    #[test]
    fn rejects_sub_cent_prices_instead_of_rounding() {
        for price in [dec!(0.004), dec!(10.005)] {
            let mut req = request();
            req.price = Some(price);
            assert_eq!(
                bad_request_message(req.validate()),
                "Product price cannot have more than 2 decimal places"
            );
        }
    }

    #[test]
    fn trailing_zeros_do_not_count_as_decimal_places() {
        let mut req = request();
        req.price = Some(dec!(19.9000));
        let price = req.validate().unwrap().price;
        assert_eq!(price.to_string(), "19.90");
    }

    #[test]
    fn rejects_prices_wider_than_the_column() {
        let mut req = request();
        req.price = Some(MAX_PRICE);
        assert_eq!(req.clone().validate().unwrap().price.to_string(), "9999999999.99");
        req.price = Some(dec!(10000000000.00));
        assert!(bad_request_message(req.validate()).starts_with("Product price cannot exceed"));
    }

    #[test]
    fn rejects_negative_or_missing_stock() {
        let mut req = request();
        req.stock = Some(-1);
        assert_eq!(
            bad_request_message(req.clone().validate()),
            "Product stock cannot be negative"
        );
        req.stock = None;
        assert_eq!(
            bad_request_message(req.validate()),
            "Product stock cannot be negative"
        );
    }

    #[test]
    fn deactivation_message_mentions_order_history() {
        assert!(DeleteOutcome::Deactivated.message().contains("order history"));
        assert!(DeleteOutcome::Deleted.message().contains("deleted"));
    }
}

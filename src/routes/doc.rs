use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{JwtAuthenticationResponse, SignInRequest, SignUpRequest},
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::{AdminOrder, OrderWithItems},
        products::{DeleteOutcome, DeleteProductResponse, ProductRequest},
    },
    entity::{orders::OrderStatus, users::Role},
    models::{CartItem, Order, OrderItem, OrderedProduct, Product, UserSummary},
    response::Meta,
    routes::{admin, auth, cart, health, orders, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::signup,
        auth::signin,
        auth::me,
        products::list_products,
        products::search_products,
        products::get_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        admin::list_products,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::list_all_orders,
        admin::update_order_status
    ),
    components(
        schemas(
            UserSummary,
            Role,
            Product,
            CartItem,
            Order,
            OrderStatus,
            OrderItem,
            OrderedProduct,
            OrderWithItems,
            AdminOrder,
            SignUpRequest,
            SignInRequest,
            JwtAuthenticationResponse,
            AddToCartRequest,
            UpdateCartItemRequest,
            ProductRequest,
            DeleteOutcome,
            DeleteProductResponse,
            Meta
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Signup, signin and current user"),
        (name = "Products", description = "Public catalog"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Admin", description = "Catalog and order administration"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

mod common;

use axum::extract::State;
use shopping_cart_api::routes::health::health_check;

#[tokio::test]
async fn health_check_reports_unreachable_database() {
    let response = health_check(State(common::offline_state())).await;
    assert_eq!(response.0.message, "Health check");

    let data = response.0.data.expect("health data");
    assert_eq!(data.status, "ok");
    assert_eq!(data.database, "down");
}

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use shopping_cart_api::{
    app::build_app,
    dto::auth::{SignInRequest, SignUpRequest},
    entity::users::Role,
    error::AppError,
    middleware::auth::authenticate,
    services::auth_service,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

fn signup(tag: &str) -> SignUpRequest {
    SignUpRequest {
        username: format!("shopper_{tag}"),
        email: format!("shopper_{tag}@example.com"),
        password: "s3cret-pass".into(),
    }
}

fn bad_request(err: AppError) -> String {
    match err {
        AppError::BadRequest(msg) => msg,
        other => panic!("expected bad request, got {other:?}"),
    }
}

async fn sign_in(state: &AppState, username: &str, password: &str) -> Result<Value, AppError> {
    let response = auth_service::sign_in(
        state,
        SignInRequest {
            username: username.into(),
            password: password.into(),
        },
    )
    .await?;
    Ok(serde_json::to_value(response).expect("serialize"))
}

#[tokio::test]
async fn duplicate_username_and_email_are_rejected() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let tag = Uuid::new_v4().simple().to_string();
    let first = auth_service::sign_up(&state, signup(&tag)).await?;
    let summary = first.data.expect("user");
    assert_eq!(summary.role, Role::User);

    let mut same_name = signup(&Uuid::new_v4().simple().to_string());
    same_name.username = format!("shopper_{tag}");
    let err = auth_service::sign_up(&state, same_name).await.unwrap_err();
    assert_eq!(bad_request(err), "Username is already taken!");

    let mut same_email = signup(&Uuid::new_v4().simple().to_string());
    same_email.email = format!("shopper_{tag}@example.com");
    let err = auth_service::sign_up(&state, same_email).await.unwrap_err();
    assert_eq!(bad_request(err), "Email Address already in use!");
    Ok(())
}

#[tokio::test]
async fn sign_in_returns_a_usable_bearer_token() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let tag = Uuid::new_v4().simple().to_string();
    let registered = auth_service::sign_up(&state, signup(&tag))
        .await?
        .data
        .expect("user");

    let body = sign_in(&state, &format!("shopper_{tag}"), "s3cret-pass").await?;
    assert_eq!(body["data"]["tokenType"], "Bearer");
    let token = body["data"]["accessToken"].as_str().expect("accessToken");

    let principal = authenticate(&format!("Bearer {token}"), &state.auth)?;
    assert_eq!(principal.user_id, registered.id);
    assert_eq!(principal.role, Role::User);
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let tag = Uuid::new_v4().simple().to_string();
    auth_service::sign_up(&state, signup(&tag)).await?;

    let wrong = sign_in(&state, &format!("shopper_{tag}"), "not-it").await.unwrap_err();
    let unknown = sign_in(&state, &format!("nobody_{tag}"), "s3cret-pass")
        .await
        .unwrap_err();
    assert!(matches!(&wrong, AppError::Unauthorized(_)));
    assert_eq!(wrong.to_string(), unknown.to_string());
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn me_returns_the_signed_in_user() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let tag = Uuid::new_v4().simple().to_string();
    auth_service::sign_up(&state, signup(&tag)).await?;
    let body = sign_in(&state, &format!("shopper_{tag}"), "s3cret-pass").await?;
    let token = body["data"]["accessToken"].as_str().expect("accessToken");

    let app = build_app(state.clone(), "http://localhost:3000")?;
    let response = app
        .oneshot(
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(json["data"]["username"], format!("shopper_{tag}"));
    assert_eq!(json["data"]["email"], format!("shopper_{tag}@example.com"));
    assert_eq!(json["data"]["role"], "USER");
    assert!(json["data"].get("passwordHash").is_none());
    Ok(())
}

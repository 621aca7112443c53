use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    dto::auth::{Claims, JwtAuthenticationResponse, SignInRequest, SignUpRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Role},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::UserSummary,
    response::{ApiResponse, Meta},
    state::{AppState, AuthSettings},
};

const USERNAME_TAKEN: &str = "Username is already taken!";
const EMAIL_TAKEN: &str = "Email Address already in use!";
const BAD_CREDENTIALS: &str = "Invalid username or password";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token(user_id: Uuid, role: Role, settings: &AuthSettings) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(settings.jwt_expiration_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn required(value: String, field: &str) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

pub async fn sign_up(
    state: &AppState,
    payload: SignUpRequest,
) -> AppResult<ApiResponse<UserSummary>> {
    let username = required(payload.username, "username")?;
    let email = required(payload.email, "email")?;
    if payload.password.is_empty() {
        return Err(AppError::BadRequest("password is required".into()));
    }

    let username_taken = Users::find()
        .filter(UserCol::Username.eq(username.as_str()))
        .one(&state.orm)
        .await?
        .is_some();
    if username_taken {
        return Err(AppError::BadRequest(USERNAME_TAKEN.into()));
    }

    let email_taken = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .is_some();
    if email_taken {
        return Err(AppError::BadRequest(EMAIL_TAKEN.into()));
    }

    let password_hash = hash_password(&payload.password)?;

    let inserted = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.clone()),
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(Role::User),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await;

    // A concurrent signup can still win the race past the checks above.
    let user = match inserted {
        Ok(user) => user,
        Err(err) => {
            return Err(match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(detail)) if detail.contains("username") => {
                    AppError::BadRequest(USERNAME_TAKEN.into())
                }
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AppError::BadRequest(EMAIL_TAKEN.into())
                }
                _ => AppError::OrmError(err),
            });
        }
    };

    tracing::info!(user_id = %user.id, username = %username, "user registered");

    Ok(ApiResponse::success(
        "User registered successfully",
        UserSummary::from(user),
        Some(Meta::empty()),
    ))
}

pub async fn sign_in(
    state: &AppState,
    payload: SignInRequest,
) -> AppResult<ApiResponse<JwtAuthenticationResponse>> {
    let SignInRequest { username, password } = payload;
    let user = Users::find()
        .filter(UserCol::Username.eq(username.trim()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => {
            tracing::warn!(username = %username, "sign in for unknown user");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
        }
    };

    if !verify_password(&password, &user.password_hash)? {
        tracing::warn!(user_id = %user.id, "sign in with wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let token = issue_token(user.id, user.role, &state.auth)?;

    tracing::info!(user_id = %user.id, "user signed in");

    Ok(ApiResponse::success(
        "Logged in",
        JwtAuthenticationResponse::bearer(token),
        Some(Meta::empty()),
    ))
}

pub async fn current_user(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<UserSummary>> {
    let found = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("User no longer exists".into())),
    };

    Ok(ApiResponse::success(
        "OK",
        UserSummary::from(found),
        Some(Meta::empty()),
    ))
}

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

/// Token settings the auth extractor and the signin flow share.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
}

impl From<&AppConfig> for AuthSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_expiration_hours: config.jwt_expiration_hours,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub auth: Arc<AuthSettings>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, auth: AuthSettings) -> Self {
        Self {
            orm,
            auth: Arc::new(auth),
        }
    }
}

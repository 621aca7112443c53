use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::users::Role;

#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(default)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(default)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtAuthenticationResponse {
    pub access_token: String,
    pub token_type: String,
}

impl JwtAuthenticationResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

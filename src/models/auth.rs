//! Authentication-related models

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{session::AuthSessionData, user::UserResponse};

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login response. `session_id` is the opaque token, also set as a cookie.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub user: UserResponse,
    pub auth: AuthSessionData,
}

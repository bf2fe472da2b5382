//! Authentication and authorization module

pub mod catalog;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod token;

pub use guard::{authorize, permission_guard, RequiredPermissions};
pub use middleware::{extract_session_token, session_auth_middleware, AuthContext};
pub use password::PasswordHasher;
pub use token::SessionToken;

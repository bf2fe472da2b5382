//! Business logic services layer

pub mod auth_service;
pub mod bootstrap;
pub mod permission_service;
pub mod rbac_admin_service;
pub mod session_service;

pub use auth_service::AuthService;
pub use permission_service::PermissionService;
pub use rbac_admin_service::RbacAdminService;
pub use session_service::SessionService;

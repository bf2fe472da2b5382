//! 数据模型模块
//! 用户、角色权限、会话快照

pub mod auth;
pub mod role;
pub mod session;
pub mod user;

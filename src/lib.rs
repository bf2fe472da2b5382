//! RBAC 服务库
//! 角色 / 权限 / 作用域绑定、授权快照与会话失效

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;

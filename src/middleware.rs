//! HTTP 中间件
//! 应用状态与请求追踪

use crate::{
    config::AppConfig,
    error::AppError,
    repository::{RbacStore, SessionStore},
    services::{AuthService, PermissionService, RbacAdminService, SessionService},
};
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

tokio::task_local! {
    /// 当前请求的 request_id，错误响应体与 x-request-id 头保持一致
    pub static REQUEST_ID: String;
}

/// 应用状态
///
/// 存储以 trait object 注入，Postgres 与内存实现共用同一套服务。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn RbacStore>,
    pub auth_service: Arc<AuthService>,
    pub permission_service: Arc<PermissionService>,
    pub session_service: Arc<SessionService>,
    pub rbac_admin_service: Arc<RbacAdminService>,
}

impl AppState {
    /// 组装全部服务
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RbacStore>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        let session_service = Arc::new(SessionService::new(session_store, &config.session));
        let permission_service = Arc::new(PermissionService::new(store.clone()));
        let rbac_admin_service =
            Arc::new(RbacAdminService::new(store.clone(), session_service.clone()));
        let auth_service = Arc::new(AuthService::new(
            store.clone(),
            permission_service.clone(),
            session_service.clone(),
        )?);

        Ok(Self {
            config,
            store,
            auth_service,
            permission_service,
            session_service,
            rbac_admin_service,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = REQUEST_ID.scope(request_id.clone(), next.run(req)).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // 指标标签只用静态字符串
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "PATCH" => "PATCH",
            "DELETE" => "DELETE",
            _ => "OTHER",
        };
        let status_code = match status {
            200 => "200",
            201 => "201",
            204 => "204",
            400 => "400",
            401 => "401",
            403 => "403",
            404 => "404",
            409 => "409",
            500 => "500",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_code)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

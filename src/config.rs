//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 会话 Cookie 名称
    pub cookie_name: String,
    /// 会话有效期（秒），每次使用后顺延
    pub ttl_secs: u64,
    /// 过期会话清理间隔（秒）
    pub prune_interval_secs: u64,
    /// Cookie 是否只允许 HTTPS
    pub secure_cookie: bool,
}

/// 启动时的初始管理员（可选）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<Secret<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("session.cookie_name", "sid")?
            .set_default("session.ttl_secs", 8 * 60 * 60)?
            .set_default("session.prune_interval_secs", 600)?
            .set_default("session.secure_cookie", false)?;

        // 从环境变量加载配置（前缀为 RBAC_）
        settings = settings.add_source(
            Environment::with_prefix("RBAC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证会话配置
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::Message("session cookie_name must not be empty".to_string()));
        }

        if self.session.ttl_secs < 60 || self.session.ttl_secs > 30 * 86400 {
            return Err(ConfigError::Message(
                "session ttl_secs must be between 60 and 2592000 (1 minute to 30 days)"
                    .to_string(),
            ));
        }

        if self.session.prune_interval_secs == 0 {
            return Err(ConfigError::Message(
                "session prune_interval_secs must be > 0".to_string(),
            ));
        }

        // 初始管理员需要邮箱和密码同时配置
        match (&self.bootstrap.admin_email, &self.bootstrap.admin_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Message(
                    "bootstrap admin_email and admin_password must be set together".to_string(),
                ))
            }
            (Some(_), Some(password)) if password.expose_secret().len() < 8 => {
                return Err(ConfigError::Message(
                    "bootstrap admin_password must be at least 8 characters long".to_string(),
                ))
            }
            _ => {}
        }

        Ok(())
    }
}

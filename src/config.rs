//! 配置系统
//! 所有配置来自 NOTES_ 前缀的环境变量；密钥类字段用 Secret 包装
//!
//! 配置在进程启动时构建一次，之后通过依赖注入传递给各组件，不存在全局单例。

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 连接串可能含密码
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 签名密钥（必须显式配置，没有默认值）
    pub jwt_secret: Secret<String>,
    /// 访问令牌有效期（秒），默认 12 小时
    pub token_ttl_secs: u64,
    /// 密码 pepper，作为 Argon2 secret 参与哈希（必须显式配置）
    pub password_pepper: Secret<String>,
    /// Argon2 内存开销（KiB）
    pub hash_memory_kib: u32,
    /// Argon2 迭代次数
    pub hash_iterations: u32,
    /// Argon2 并行度
    pub hash_parallelism: u32,
    /// 密码最小长度
    pub password_min_length: usize,
    /// 密码必须包含大写字母
    pub password_require_uppercase: bool,
    /// 密码必须包含小写字母
    pub password_require_lowercase: bool,
    /// 密码必须包含数字
    pub password_require_digit: bool,
    /// 密码必须包含特殊字符
    pub password_require_special: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 是否启用服务端会话；关闭时仅使用 JWT
    pub enabled: bool,
    /// Redis 连接 URL（可能包含密码）
    pub redis_url: Secret<String>,
    /// 会话有效期（秒）
    pub ttl_secs: u64,
    /// 会话 Cookie 名称
    pub cookie_name: String,
    /// Cookie 是否附加 Secure 属性
    pub cookie_secure: bool,
    /// 单次存储操作超时（毫秒）
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        // jwt_secret 和 password_pepper 故意不提供默认值
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
            .set_default("security.token_ttl_secs", 43200)?
            .set_default("security.hash_memory_kib", 19456)?
            .set_default("security.hash_iterations", 2)?
            .set_default("security.hash_parallelism", 1)?
            .set_default("security.password_min_length", 6)?
            .set_default("security.password_require_uppercase", true)?
            .set_default("security.password_require_lowercase", true)?
            .set_default("security.password_require_digit", true)?
            .set_default("security.password_require_special", true)?
            .set_default("session.enabled", true)?
            .set_default("session.redis_url", "redis://127.0.0.1:6379/0")?
            .set_default("session.ttl_secs", 86400)?
            .set_default("session.cookie_name", "session_id")?
            .set_default("session.cookie_secure", true)?
            .set_default("session.op_timeout_ms", 2000)?;

        // 从环境变量加载配置（前缀为 NOTES_）
        settings = settings.add_source(
            Environment::with_prefix("NOTES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// 逐段校验，任一段失败即拒绝启动
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.database.validate()?;
        self.security.validate()?;
        if self.session.enabled {
            self.session.validate()?;
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Message(msg.into())
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        if !LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level '{}' is not one of {:?}",
                self.level, LEVELS
            )));
        }
        if !FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.format '{}' is not one of {:?}",
                self.format, FORMATS
            )));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.expose_secret().trim().is_empty() {
            return Err(invalid("database.url is required"));
        }
        if self.min_connections > self.max_connections {
            return Err(invalid(
                "database.min_connections exceeds database.max_connections",
            ));
        }
        Ok(())
    }
}

impl SecurityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.expose_secret().len() < 32 {
            return Err(invalid("security.jwt_secret needs at least 32 bytes"));
        }
        if self.password_pepper.expose_secret().is_empty() {
            return Err(invalid("security.password_pepper is required"));
        }
        if !(60..=86400).contains(&self.token_ttl_secs) {
            return Err(invalid("security.token_ttl_secs must be within 60..=86400"));
        }
        // Argon2: m >= 8 * p
        if self.hash_parallelism == 0
            || self.hash_iterations == 0
            || self.hash_memory_kib < 8 * self.hash_parallelism
        {
            return Err(invalid(
                "hash cost out of range (iterations >= 1, parallelism >= 1, memory_kib >= 8 * parallelism)",
            ));
        }
        if !(6..=128).contains(&self.password_min_length) {
            return Err(invalid("security.password_min_length must be within 6..=128"));
        }
        Ok(())
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.expose_secret().trim().is_empty() {
            return Err(invalid("session.redis_url is required when sessions are enabled"));
        }
        if self.ttl_secs == 0 || self.op_timeout_ms == 0 {
            return Err(invalid("session.ttl_secs and session.op_timeout_ms must be > 0"));
        }
        let valid_name = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(invalid(format!(
                "session.cookie_name '{}' is not a valid cookie name",
                self.cookie_name
            )));
        }
        Ok(())
    }
}

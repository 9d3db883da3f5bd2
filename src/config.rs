/*
 * Responsibility
 * - 環境変数や設定の読み込み (PORT, CORS 許可、security header、SSL 強制など)
 * - 設定値のバリデーション (不正なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::middleware::cors::{CorsOptions, DEFAULT_ALLOW_METHODS, OriginPolicy};
use crate::middleware::method_override::{DEFAULT_METHOD_FIELD, MethodOverride};
use crate::middleware::ssl::{EnforceSslOptions, InsecureAction};
use crate::services::security::SecurityOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub cors: CorsOptions,
    pub method_override: MethodOverride,
    pub security: SecurityOptions,
    pub enforce_ssl: EnforceSslOptions,

    /// Directory-convention controller loading; explicit registration when unset.
    pub controllers_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let allow_origin =
            parse_origin_policy(&std::env::var("CORS_ALLOW_ORIGIN").unwrap_or_default())?;
        let allow_methods = std::env::var("CORS_ALLOW_METHODS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOW_METHODS.to_string());
        let cors = CorsOptions {
            allow_origin,
            allow_methods,
            ..CorsOptions::default()
        };

        let method_override = MethodOverride::new(
            std::env::var("METHOD_OVERRIDE_FIELD")
                .unwrap_or_else(|_| DEFAULT_METHOD_FIELD.to_string()),
        );

        let security = match std::env::var("SECURITY_OPTIONS") {
            Ok(json) if !json.trim().is_empty() => parse_security_options(&json)?,
            _ => SecurityOptions::default(),
        };

        // Off outside production unless asked for.
        let enforce_ssl = EnforceSslOptions {
            disabled: !env_flag("ENFORCE_SSL").unwrap_or(app_env.is_production()),
            trust_proxy: env_flag("TRUST_PROXY").unwrap_or(false),
            action: if env_flag("SSL_REDIRECT").unwrap_or(false) {
                InsecureAction::Redirect
            } else {
                InsecureAction::Reject
            },
        };

        let controllers_dir = std::env::var("CONTROLLERS_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            addr,
            app_env,
            cors,
            method_override,
            security,
            enforce_ssl,
            controllers_dir,
        })
    }
}

/// `*` (or empty) is the wildcard; anything else is a regular expression.
pub fn parse_origin_policy(value: &str) -> Result<OriginPolicy, ConfigError> {
    let value = value.trim();
    if value.is_empty() || value == "*" {
        return Ok(OriginPolicy::Wildcard);
    }
    OriginPolicy::pattern(value).map_err(|_| ConfigError::Invalid("CORS_ALLOW_ORIGIN"))
}

pub fn parse_security_options(json: &str) -> Result<SecurityOptions, ConfigError> {
    serde_json::from_str(json).map_err(|_| ConfigError::Invalid("SECURITY_OPTIONS"))
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

use std::{env, path::PathBuf};

use thiserror::Error;

/// AppConfig
///
/// Holds the application's entire configuration state. It is loaded once at startup,
/// never mutated afterwards, and pulled into handlers and middleware through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and cookie defaults.
    pub env: Env,
    // Interface the HTTP listener binds to.
    pub host: String,
    pub port: u16,
    // Postgres connection string. `None` selects the in-memory repository and session store.
    pub db_url: Option<String>,
    // When set, server failures write their detail and trace into the response body.
    pub debug: bool,
    // Sliding inactivity expiry for sessions.
    pub session_lifetime_minutes: i64,
    // Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    // Directory served under `/static`.
    pub static_dir: PathBuf,
}

/// Env
///
/// Defines the runtime context, used to switch between developer conveniences
/// (pretty logs, in-memory storage) and production infrastructure.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe AppConfig instance primarily used for test setup, so state
    /// can be scaffolded without touching environment variables.
    fn default() -> Self {
        Self {
            env: Env::Local,
            host: "127.0.0.1".to_string(),
            port: 4000,
            db_url: None,
            debug: false,
            session_lifetime_minutes: 15,
            cookie_secure: false,
            static_dir: PathBuf::from("./ui/static"),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables. Production refuses to start
    /// without a database, because sessions would otherwise vanish on every restart.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            env,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 4000)?,
            db_url,
            debug: parse_flag("DEBUG", false)?,
            session_lifetime_minutes: parse_var("SESSION_LIFETIME_MINUTES", 15)?,
            cookie_secure: parse_flag("COOKIE_SECURE", env == Env::Production)?,
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./ui/static")),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value }),
        },
        Err(_) => Ok(default),
    }
}

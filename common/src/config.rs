use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_path: String,
    pub token_ttl_seconds: i64,
    pub sync_interval_seconds: u64,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name =
                env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-core".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/attendance.log".into());
            let database_path =
                env::var("DATABASE_PATH").unwrap_or_else(|_| "data/attendance.db".into());
            let token_ttl_seconds = env::var("TOKEN_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            let sync_interval_seconds = env::var("SYNC_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            Config {
                project_name,
                log_level,
                log_file,
                database_path,
                token_ttl_seconds,
                sync_interval_seconds,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}

/// Database path as configured, falling back to the env var directly so the
/// `db` crate can connect without a full `Config::init`.
pub fn database_path() -> String {
    if let Some(cfg) = CONFIG.get() {
        return cfg.database_path.clone();
    }
    env::var("DATABASE_PATH").unwrap_or_else(|_| "data/attendance.db".into())
}

/// Default validity window for rotating session tokens, in seconds.
pub fn token_ttl_seconds() -> i64 {
    if let Some(cfg) = CONFIG.get() {
        return cfg.token_ttl_seconds;
    }
    env::var("TOKEN_TTL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60)
}

/// Interval between periodic outbox drains, in seconds.
pub fn sync_interval_seconds() -> u64 {
    if let Some(cfg) = CONFIG.get() {
        return cfg.sync_interval_seconds;
    }
    env::var("SYNC_INTERVAL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}

use std::{env, path::PathBuf};

use actix_web::cookie::Key;

use crate::{errors::AppError, images::ImageStore};

const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_key: Key,
    pub session_cookie_secure: bool,
    pub admin_username: String,
    pub admin_password: String,
    pub server_host: String,
    pub server_port: u16,
    pub static_dir: PathBuf,
    pub image_store: ImageStore,
    pub max_payload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://linkhub.db".to_string());
        if !database_url.starts_with("sqlite:") {
            return Err(AppError::ConfigError(
                "DATABASE_URL must point to a sqlite database".to_string(),
            ));
        }

        let session_key = session_key_from(&var("SESSION_KEY").ok_or_else(|| {
            AppError::ConfigError("SESSION_KEY environment variable not set".to_string())
        })?)?;

        let session_cookie_secure =
            parse_bool("SESSION_COOKIE_SECURE", var("SESSION_COOKIE_SECURE"), true)?;

        let admin_username = var("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string());
        let admin_password = match var("ADMIN_PASSWORD") {
            Some(password) if !password.is_empty() => password,
            _ => {
                log::warn!("ADMIN_PASSWORD not set, falling back to the default admin password");
                "admin".to_string()
            }
        };

        let server_host = var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = match var("SERVER_PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| AppError::ConfigError(format!("invalid SERVER_PORT: {}", v)))?,
            None => 8080,
        };

        let static_dir = PathBuf::from(var("STATIC_DIR").unwrap_or_else(|| "static".to_string()));
        let upload_dir = var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| static_dir.join("uploads"));

        let image_store = match var("IMAGE_STORE").as_deref() {
            Some("url") | None => ImageStore::Remote,
            Some("local") => ImageStore::Local { dir: upload_dir },
            Some(other) => {
                return Err(AppError::ConfigError(format!(
                    "IMAGE_STORE must be 'url' or 'local', got '{}'",
                    other
                )))
            }
        };

        let max_payload_bytes = match var("MAX_PAYLOAD_BYTES") {
            Some(v) => v.parse::<usize>().map_err(|_| {
                AppError::ConfigError(format!("invalid MAX_PAYLOAD_BYTES: {}", v))
            })?,
            None => DEFAULT_MAX_PAYLOAD_BYTES,
        };

        Ok(Self {
            database_url,
            session_key,
            session_cookie_secure,
            admin_username,
            admin_password,
            server_host,
            server_port,
            static_dir,
            image_store,
            max_payload_bytes,
        })
    }
}

/// Signing key for the session cookie. Needs at least 64 bytes of material.
pub fn session_key_from(raw: &str) -> Result<Key, AppError> {
    Key::try_from(raw.as_bytes()).map_err(|_| {
        AppError::ConfigError("SESSION_KEY must be at least 64 bytes long".to_string())
    })
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> Result<bool, AppError> {
    match value {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::ConfigError(format!("invalid {}: {}", name, v))),
        },
    }
}

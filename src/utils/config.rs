use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;

use crate::utils::validators::validate_url;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub allow_registration: bool,
    pub frontend_url: String,
    pub storage_dir: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the process environment
    /// in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} must be set", key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let frontend_url = or_default("FRONTEND_URL", "http://localhost:5173");
        validate_url(&frontend_url).context("FRONTEND_URL is not a valid http(s) URL")?;

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.trim().is_empty() {
            return Err(anyhow!("JWT_SECRET must not be empty"));
        }

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            host: or_default("HOST", "127.0.0.1"),
            port: or_default("PORT", "8080")
                .parse()
                .context("PORT must be a number")?,
            jwt_secret,
            jwt_expiration_hours: or_default("JWT_EXPIRATION_HOURS", "24")
                .parse()
                .context("JWT_EXPIRATION_HOURS must be a number")?,
            allow_registration: or_default("ALLOW_REGISTRATION", "true")
                .parse()
                .context("ALLOW_REGISTRATION must be true or false")?,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            storage_dir: or_default("STORAGE_DIR", "storage"),
            max_upload_bytes: match lookup("MAX_UPLOAD_BYTES") {
                Some(value) => value.parse().context("MAX_UPLOAD_BYTES must be a number")?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/habitcal_test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_hours: 1,
            allow_registration: true,
            frontend_url: "http://localhost:5173".to_string(),
            storage_dir: "storage".to_string(),
            max_upload_bytes: 1024,
        }
    }
}

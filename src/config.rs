use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use crate::{
    constants::{PAGE_SIZE, RECIPES_LIMIT, SESSION_HOURS},
    error::TypeError,
};

const DEFAULT_JWT_SECRET: &str = "secret";

/// Which form of a short link is stored and matched on redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortLinkKey {
    /// `/s/{token}/`, independent of the host the request arrived on.
    Path,
    /// `{scheme}://{host}/s/{token}/`, built from the request.
    Absolute,
}

impl FromStr for ShortLinkKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "absolute" => Ok(Self::Absolute),
            _ => Err(TypeError::new("expected 'path' or 'absolute'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub session_hours: i64,
    pub media_root: PathBuf,
    pub short_link_key: ShortLinkKey,
    pub public_scheme: String,
    pub public_host: String,
    pub page_size: i64,
    pub recipes_limit: i64,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| "DATABASE_URL must be set".to_owned())?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("JWT_SECRET not set, sessions are signed with an insecure default");
            DEFAULT_JWT_SECRET.to_owned()
        });

        Ok(Self {
            bind_address: try_load(&var, "BIND_ADDRESS", "0.0.0.0:8000")?,
            database_url,
            database_max_connections: try_load(&var, "DATABASE_MAX_CONNECTIONS", "5")?,
            redis_url: var("REDIS_URL").filter(|url| !url.trim().is_empty()),
            jwt_secret,
            session_hours: try_load(&var, "SESSION_HOURS", &SESSION_HOURS.to_string())?,
            media_root: try_load(&var, "MEDIA_ROOT", "media")?,
            short_link_key: try_load(&var, "SHORT_LINK_KEY", "path")?,
            public_scheme: try_load(&var, "PUBLIC_SCHEME", "http")?,
            public_host: try_load(&var, "PUBLIC_HOST", "localhost:8000")?,
            page_size: try_load(&var, "PAGE_SIZE", &PAGE_SIZE.to_string())?,
            recipes_limit: try_load(&var, "RECIPES_LIMIT", &RECIPES_LIMIT.to_string())?,
        })
    }
}

fn try_load<F, T>(var: &F, key: &str, default: &str) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            log::warn!("Invalid {key} value: {e}");
            format!("Invalid {key} value: {e}")
        })
}

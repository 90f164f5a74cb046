use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "pongchat-dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub frontend_origin: String,
    pub proposal_timeout: Duration,
    pub ready_timeout: Duration,
    pub points_to_win: u32,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set, tokens are signed with the development secret");
            DEV_JWT_SECRET.to_owned()
        });

        Ok(Self {
            port: try_load("PORT", "8080")?,
            database_url: try_load("DATABASE_URL", "sqlite://pongchat.db?mode=rwc")?,
            jwt_secret,
            token_ttl: Duration::from_secs(60 * 60 * try_load::<u64>("TOKEN_TTL_HOURS", "24")?),
            frontend_origin: try_load("FRONTEND_ORIGIN", "http://localhost:5173")?,
            proposal_timeout: Duration::from_secs(try_load("PROPOSAL_TIMEOUT_SECS", "30")?),
            ready_timeout: Duration::from_secs(try_load("READY_TIMEOUT_SECS", "120")?),
            points_to_win: try_load("POINTS_TO_WIN", "5")?,
            oauth: OAuthConfig::load()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite::memory:".to_owned(),
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            token_ttl: Duration::from_secs(60 * 60 * 24),
            frontend_origin: "http://localhost:5173".to_owned(),
            proposal_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(120),
            points_to_win: 5,
            oauth: None,
        }
    }
}

impl OAuthConfig {
    fn load() -> anyhow::Result<Option<Self>> {
        let Some(client_id) = var("OAUTH_CLIENT_ID") else {
            info!("OAUTH_CLIENT_ID not set, login is disabled");
            return Ok(None);
        };

        Ok(Some(Self {
            client_id,
            client_secret: required("OAUTH_CLIENT_SECRET")?,
            auth_url: required("OAUTH_AUTH_URL")?,
            token_url: required("OAUTH_TOKEN_URL")?,
            userinfo_url: required("OAUTH_USERINFO_URL")?,
            redirect_url: required("OAUTH_REDIRECT_URL")?,
        }))
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> anyhow::Result<String> {
    var(key).with_context(|| format!("{key} must be set when OAuth is configured"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_owned()
        })
        .parse()
        .map_err(|e| anyhow!("invalid {key} value: {e}"))
}

pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod events;
pub mod game;
pub mod matchmaking;
pub mod password;
pub mod rooms;
pub mod session;
pub mod users;

use std::{sync::Arc, time::Duration};

use axum::{extract::FromRef, http::{header, HeaderValue, Method}, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult, Reject};

use config::Config;
use events::Hub;
use game::LiveGames;
use matchmaking::Matchmaking;
use rooms::RoomChannels;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub keys: auth::TokenKeys,
    pub hub: Hub,
    pub matchmaking: Matchmaking,
    pub live: LiveGames,
    pub rooms: RoomChannels,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> AppResult<Self> {
        let clients = auth::Clients::from_config(config.oauth.as_ref())?;
        let keys = auth::TokenKeys::new(&config.jwt_secret, config.token_ttl);
        let hub = Hub::default();
        let live = LiveGames::new(config.points_to_win).with_ready_timeout(config.ready_timeout);
        let matchmaking = Matchmaking::new(db_pool.clone(), hub.clone(), live.clone(), config.proposal_timeout);

        Ok(AppState {
            db_pool,
            clients,
            keys,
            hub,
            matchmaking,
            live,
            rooms: RoomChannels::default(),
            config: Arc::new(config),
        })
    }
}

/// Every route, with sessions, CORS for the frontend and request tracing.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(5)));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&state.config.frontend_origin)?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Ok(Router::new()
        .merge(auth::router())
        .merge(events::router())
        .nest("/user", users::router())
        .nest("/chat", chat::router())
        .nest("/rooms", rooms::router())
        .nest("/matchmaking", matchmaking::router())
        .nest("/game", game::router())
        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_builds_from_default_config() {
        let db_pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let state = AppState::new(db_pool, Config::default()).unwrap();
        assert!(state.clients.get_client().is_err());
        assert!(app(state).is_ok());
    }

    #[tokio::test]
    async fn bad_frontend_origin_is_refused() {
        let db_pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let config = Config { frontend_origin: "http://bad\norigin".to_owned(), ..Config::default() };
        let state = AppState::new(db_pool, config).unwrap();
        assert!(app(state).is_err());
    }
}

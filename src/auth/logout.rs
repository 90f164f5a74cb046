use axum::{debug_handler, extract::Query, http::header, response::{IntoResponse, Redirect, Response}};
use serde::Deserialize;
use tower_sessions::Session;

use crate::AppResult;

use super::token::expired_cookie;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session
) -> AppResult<Response> {
    session.clear().await;
    Ok((
        [(header::SET_COOKIE, expired_cookie().to_string())],
        Redirect::to(return_url.unwrap_or("/".to_string()).as_str()),
    ).into_response())
}

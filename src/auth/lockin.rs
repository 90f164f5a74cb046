use std::sync::Arc;

use axum::{debug_handler, extract::{Query, State}, http::header, response::{IntoResponse, Redirect, Response}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{config::Config, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, users, AppResult, AppState, GetField};

use super::{token::TokenKeys, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(keys): State<TokenKeys>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Response> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.get::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.get::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let (client, userinfo_url) = clients.get_client()?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let email = body.get_str_field("email")?;
    let login = body.get_str_field("login")?;

    let user = match users::find_by_email(&db_pool, &email).await? {
        Some(user) => user,
        None => users::create_user(&db_pool, &email, &login).await?,
    };
    info!("welcome {}#{}", user.name, user.id);

    let token = keys.issue(user.id, &email)?;
    let return_url = match session.remove::<String>(RETURN_URL).await?.filter(|url| is_local_path(url)) {
        Some(return_url) => return_url,
        None if user.status == users::STATUS_FRESH => "/complete".to_owned(),
        None => "/".to_owned(),
    };

    Ok((
        [(header::SET_COOKIE, keys.cookie(token).to_string())],
        Redirect::to(&format!("{}{}", config.frontend_origin, return_url)),
    ).into_response())
}

/// Paths on the frontend only; `//host` and `@host` would leave it.
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_frontend_paths_are_followed() {
        assert!(is_local_path("/"));
        assert!(is_local_path("/rooms/42"));

        assert!(!is_local_path("@evil.example"));
        assert!(!is_local_path(".evil.example/x"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path(""));
    }
}

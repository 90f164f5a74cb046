use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult};

use super::Clients;

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let (client, _) = clients.get_client()?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("public".to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url {
        session.insert(RETURN_URL, return_url).await?;
    }

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}

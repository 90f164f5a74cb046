mod clients;
mod login;
mod lockin;
mod logout;
mod token;

use axum::{routing::get, Router};

use crate::AppState;

pub use clients::Clients;
pub use token::{CurrentUser, TokenKeys};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login))
        .route("/lockin", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

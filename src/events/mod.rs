mod hub;
mod protocol;
mod socket;

use axum::{routing::get, Router};

use crate::AppState;

pub use hub::{Connection, Hub};
pub use protocol::{ClientEvent, PlayerRef, ServerEvent, Side};
pub use socket::Gateway;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(socket::events))
}

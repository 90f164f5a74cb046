mod manage;
mod msg;
mod new;
pub mod room;
mod ws;

use std::{collections::HashMap, sync::Arc};

use axum::{routing::{get, post, put}, Router};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::AppState;

pub use msg::{render_markdown, RenderedMessage};

pub const ROOM_CAPACITY: i64 = 10;
pub const MAX_OWNED_ROOMS: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(manage::list).post(new::new_room))
        .route("/{id}", get(manage::detail).delete(manage::delete))
        .route("/{id}/join", post(manage::join))
        .route("/{id}/leave", post(manage::leave))
        .route("/{id}/invite/{user}", post(manage::invite))
        .route("/{id}/kick/{user}", post(manage::kick))
        .route("/{id}/admins/{user}", post(manage::grant_admin).delete(manage::revoke_admin))
        .route("/{id}/password", put(manage::set_password))
        .route("/{id}/messages", get(manage::messages))
        .route("/{id}/ws", get(ws::room_ws))
}

/// One broadcast channel per room, created on first use.
#[derive(Clone, Default)]
pub struct RoomChannels {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<RenderedMessage>>>>,
}

impl RoomChannels {
    pub async fn sender(&self, room_id: Uuid) -> broadcast::Sender<RenderedMessage> {
        self.channels
            .lock()
            .await
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Drops the room's channel. Open sockets end on their next message,
    /// once membership is gone.
    pub async fn close(&self, room_id: Uuid) {
        self.channels.lock().await.remove(&room_id);
    }
}

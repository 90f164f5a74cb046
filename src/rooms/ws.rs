use axum::{
    debug_handler,
    extract::{ws::Message, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{auth::CurrentUser, users, AppResult, AppState, Reject};

use super::{msg, room, RoomChannels};

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(channels): State<RoomChannels>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    room::find_room(&db_pool, room_id).await?;
    if !room::is_member(&db_pool, room_id, user.id).await? {
        return Err(Reject::Forbidden("join the room first"))?;
    }

    let user_id = user.id;
    let tx = channels.sender(room_id).await;

    Ok(ws.on_upgrade(async move |stream| {
        let mut rx = tx.subscribe();
        let (mut sender, mut receiver) = stream.split();

        let filter_pool = db_pool.clone();
        let mut broadcast_task = tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("{user_id} skipped {skipped} messages in room {room_id}");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match delivery(&filter_pool, room_id, user_id, msg.sender_id).await {
                    Ok(Delivery::Send) => {}
                    Ok(Delivery::Skip) => continue,
                    Ok(Delivery::Stop) => {
                        debug!("{user_id} is no longer in room {room_id}");
                        break;
                    }
                    Err(e) => {
                        warn!("delivery check failed for {user_id}: {:#}", e.0);
                        continue;
                    }
                }

                let Ok(text) = serde_json::to_string(&msg) else {
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = &mut broadcast_task => break,
                msg = receiver.next() => {
                    let Some(Ok(msg)) = msg else {
                        break;
                    };
                    if let Message::Close(_) = msg {
                        break;
                    }
                    let Ok(query) = serde_json::from_slice(&msg.into_data()) else {
                        continue;
                    };

                    if let Err(e) = msg::send_msg(&db_pool, &tx, user_id, room_id, query).await {
                        debug!("{user_id} could not post to {room_id}: {:#}", e.0);
                    }
                }
            }
        }
        broadcast_task.abort();
    }))
}

#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Send,
    Skip,
    Stop,
}

/// Decided per message, so kicks and ignores apply to sockets already open.
async fn delivery(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid, sender_id: Uuid) -> AppResult<Delivery> {
    if !room::is_member(db_pool, room_id, user_id).await? {
        return Ok(Delivery::Stop);
    }
    if users::ignores(db_pool, user_id, sender_id).await? {
        return Ok(Delivery::Skip);
    }
    Ok(Delivery::Send)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[tokio::test]
    async fn kicked_members_stop_receiving() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let eve = testing::user(&db_pool, "eve").await;
        let room = room::create_room(&db_pool, ada, "club", false, None).await.unwrap();
        room::invite(&db_pool, room.id, ada, bob).await.unwrap();
        room::invite(&db_pool, room.id, ada, eve).await.unwrap();

        assert_eq!(delivery(&db_pool, room.id, bob, ada).await.unwrap(), Delivery::Send);

        users::ignore(&db_pool, bob, eve).await.unwrap();
        assert_eq!(delivery(&db_pool, room.id, bob, eve).await.unwrap(), Delivery::Skip);

        room::kick(&db_pool, room.id, ada, bob).await.unwrap();
        assert_eq!(delivery(&db_pool, room.id, bob, ada).await.unwrap(), Delivery::Stop);

        room::delete_room(&db_pool, room.id, ada).await.unwrap();
        assert_eq!(delivery(&db_pool, room.id, eve, ada).await.unwrap(), Delivery::Stop);
    }
}

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, FromRef, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{auth::CurrentUser, chat, game::LiveGames, matchmaking::Matchmaking, users, AppResult, AppState};

use super::{ClientEvent, Connection, Hub, ServerEvent};

/// Everything a socket event can touch.
#[derive(Clone)]
pub struct Gateway {
    pub db_pool: SqlitePool,
    pub hub: Hub,
    pub matchmaking: Matchmaking,
    pub live: LiveGames,
}

impl FromRef<AppState> for Gateway {
    fn from_ref(state: &AppState) -> Self {
        Gateway {
            db_pool: state.db_pool.clone(),
            hub: state.hub.clone(),
            matchmaking: state.matchmaking.clone(),
            live: state.live.clone(),
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn events(
    user: CurrentUser,
    State(gateway): State<Gateway>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(async move |stream| gateway.serve(user.id, stream).await)
}

impl Gateway {
    pub async fn serve(self, user_id: Uuid, stream: WebSocket) {
        let (connection, mut rx, came_online) = self.hub.connect(user_id).await;
        info!("{user_id} connected (socket {})", connection.id);
        if came_online {
            self.announce(user_id, true).await;
        }

        let (mut sender, mut receiver) = stream.split();
        let mut send_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode {event:?}: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = &mut send_task => break,
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.receive(connection, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },
            }
        }
        send_task.abort();

        if self.hub.disconnect(connection).await {
            info!("{user_id} went offline");
            self.went_offline(user_id).await;
        }
    }

    async fn receive(&self, connection: Connection, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("malformed event from {}: {e}", connection.user_id);
                self.hub.reply(connection, ServerEvent::error(format!("malformed event: {e}"))).await;
                return;
            }
        };

        if let Err(e) = self.dispatch(connection.user_id, event).await {
            let message = match e.reject() {
                Some(reject) => reject.to_string(),
                None => {
                    warn!("event from {} failed: {:#}", connection.user_id, e.0);
                    "internal error".to_owned()
                }
            };
            self.hub.reply(connection, ServerEvent::error(message)).await;
        }
    }

    pub async fn dispatch(&self, user_id: Uuid, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::JoinQueue => self.matchmaking.join(user_id).await,
            ClientEvent::LeaveQueue => self.matchmaking.leave(user_id).await,
            ClientEvent::RespondToMatch { match_id, accept } => {
                self.matchmaking.respond(user_id, match_id, accept).await
            }
            ClientEvent::PlayerReady { game_id } => self.live.ready(&self.hub, game_id, user_id).await,
            ClientEvent::PaddleMove { game_id, y } => self.live.paddle(&self.hub, game_id, user_id, y).await,
            ClientEvent::BallSync { game_id, x, y, vx, vy } => {
                self.live.ball(&self.hub, game_id, user_id, x, y, vx, vy).await
            }
            ClientEvent::ScoreUpdate { game_id, score_player_one, score_player_two } => {
                self.live
                    .score(&self.db_pool, &self.hub, game_id, user_id, score_player_one, score_player_two)
                    .await
            }
            ClientEvent::SendMessage { receiver_id, content } => {
                chat::send_direct(&self.db_pool, &self.hub, user_id, receiver_id, &content).await?;
                Ok(())
            }
        }
    }

    /// Leaves the queue, forfeits live games and tells friends.
    pub async fn went_offline(&self, user_id: Uuid) {
        if let Err(e) = self.matchmaking.leave(user_id).await {
            warn!("failed to drop {user_id} from the queue: {:#}", e.0);
        }
        self.live.abandon(&self.db_pool, &self.hub, user_id).await;
        self.announce(user_id, false).await;
    }

    async fn announce(&self, user_id: Uuid, online: bool) {
        let friends = match users::friends(&self.db_pool, user_id).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!("failed to load the friends of {user_id}: {:#}", e.0);
                return;
            }
        };

        for friend in friends {
            self.hub.emit(friend.id, ServerEvent::Presence { user_id, online }).await;
        }
    }
}

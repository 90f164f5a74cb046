//! JSON events exchanged over the `/events` socket.
//!
//! Every frame is `{"event": <name>, "data": <payload>}` with camelCase names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{ChatMessage, Game};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinQueue,
    LeaveQueue,
    RespondToMatch { match_id: Uuid, accept: bool },
    PlayerReady { game_id: Uuid },
    PaddleMove { game_id: Uuid, y: f32 },
    BallSync { game_id: Uuid, x: f32, y: f32, vx: f32, vy: f32 },
    ScoreUpdate { game_id: Uuid, score_player_one: u32, score_player_two: u32 },
    SendMessage { receiver_id: Uuid, content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    MatchProposal { id: Uuid, player_one: PlayerRef, player_two: PlayerRef },
    MatchStart { id: Uuid, game: Game, player_one: PlayerRef, player_two: PlayerRef },
    RemainInQueue,
    LeftQueue,
    GameReady { game_id: Uuid, message: String },
    GameStart { game_id: Uuid, side: Side, points_to_win: u32 },
    OpponentPaddle { game_id: Uuid, y: f32 },
    BallState { game_id: Uuid, x: f32, y: f32, vx: f32, vy: f32 },
    ScoreUpdate { game_id: Uuid, score_player_one: u32, score_player_two: u32 },
    GameOver { game_id: Uuid, winner_id: Uuid, score_player_one: u32, score_player_two: u32 },
    OpponentLeft { game_id: Uuid },
    ReceiveMessage { message: ChatMessage, sender_name: String },
    FriendRequest { message: ChatMessage, sender_name: String },
    FriendAccepted { user_id: Uuid, name: String },
    Presence { user_id: Uuid, online: bool },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_events_use_camel_case() {
        let event: ClientEvent = serde_json::from_value(json!({"event": "joinQueue"})).unwrap();
        assert_eq!(event, ClientEvent::JoinQueue);

        let match_id = Uuid::now_v7();
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "respondToMatch",
            "data": { "matchId": match_id, "accept": true },
        }))
        .unwrap();
        assert_eq!(event, ClientEvent::RespondToMatch { match_id, accept: true });
    }

    #[test]
    fn unknown_events_do_not_parse() {
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "launchMissiles"})).is_err());
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "paddleMove", "data": {}})).is_err());
    }

    #[test]
    fn server_events_are_tagged() {
        let game_id = Uuid::now_v7();
        let value = serde_json::to_value(ServerEvent::OpponentPaddle { game_id, y: 0.5 }).unwrap();
        assert_eq!(value, json!({"event": "opponentPaddle", "data": {"gameId": game_id, "y": 0.5}}));

        let value = serde_json::to_value(ServerEvent::RemainInQueue).unwrap();
        assert_eq!(value, json!({"event": "remainInQueue"}));
    }
}

//! Relay for games in progress.
//!
//! The host (player one) runs the ball on its client; the server only
//! forwards paddle and ball positions between the two sockets, collects the
//! ready signals and persists the result once the host reports a winning
//! score. Games nobody gets ready for are dropped after `ready_timeout`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::Game,
    events::{Hub, ServerEvent, Side},
    AppResult, Reject,
};

use super::session;

const READY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
struct LiveGame {
    players: [Uuid; 2],
    ready: [bool; 2],
    score: [u32; 2],
    // tells a re-registered game apart from the one an expiry timer was set for
    registration: Uuid,
}

impl LiveGame {
    fn slot(&self, user_id: Uuid) -> AppResult<usize> {
        self.players
            .iter()
            .position(|id| *id == user_id)
            .ok_or(Reject::Forbidden("not a player in this game").into())
    }

    fn started(&self) -> bool {
        self.ready.iter().all(|ready| *ready)
    }

    fn host(&self) -> Uuid {
        self.players[0]
    }

    fn guest(&self) -> Uuid {
        self.players[1]
    }
}

#[derive(Clone)]
pub struct LiveGames {
    games: Arc<Mutex<HashMap<Uuid, LiveGame>>>,
    points_to_win: u32,
    ready_timeout: Duration,
}

impl LiveGames {
    pub fn new(points_to_win: u32) -> Self {
        Self {
            games: Arc::default(),
            points_to_win,
            ready_timeout: READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(self, ready_timeout: Duration) -> Self {
        Self { ready_timeout, ..self }
    }

    pub async fn register(&self, game: &Game) {
        let registration = Uuid::now_v7();
        {
            let mut games = self.games.lock().await;
            if games.contains_key(&game.id) {
                return;
            }
            games.insert(game.id, LiveGame {
                players: [game.player_one_id, game.player_two_id],
                ready: [false; 2],
                score: [game.score_player_one as u32, game.score_player_two as u32],
                registration,
            });
        }
        debug!("game {} is live", game.id);

        let live = self.clone();
        let game_id = game.id;
        tokio::spawn(async move {
            tokio::time::sleep(live.ready_timeout).await;
            live.expire(game_id, registration).await;
        });
    }

    async fn expire(&self, game_id: Uuid, registration: Uuid) {
        let mut games = self.games.lock().await;
        if games.get(&game_id).is_some_and(|game| game.registration == registration && !game.started()) {
            games.remove(&game_id);
            info!("game {game_id} dropped, the players never got ready");
        }
    }

    #[cfg(test)]
    async fn is_live(&self, game_id: Uuid) -> bool {
        self.games.lock().await.contains_key(&game_id)
    }

    pub async fn ready(&self, hub: &Hub, game_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let started = {
            let mut games = self.games.lock().await;
            let game = games.get_mut(&game_id).ok_or(Reject::NotFound("live game"))?;
            let slot = game.slot(user_id)?;
            if game.ready[slot] {
                return Ok(());
            }
            game.ready[slot] = true;
            game.started().then(|| game.clone())
        };

        if let Some(game) = started {
            info!("game {game_id} started");
            for (player, side) in game.players.into_iter().zip([Side::Left, Side::Right]) {
                hub.emit(player, ServerEvent::GameStart { game_id, side, points_to_win: self.points_to_win }).await;
            }
        }
        Ok(())
    }

    pub async fn paddle(&self, hub: &Hub, game_id: Uuid, user_id: Uuid, y: f32) -> AppResult<()> {
        let opponent = {
            let games = self.games.lock().await;
            let game = games.get(&game_id).ok_or(Reject::NotFound("live game"))?;
            let slot = game.slot(user_id)?;
            game.players[1 - slot]
        };

        hub.emit(opponent, ServerEvent::OpponentPaddle { game_id, y }).await;
        Ok(())
    }

    pub async fn ball(&self, hub: &Hub, game_id: Uuid, user_id: Uuid, x: f32, y: f32, vx: f32, vy: f32) -> AppResult<()> {
        let guest = {
            let games = self.games.lock().await;
            let game = games.get(&game_id).ok_or(Reject::NotFound("live game"))?;
            game.slot(user_id)?;
            if game.host() != user_id {
                return Err(Reject::Forbidden("only the host syncs the ball"))?;
            }
            game.guest()
        };

        hub.emit(guest, ServerEvent::BallState { game_id, x, y, vx, vy }).await;
        Ok(())
    }

    /// Applies a score report from the host. Reaching the winning score ends
    /// and persists the game.
    pub async fn score(
        &self,
        db_pool: &SqlitePool,
        hub: &Hub,
        game_id: Uuid,
        user_id: Uuid,
        score_player_one: u32,
        score_player_two: u32,
    ) -> AppResult<()> {
        let (players, winner) = {
            let mut games = self.games.lock().await;
            let game = games.get_mut(&game_id).ok_or(Reject::NotFound("live game"))?;
            game.slot(user_id)?;
            if game.host() != user_id {
                return Err(Reject::Forbidden("only the host reports the score"))?;
            }
            if !game.started() {
                return Err(Reject::BadRequest("game has not started"))?;
            }
            if score_player_one < game.score[0] || score_player_two < game.score[1] {
                return Err(Reject::BadRequest("scores only go up"))?;
            }

            let winner = match (score_player_one >= self.points_to_win, score_player_two >= self.points_to_win) {
                (true, true) => return Err(Reject::BadRequest("only one player can win"))?,
                (true, false) => Some(game.players[0]),
                (false, true) => Some(game.players[1]),
                (false, false) => None,
            };

            game.score = [score_player_one, score_player_two];
            (game.players, winner)
        };

        hub.emit_all(&players, ServerEvent::ScoreUpdate { game_id, score_player_one, score_player_two }).await;

        if let Some(winner_id) = winner {
            // stays live until the result is stored, so the host can report it again
            session::finish_game(db_pool, game_id, score_player_one, score_player_two, winner_id).await?;
            self.games.lock().await.remove(&game_id);
            hub.emit_all(&players, ServerEvent::GameOver { game_id, winner_id, score_player_one, score_player_two }).await;
        }
        Ok(())
    }

    /// Forfeits every live game of a user who went away. Returns the games
    /// whose result was stored.
    pub async fn abandon(&self, db_pool: &SqlitePool, hub: &Hub, user_id: Uuid) -> Vec<Uuid> {
        let abandoned: Vec<(Uuid, LiveGame)> = {
            let mut games = self.games.lock().await;
            let ids: Vec<Uuid> = games
                .iter()
                .filter(|(_, game)| game.players.contains(&user_id))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| games.remove(&id).map(|game| (id, game)))
                .collect()
        };

        let mut forfeited = Vec::with_capacity(abandoned.len());
        for (game_id, game) in abandoned {
            let winner_id = if game.host() == user_id { game.guest() } else { game.host() };
            let [score_player_one, score_player_two] = game.score;
            info!("game {game_id} forfeited by {user_id}");

            if let Err(e) = session::finish_game(db_pool, game_id, score_player_one, score_player_two, winner_id).await {
                warn!("could not record the forfeit of game {game_id}: {:#}", e.0);
                continue;
            }
            hub.emit(winner_id, ServerEvent::OpponentLeft { game_id }).await;
            hub.emit(winner_id, ServerEvent::GameOver { game_id, winner_id, score_player_one, score_player_two }).await;
            forfeited.push(game_id);
        }
        forfeited
    }
}

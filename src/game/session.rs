//! Persisted game sessions.
//!
//! A pair of players has at most one unfinished game. When the challenged
//! player asks for a game the pair already has pending, that accepts it
//! instead of creating a second row.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{db::{self, Game}, AppResult, Reject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    /// A new, unaccepted game.
    Created(Game),
    /// The challenger asked again; the game still waits on the opponent.
    Pending(Game),
    /// The opponent answered a pending challenge and the game is now accepted.
    Joined(Game),
    /// The pair already has an accepted, unfinished game.
    Resumed(Game),
}

impl Opened {
    pub fn into_game(self) -> Game {
        match self {
            Opened::Created(game) | Opened::Pending(game) | Opened::Joined(game) | Opened::Resumed(game) => game,
        }
    }
}

pub async fn find_existing_game(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Option<Game>> {
    Ok(sqlx::query_as(
        "SELECT * FROM games
         WHERE winner_id IS NULL
           AND ((player_one_id=? AND player_two_id=?) OR (player_one_id=? AND player_two_id=?))
         ORDER BY start_time DESC
         LIMIT 1",
    )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_game(db_pool: &SqlitePool, game_id: Uuid) -> AppResult<Game> {
    sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id=?")
        .bind(game_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(Reject::NotFound("game").into())
}

/// Finds or creates the unfinished game of a pair.
///
/// `games_open_pair` keeps one unfinished row per pair, so a racing insert
/// is ignored and the winner's row is read back instead.
pub async fn open_session(db_pool: &SqlitePool, player_one: Uuid, player_two: Uuid) -> AppResult<Opened> {
    if player_one == player_two {
        return Err(Reject::BadRequest("cannot play against yourself"))?;
    }

    if let Some(game) = find_existing_game(db_pool, player_one, player_two).await? {
        return answer(db_pool, game, player_one).await;
    }

    let game = Game {
        id: Uuid::now_v7(),
        player_one_id: player_one,
        player_two_id: player_two,
        score_player_one: 0,
        score_player_two: 0,
        start_time: db::now(),
        winner_id: None,
        accepted: false,
    };
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO games (id,player_one_id,player_two_id,score_player_one,score_player_two,start_time,winner_id,accepted)
         VALUES (?,?,?,?,?,?,?,?)",
    )
        .bind(game.id)
        .bind(game.player_one_id)
        .bind(game.player_two_id)
        .bind(game.score_player_one)
        .bind(game.score_player_two)
        .bind(game.start_time)
        .bind(game.winner_id)
        .bind(game.accepted)
        .execute(db_pool)
        .await?
        .rows_affected();

    if inserted == 1 {
        info!("game {} created for {player_one} and {player_two}", game.id);
        return Ok(Opened::Created(game));
    }

    let Some(game) = find_existing_game(db_pool, player_one, player_two).await? else {
        return Err(Reject::Conflict("game was finished meanwhile"))?;
    };
    answer(db_pool, game, player_one).await
}

/// Only the challenged player can accept a pending game.
async fn answer(db_pool: &SqlitePool, game: Game, caller: Uuid) -> AppResult<Opened> {
    if game.accepted {
        return Ok(Opened::Resumed(game));
    }
    if game.player_one_id == caller {
        return Ok(Opened::Pending(game));
    }

    if accept(db_pool, game.id).await? {
        info!("game {} accepted by both players", game.id);
        Ok(Opened::Joined(Game { accepted: true, ..game }))
    } else {
        Ok(Opened::Resumed(Game { accepted: true, ..game }))
    }
}

/// Opens the pair's session and makes sure it is accepted.
pub async fn start_session(db_pool: &SqlitePool, player_one: Uuid, player_two: Uuid) -> AppResult<Game> {
    let game = open_session(db_pool, player_one, player_two).await?.into_game();
    if game.accepted {
        return Ok(game);
    }
    accept(db_pool, game.id).await?;
    Ok(Game { accepted: true, ..game })
}

/// False when someone else accepted it first.
async fn accept(db_pool: &SqlitePool, game_id: Uuid) -> AppResult<bool> {
    let updated = sqlx::query("UPDATE games SET accepted=TRUE WHERE id=? AND NOT accepted")
        .bind(game_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(updated == 1)
}

pub async fn get_all_games(db_pool: &SqlitePool) -> AppResult<Vec<Game>> {
    Ok(sqlx::query_as("SELECT * FROM games ORDER BY start_time DESC")
        .fetch_all(db_pool)
        .await?)
}

pub async fn get_my_game(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Game>> {
    Ok(sqlx::query_as(
        "SELECT * FROM games WHERE player_one_id=? OR player_two_id=?
         ORDER BY start_time DESC, id DESC LIMIT 1",
    )
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?)
}

/// Latest unfinished game the user has accepted, if any.
pub async fn get_active_game(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Game>> {
    Ok(sqlx::query_as(
        "SELECT * FROM games
         WHERE (player_one_id=? OR player_two_id=?) AND accepted AND winner_id IS NULL
         ORDER BY start_time DESC, id DESC LIMIT 1",
    )
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn get_enemy_game(db_pool: &SqlitePool, enemy_name: &str) -> AppResult<Option<Game>> {
    let Some(enemy) = crate::users::find_by_name(db_pool, enemy_name).await? else {
        return Err(Reject::NotFound("user"))?;
    };
    get_my_game(db_pool, enemy.id).await
}

/// Records the final score and updates both players' ladder standing.
pub async fn finish_game(
    db_pool: &SqlitePool,
    game_id: Uuid,
    score_player_one: u32,
    score_player_two: u32,
    winner_id: Uuid,
) -> AppResult<Game> {
    let game = find_game(db_pool, game_id).await?;
    if game.winner_id.is_some() {
        return Err(Reject::Conflict("game already finished"))?;
    }
    let Some(loser_id) = game.opponent_of(winner_id) else {
        return Err(Reject::BadRequest("winner is not part of the game"))?;
    };

    let mut tx = db_pool.begin().await?;
    sqlx::query("UPDATE games SET score_player_one=?, score_player_two=?, winner_id=? WHERE id=?")
        .bind(score_player_one as i64)
        .bind(score_player_two as i64)
        .bind(winner_id)
        .bind(game_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET wins=wins+1, ladder_level=ladder_level+1 WHERE id=?")
        .bind(winner_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET losses=losses+1, ladder_level=MAX(ladder_level-1, 1) WHERE id=?")
        .bind(loser_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("game {game_id} won by {winner_id} ({score_player_one}:{score_player_two})");
    find_game(db_pool, game_id).await
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::{db::testing, users};

    #[tokio::test]
    async fn second_request_joins_the_pending_game() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;

        let created = match open_session(&db_pool, ada, bob).await.unwrap() {
            Opened::Created(game) => game,
            other => panic!("expected a new game, got {other:?}"),
        };
        assert!(!created.accepted);
        assert_eq!((created.score_player_one, created.score_player_two), (0, 0));
        assert_eq!(created.winner_id, None);

        // order of the pair does not matter
        let joined = match open_session(&db_pool, bob, ada).await.unwrap() {
            Opened::Joined(game) => game,
            other => panic!("expected to join, got {other:?}"),
        };
        assert_eq!(joined.id, created.id);
        assert!(joined.accepted);

        let resumed = open_session(&db_pool, ada, bob).await.unwrap();
        assert!(matches!(&resumed, Opened::Resumed(game) if game.id == created.id));
        assert_eq!(get_all_games(&db_pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn challenger_cannot_accept_alone() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;

        let created = open_session(&db_pool, ada, bob).await.unwrap().into_game();
        let again = open_session(&db_pool, ada, bob).await.unwrap();
        assert_eq!(again, Opened::Pending(created.clone()));
        assert!(!find_game(&db_pool, created.id).await.unwrap().accepted);

        assert!(matches!(open_session(&db_pool, bob, ada).await.unwrap(), Opened::Joined(_)));
    }

    #[tokio::test]
    async fn racing_challenges_share_one_game() {
        let shared = testing::shared_pool().await;
        let db_pool = &shared.db_pool;
        let ada = testing::user(db_pool, "ada").await;
        let bob = testing::user(db_pool, "bob").await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let db_pool = db_pool.clone();
                let (one, two) = if i % 2 == 0 { (ada, bob) } else { (bob, ada) };
                tokio::spawn(async move { open_session(&db_pool, one, two).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().into_game().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(get_all_games(db_pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_session_is_always_accepted() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;

        let game = start_session(&db_pool, ada, bob).await.unwrap();
        assert!(game.accepted);
        assert!(find_game(&db_pool, game.id).await.unwrap().accepted);
        assert_eq!(get_active_game(&db_pool, bob).await.unwrap().map(|g| g.id), Some(game.id));

        let again = start_session(&db_pool, bob, ada).await.unwrap();
        assert_eq!(again.id, game.id);
    }

    #[tokio::test]
    async fn playing_yourself_is_refused() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;

        let err = open_session(&db_pool, ada, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn finishing_updates_the_ladder() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let game = start_session(&db_pool, ada, bob).await.unwrap();

        let finished = finish_game(&db_pool, game.id, 5, 3, ada).await.unwrap();
        assert_eq!(finished.winner_id, Some(ada));
        assert_eq!((finished.score_player_one, finished.score_player_two), (5, 3));

        let winner = users::find_by_id(&db_pool, ada).await.unwrap();
        let loser = users::find_by_id(&db_pool, bob).await.unwrap();
        assert_eq!((winner.wins, winner.losses, winner.ladder_level), (1, 0, 2));
        assert_eq!((loser.wins, loser.losses, loser.ladder_level), (0, 1, 1));

        let err = finish_game(&db_pool, game.id, 5, 3, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // a finished game no longer blocks a rematch
        let rematch = open_session(&db_pool, ada, bob).await.unwrap();
        assert!(matches!(&rematch, Opened::Created(g) if g.id != game.id));
        assert!(get_active_game(&db_pool, ada).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_game_is_found_by_player_or_name() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let game = start_session(&db_pool, ada, bob).await.unwrap();

        assert_eq!(get_my_game(&db_pool, ada).await.unwrap(), Some(game.clone()));
        assert_eq!(get_enemy_game(&db_pool, "bob").await.unwrap(), Some(game));
        assert!(get_enemy_game(&db_pool, "nobody").await.is_err());
    }
}

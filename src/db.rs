use serde::Serialize;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        email TEXT UNIQUE,
        name TEXT NOT NULL UNIQUE,
        nickname TEXT,
        status TEXT NOT NULL DEFAULT 'fresh',
        password TEXT,
        wins INTEGER NOT NULL DEFAULT 0,
        losses INTEGER NOT NULL DEFAULT 0,
        ladder_level INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS friendships (
        user_id BLOB NOT NULL,
        friend_id BLOB NOT NULL,
        PRIMARY KEY (user_id, friend_id)
    )",
    "CREATE TABLE IF NOT EXISTS ignores (
        user_id BLOB NOT NULL,
        ignored_id BLOB NOT NULL,
        PRIMARY KEY (user_id, ignored_id)
    )",
    "CREATE TABLE IF NOT EXISTS games (
        id BLOB PRIMARY KEY,
        player_one_id BLOB NOT NULL,
        player_two_id BLOB NOT NULL,
        score_player_one INTEGER NOT NULL DEFAULT 0,
        score_player_two INTEGER NOT NULL DEFAULT 0,
        start_time INTEGER NOT NULL,
        winner_id BLOB,
        accepted BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS games_open_pair ON games (
        min(player_one_id, player_two_id),
        max(player_one_id, player_two_id)
    ) WHERE winner_id IS NULL",
    "CREATE TABLE IF NOT EXISTS chat_rooms (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id BLOB NOT NULL,
        password TEXT,
        is_public BOOLEAN NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS room_members (
        room_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        PRIMARY KEY (room_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS room_admins (
        room_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        PRIMARY KEY (room_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS room_messages (
        id BLOB PRIMARY KEY,
        room_id BLOB NOT NULL,
        sender_id BLOB NOT NULL,
        reply_to_id BLOB,
        content TEXT NOT NULL,
        sent_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chat_messages (
        id BLOB PRIMARY KEY,
        sender_id BLOB NOT NULL,
        receiver_id BLOB NOT NULL,
        message_type TEXT NOT NULL,
        content TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
];

/// Opens the pool and makes sure every table exists.
///
/// In-memory databases are per connection, so tests pass `max_connections = 1`.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&db_pool).await?;
    }

    Ok(db_pool)
}

pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: String,
    pub nickname: Option<String>,
    pub status: String,
    pub password: Option<String>,
    pub wins: i64,
    pub losses: i64,
    pub ladder_level: i64,

    // unique: id
    // unique: email
    // unique: name
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: Uuid,
    pub player_one_id: Uuid,
    pub player_two_id: Uuid,
    pub score_player_one: i64,
    pub score_player_two: i64,
    pub start_time: i64,
    pub winner_id: Option<Uuid>,
    pub accepted: bool,

    // unique among unfinished games: {player_one_id, player_two_id}
}

impl Game {
    pub fn opponent_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.player_one_id == user_id {
            Some(self.player_two_id)
        } else if self.player_two_id == user_id {
            Some(self.player_one_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub password: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub reply_to_id: Option<Uuid>,
    pub content: String,
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub message_type: String,
    pub content: String,
    pub status: String,
    pub created_at: i64,
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::SqlitePool;
    use uuid::Uuid;

    pub async fn pool() -> SqlitePool {
        super::connect("sqlite::memory:", 1).await.unwrap()
    }

    /// A file-backed pool with several connections, for tests that race writers.
    pub struct SharedPool {
        pub db_pool: SqlitePool,
        path: std::path::PathBuf,
    }

    impl Drop for SharedPool {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let mut path = self.path.clone().into_os_string();
                path.push(suffix);
                let _ = std::fs::remove_file(path);
            }
        }
    }

    pub async fn shared_pool() -> SharedPool {
        let path = std::env::temp_dir().join(format!("pongchat-{}.db", Uuid::now_v7()));
        let db_pool = super::connect(&format!("sqlite://{}?mode=rwc", path.display()), 16)
            .await
            .unwrap();
        SharedPool { db_pool, path }
    }

    pub async fn user(db_pool: &SqlitePool, name: &str) -> Uuid {
        crate::users::create_user(db_pool, &format!("{name}@example.com"), name)
            .await
            .unwrap()
            .id
    }
}

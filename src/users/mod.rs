mod profile;

use std::collections::HashSet;

use axum::{routing::{get, post}, Router};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{db::User, password, AppResult, AppState, Reject};

pub const STATUS_FRESH: &str = "fresh";
pub const STATUS_CREATED: &str = "created";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::put(profile::update))
        .route("/id", get(profile::me))
        .route("/publicprofile", get(profile::public_profile))
        .route("/complete", get(profile::is_complete).post(profile::complete))
        .route("/friends", get(profile::friends))
        .route("/ignore/{id}", post(profile::ignore).delete(profile::unignore))
        .route("/{id}", get(profile::profile))
}

fn random_nickname() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];
    let nouns = [
        "Paddle", "Ball", "Smash", "Volley", "Spin", "Rally", "Serve", "Net",
        "Lob", "Drive", "Chop", "Loop", "Block", "Flick", "Edge",
    ];

    let mut rng = rand::rng();
    match (adjectives.choose(&mut rng), nouns.choose(&mut rng)) {
        (Some(adjective), Some(noun)) => format!("{adjective} {noun}"),
        _ => "Anonymous".to_owned(),
    }
}

/// Creates a `fresh` user. A taken name gets a numeric suffix.
pub async fn create_user(db_pool: &SqlitePool, email: &str, name: &str) -> AppResult<User> {
    if find_by_email(db_pool, email).await?.is_some() {
        return Err(Reject::Conflict("email or name already exists"))?;
    }

    let mut unique_name = name.to_owned();
    let mut suffix = 1;
    while find_by_name(db_pool, &unique_name).await?.is_some() {
        suffix += 1;
        unique_name = format!("{name}{suffix}");
    }

    let id = Uuid::now_v7();
    let nickname = random_nickname();
    info!("adding {unique_name}#{id} <{email}>, {nickname}");

    sqlx::query("INSERT INTO users (id,email,name,nickname,status) VALUES (?,?,?,?,?)")
        .bind(id)
        .bind(email)
        .bind(&unique_name)
        .bind(&nickname)
        .bind(STATUS_FRESH)
        .execute(db_pool)
        .await?;

    find_by_id(db_pool, id).await
}

pub async fn find_by_id(db_pool: &SqlitePool, id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(Reject::NotFound("user").into())
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE email=?")
        .bind(email)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_by_name(db_pool: &SqlitePool, name: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE name=?")
        .bind(name)
        .fetch_optional(db_pool)
        .await?)
}

/// Stores the credential hash and moves the user out of `fresh`.
pub async fn complete(db_pool: &SqlitePool, user_id: Uuid, password: &str) -> AppResult<User> {
    if password.is_empty() {
        return Err(Reject::BadRequest("password must not be empty"))?;
    }
    find_by_id(db_pool, user_id).await?;

    sqlx::query("UPDATE users SET password=?, status=? WHERE id=?")
        .bind(password::hash(password)?)
        .bind(STATUS_CREATED)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    find_by_id(db_pool, user_id).await
}

pub async fn is_profile_complete(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<bool> {
    let user = find_by_id(db_pool, user_id).await?;
    Ok(user.email.is_some() && user.status != STATUS_FRESH)
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
}

pub async fn update(db_pool: &SqlitePool, user_id: Uuid, changes: UserUpdate) -> AppResult<User> {
    let mut user = find_by_id(db_pool, user_id).await?;

    if let Some(name) = changes.name.filter(|name| *name != user.name) {
        if name.trim().is_empty() {
            return Err(Reject::BadRequest("name must not be empty"))?;
        }
        if find_by_name(db_pool, &name).await?.is_some() {
            return Err(Reject::Conflict("username already exists"))?;
        }
        user.name = name;
    }

    if let Some(email) = changes.email.filter(|email| Some(email) != user.email.as_ref()) {
        if find_by_email(db_pool, &email).await?.is_some() {
            return Err(Reject::Conflict("email already exists"))?;
        }
        user.email = Some(email);
    }

    if let Some(nickname) = changes.nickname {
        user.nickname = Some(nickname);
    }

    if let Some(password) = changes.password.filter(|p| !p.is_empty()) {
        user.password = Some(password::hash(&password)?);
    }

    sqlx::query("UPDATE users SET name=?, email=?, nickname=?, password=? WHERE id=?")
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.nickname)
        .bind(&user.password)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    Ok(user)
}

pub async fn add_friendship(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;
    for (user_id, friend_id) in [(a, b), (b, a)] {
        sqlx::query("INSERT OR IGNORE INTO friendships (user_id,friend_id) VALUES (?,?)")
            .bind(user_id)
            .bind(friend_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn are_friends(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM friendships WHERE user_id=? AND friend_id=?")
        .bind(a)
        .bind(b)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn friends(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<User>> {
    Ok(sqlx::query_as(
        "SELECT users.* FROM users JOIN friendships ON friendships.friend_id = users.id
         WHERE friendships.user_id=? ORDER BY users.name",
    )
        .bind(user_id)
        .fetch_all(db_pool)
        .await?)
}

pub async fn ignore(db_pool: &SqlitePool, user_id: Uuid, ignored_id: Uuid) -> AppResult<()> {
    if user_id == ignored_id {
        return Err(Reject::BadRequest("cannot ignore yourself"))?;
    }
    find_by_id(db_pool, ignored_id).await?;

    sqlx::query("INSERT OR IGNORE INTO ignores (user_id,ignored_id) VALUES (?,?)")
        .bind(user_id)
        .bind(ignored_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn unignore(db_pool: &SqlitePool, user_id: Uuid, ignored_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM ignores WHERE user_id=? AND ignored_id=?")
        .bind(user_id)
        .bind(ignored_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn ignores(db_pool: &SqlitePool, user_id: Uuid, other_id: Uuid) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM ignores WHERE user_id=? AND ignored_id=?")
        .bind(user_id)
        .bind(other_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn ignore_list(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT ignored_id FROM ignores WHERE user_id=?")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

//! Chat room membership and roles.
//!
//! The owner is always a member and an admin. Admins invite, kick and grant
//! admin rights; only the owner touches the password or deletes the room.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::{self, ChatRoom, RoomMessage},
    password, users, AppResult, Reject,
};

use super::{MAX_OWNED_ROOMS, ROOM_CAPACITY};

pub async fn find_room(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<ChatRoom> {
    sqlx::query_as::<_, ChatRoom>("SELECT * FROM chat_rooms WHERE id=?")
        .bind(room_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(Reject::NotFound("room").into())
}

pub async fn is_member(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM room_members WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn is_admin(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM room_admins WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn members(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT user_id FROM room_members WHERE room_id=?")
        .bind(room_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn admins(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT user_id FROM room_admins WHERE room_id=?")
        .bind(room_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Adds the user unless the room is full. Count and insert are one statement
/// so concurrent joins cannot overshoot the capacity.
async fn add_member(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO room_members (room_id,user_id)
         SELECT ?,? WHERE (SELECT COUNT(*) FROM room_members WHERE room_id=?) < ?",
    )
        .bind(room_id)
        .bind(user_id)
        .bind(room_id)
        .bind(ROOM_CAPACITY)
        .execute(db_pool)
        .await?
        .rows_affected();

    if inserted == 0 && !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::Conflict("room is full"))?;
    }
    Ok(())
}

async fn remove_member(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;
    for table in ["room_members", "room_admins"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE room_id=? AND user_id=?"))
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn require_admin(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<ChatRoom> {
    let room = find_room(db_pool, room_id).await?;
    if !is_admin(db_pool, room_id, user_id).await? {
        return Err(Reject::Forbidden("only room admins can do that"))?;
    }
    Ok(room)
}

async fn require_owner(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<ChatRoom> {
    let room = find_room(db_pool, room_id).await?;
    if room.owner_id != user_id {
        return Err(Reject::Forbidden("only the room owner can do that"))?;
    }
    Ok(room)
}

pub async fn create_room(
    db_pool: &SqlitePool,
    owner_id: Uuid,
    name: &str,
    is_public: bool,
    room_password: Option<&str>,
) -> AppResult<ChatRoom> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Reject::BadRequest("room name is empty"))?;
    }

    let room = ChatRoom {
        id: Uuid::now_v7(),
        name: name.to_owned(),
        owner_id,
        password: room_password.map(password::hash).transpose()?,
        is_public,
    };

    let mut tx = db_pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO chat_rooms (id,name,owner_id,password,is_public)
         SELECT ?,?,?,?,? WHERE (SELECT COUNT(*) FROM chat_rooms WHERE owner_id=?) < ?",
    )
        .bind(room.id)
        .bind(&room.name)
        .bind(room.owner_id)
        .bind(&room.password)
        .bind(room.is_public)
        .bind(owner_id)
        .bind(MAX_OWNED_ROOMS)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if inserted == 0 {
        return Err(Reject::Forbidden("room limit reached"))?;
    }
    for table in ["room_members", "room_admins"] {
        sqlx::query(&format!("INSERT INTO {table} (room_id,user_id) VALUES (?,?)"))
            .bind(room.id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!("room {}#{} created by {owner_id}", room.name, room.id);
    Ok(room)
}

/// Public rooms plus every room the user belongs to.
pub async fn list_rooms(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<ChatRoom>> {
    Ok(sqlx::query_as(
        "SELECT * FROM chat_rooms
         WHERE is_public OR id IN (SELECT room_id FROM room_members WHERE user_id=?)
         ORDER BY name, id",
    )
        .bind(user_id)
        .fetch_all(db_pool)
        .await?)
}

/// The room, if the user may look at it.
pub async fn visible_room(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<ChatRoom> {
    let room = find_room(db_pool, room_id).await?;
    if !room.is_public && !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::NotFound("room"))?;
    }
    Ok(room)
}

pub async fn join_room(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid, given: Option<&str>) -> AppResult<()> {
    let room = find_room(db_pool, room_id).await?;
    if is_member(db_pool, room_id, user_id).await? {
        return Ok(());
    }
    if !room.is_public {
        return Err(Reject::Forbidden("private rooms are invite only"))?;
    }
    if let Some(hash) = &room.password {
        if !given.is_some_and(|given| password::verify(given, hash)) {
            return Err(Reject::Forbidden("wrong room password"))?;
        }
    }

    add_member(db_pool, room_id, user_id).await?;
    info!("{user_id} joined room {room_id}");
    Ok(())
}

pub async fn leave_room(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let room = find_room(db_pool, room_id).await?;
    if room.owner_id == user_id {
        return Err(Reject::BadRequest("the owner cannot leave, delete the room instead"))?;
    }
    if !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::NotFound("membership"))?;
    }

    remove_member(db_pool, room_id, user_id).await?;
    info!("{user_id} left room {room_id}");
    Ok(())
}

pub async fn invite(db_pool: &SqlitePool, room_id: Uuid, admin_id: Uuid, user_id: Uuid) -> AppResult<()> {
    require_admin(db_pool, room_id, admin_id).await?;
    users::find_by_id(db_pool, user_id).await?;
    if is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::Conflict("already a member"))?;
    }

    add_member(db_pool, room_id, user_id).await?;
    info!("{admin_id} invited {user_id} to room {room_id}");
    Ok(())
}

pub async fn kick(db_pool: &SqlitePool, room_id: Uuid, admin_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let room = require_admin(db_pool, room_id, admin_id).await?;
    if room.owner_id == user_id {
        return Err(Reject::Forbidden("the owner cannot be kicked"))?;
    }
    if !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::NotFound("membership"))?;
    }

    remove_member(db_pool, room_id, user_id).await?;
    info!("{admin_id} kicked {user_id} from room {room_id}");
    Ok(())
}

pub async fn grant_admin(db_pool: &SqlitePool, room_id: Uuid, admin_id: Uuid, user_id: Uuid) -> AppResult<()> {
    require_admin(db_pool, room_id, admin_id).await?;
    if !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::BadRequest("only members can become admins"))?;
    }

    sqlx::query("INSERT OR IGNORE INTO room_admins (room_id,user_id) VALUES (?,?)")
        .bind(room_id)
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn revoke_admin(db_pool: &SqlitePool, room_id: Uuid, admin_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let room = require_admin(db_pool, room_id, admin_id).await?;
    if room.owner_id == user_id {
        return Err(Reject::Forbidden("the owner stays an admin"))?;
    }

    sqlx::query("DELETE FROM room_admins WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// `None` removes the password.
pub async fn set_password(db_pool: &SqlitePool, room_id: Uuid, owner_id: Uuid, new: Option<&str>) -> AppResult<()> {
    require_owner(db_pool, room_id, owner_id).await?;

    sqlx::query("UPDATE chat_rooms SET password=? WHERE id=?")
        .bind(new.map(password::hash).transpose()?)
        .bind(room_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn delete_room(db_pool: &SqlitePool, room_id: Uuid, owner_id: Uuid) -> AppResult<()> {
    require_owner(db_pool, room_id, owner_id).await?;

    let mut tx = db_pool.begin().await?;
    for statement in [
        "DELETE FROM room_messages WHERE room_id=?",
        "DELETE FROM room_admins WHERE room_id=?",
        "DELETE FROM room_members WHERE room_id=?",
        "DELETE FROM chat_rooms WHERE id=?",
    ] {
        sqlx::query(statement)
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!("room {room_id} deleted");
    Ok(())
}

pub async fn post_message(
    db_pool: &SqlitePool,
    room_id: Uuid,
    sender_id: Uuid,
    reply_to_id: Option<Uuid>,
    content: &str,
) -> AppResult<RoomMessage> {
    if !is_member(db_pool, room_id, sender_id).await? {
        return Err(Reject::Forbidden("only members can post"))?;
    }
    if content.trim().is_empty() {
        return Err(Reject::BadRequest("message is empty"))?;
    }
    if let Some(reply_to_id) = reply_to_id {
        sqlx::query("SELECT 1 FROM room_messages WHERE id=? AND room_id=?")
            .bind(reply_to_id)
            .bind(room_id)
            .fetch_optional(db_pool)
            .await?
            .ok_or(Reject::BadRequest("replied message is not in this room"))?;
    }

    let message = RoomMessage {
        id: Uuid::now_v7(),
        room_id,
        sender_id,
        reply_to_id,
        content: content.to_owned(),
        sent_at: db::now(),
    };
    sqlx::query("INSERT INTO room_messages (id,room_id,sender_id,reply_to_id,content,sent_at) VALUES (?,?,?,?,?,?)")
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(message.reply_to_id)
        .bind(&message.content)
        .bind(message.sent_at)
        .execute(db_pool)
        .await?;

    Ok(message)
}

/// The room history for a member, oldest first.
pub async fn messages(db_pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> AppResult<Vec<RoomMessage>> {
    find_room(db_pool, room_id).await?;
    if !is_member(db_pool, room_id, user_id).await? {
        return Err(Reject::Forbidden("only members can read the room"))?;
    }

    Ok(sqlx::query_as("SELECT * FROM room_messages WHERE room_id=? ORDER BY sent_at, id")
        .bind(room_id)
        .fetch_all(db_pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::db::testing;

    #[tokio::test]
    async fn owner_is_member_and_admin() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;

        let room = create_room(&db_pool, ada, " lobby ", true, None).await.unwrap();
        assert_eq!(room.name, "lobby");
        assert!(is_member(&db_pool, room.id, ada).await.unwrap());
        assert!(is_admin(&db_pool, room.id, ada).await.unwrap());

        let err = leave_room(&db_pool, room.id, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = revoke_admin(&db_pool, room.id, ada, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn owning_is_capped() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;

        for i in 0..MAX_OWNED_ROOMS {
            create_room(&db_pool, ada, &format!("room {i}"), true, None).await.unwrap();
        }
        let err = create_room(&db_pool, ada, "one too many", true, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rooms_fill_up() {
        let db_pool = testing::pool().await;
        let owner = testing::user(&db_pool, "owner").await;
        let room = create_room(&db_pool, owner, "busy", true, None).await.unwrap();

        for i in 1..ROOM_CAPACITY {
            let user = testing::user(&db_pool, &format!("user{i}")).await;
            join_room(&db_pool, room.id, user, None).await.unwrap();
        }
        assert_eq!(members(&db_pool, room.id).await.unwrap().len() as i64, ROOM_CAPACITY);

        let late = testing::user(&db_pool, "late").await;
        let err = join_room(&db_pool, room.id, late, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err = invite(&db_pool, room.id, owner, late).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn racing_joins_respect_the_capacity() {
        let shared = testing::shared_pool().await;
        let db_pool = &shared.db_pool;
        let owner = testing::user(db_pool, "owner").await;
        let room = create_room(db_pool, owner, "crowded", true, None).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let user = testing::user(db_pool, &format!("user{i}")).await;
            let db_pool = db_pool.clone();
            tasks.push(tokio::spawn(async move { join_room(&db_pool, room.id, user, None).await }));
        }

        let mut refused = 0;
        for task in tasks {
            if let Err(e) = task.await.unwrap() {
                assert_eq!(e.status(), StatusCode::CONFLICT);
                refused += 1;
            }
        }
        assert_eq!(refused, 20 - (ROOM_CAPACITY - 1));
        assert_eq!(members(db_pool, room.id).await.unwrap().len() as i64, ROOM_CAPACITY);
    }

    #[tokio::test]
    async fn racing_creates_respect_the_room_limit() {
        let shared = testing::shared_pool().await;
        let db_pool = &shared.db_pool;
        let ada = testing::user(db_pool, "ada").await;

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let db_pool = db_pool.clone();
                tokio::spawn(async move { create_room(&db_pool, ada, &format!("room {i}"), true, None).await })
            })
            .collect();
        for task in tasks {
            if let Err(e) = task.await.unwrap() {
                assert_eq!(e.status(), StatusCode::FORBIDDEN);
            }
        }

        let (owned,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_rooms WHERE owner_id=?")
            .bind(ada)
            .fetch_one(db_pool)
            .await
            .unwrap();
        assert_eq!(owned, MAX_OWNED_ROOMS);
    }

    #[tokio::test]
    async fn private_and_protected_rooms() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let eve = testing::user(&db_pool, "eve").await;

        let secret = create_room(&db_pool, ada, "secret", false, None).await.unwrap();
        let err = join_room(&db_pool, secret.id, bob, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(visible_room(&db_pool, secret.id, bob).await.unwrap_err().status(), StatusCode::NOT_FOUND);

        invite(&db_pool, secret.id, ada, bob).await.unwrap();
        assert!(visible_room(&db_pool, secret.id, bob).await.is_ok());

        // a plain member cannot invite
        let err = invite(&db_pool, secret.id, bob, eve).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let locked = create_room(&db_pool, ada, "locked", true, Some("hunter2")).await.unwrap();
        let err = join_room(&db_pool, locked.id, eve, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = join_room(&db_pool, locked.id, eve, Some("nope")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        join_room(&db_pool, locked.id, eve, Some("hunter2")).await.unwrap();

        let err = set_password(&db_pool, locked.id, eve, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        set_password(&db_pool, locked.id, ada, None).await.unwrap();
        join_room(&db_pool, locked.id, bob, None).await.unwrap();

        let listed: Vec<Uuid> = list_rooms(&db_pool, eve).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(listed, vec![locked.id]);
    }

    #[tokio::test]
    async fn admins_manage_members() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let eve = testing::user(&db_pool, "eve").await;
        let room = create_room(&db_pool, ada, "club", true, None).await.unwrap();

        join_room(&db_pool, room.id, bob, None).await.unwrap();
        let err = grant_admin(&db_pool, room.id, ada, eve).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        grant_admin(&db_pool, room.id, ada, bob).await.unwrap();
        invite(&db_pool, room.id, bob, eve).await.unwrap();

        let err = kick(&db_pool, room.id, bob, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = revoke_admin(&db_pool, room.id, bob, ada).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        kick(&db_pool, room.id, bob, eve).await.unwrap();
        assert!(!is_member(&db_pool, room.id, eve).await.unwrap());

        revoke_admin(&db_pool, room.id, ada, bob).await.unwrap();
        let err = invite(&db_pool, room.id, bob, eve).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deleting_is_for_the_owner() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let room = create_room(&db_pool, ada, "short lived", true, None).await.unwrap();
        join_room(&db_pool, room.id, bob, None).await.unwrap();
        grant_admin(&db_pool, room.id, ada, bob).await.unwrap();
        post_message(&db_pool, room.id, bob, None, "bye").await.unwrap();

        let err = delete_room(&db_pool, room.id, bob).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        delete_room(&db_pool, room.id, ada).await.unwrap();
        assert_eq!(find_room(&db_pool, room.id).await.unwrap_err().status(), StatusCode::NOT_FOUND);
        assert!(members(&db_pool, room.id).await.unwrap().is_empty());
        assert!(admins(&db_pool, room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn members_post_and_read() {
        let db_pool = testing::pool().await;
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let room = create_room(&db_pool, ada, "talk", true, None).await.unwrap();

        let err = post_message(&db_pool, room.id, bob, None, "hi").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let first = post_message(&db_pool, room.id, ada, None, "hi").await.unwrap();
        let reply = post_message(&db_pool, room.id, ada, Some(first.id), "again").await.unwrap();
        assert_eq!(reply.reply_to_id, Some(first.id));

        let err = post_message(&db_pool, room.id, ada, Some(Uuid::now_v7()), "lost").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let history = messages(&db_pool, room.id, ada).await.unwrap();
        assert_eq!(history.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, reply.id]);
        assert_eq!(messages(&db_pool, room.id, bob).await.unwrap_err().status(), StatusCode::FORBIDDEN);
    }
}

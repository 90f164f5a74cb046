use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::CurrentUser, db::ChatRoom, users, AppResult, AppState};

use super::{msg, room, RenderedMessage, RoomChannels};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Member {
    id: Uuid,
    name: String,
    admin: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomView {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    is_public: bool,
    has_password: bool,
    members: Vec<Member>,
}

impl RoomView {
    pub(crate) async fn load(db_pool: &SqlitePool, room: ChatRoom) -> AppResult<Self> {
        let admins = room::admins(db_pool, room.id).await?;
        let mut members = Vec::new();
        for user_id in room::members(db_pool, room.id).await? {
            let user = users::find_by_id(db_pool, user_id).await?;
            members.push(Member { admin: admins.contains(&user_id), id: user.id, name: user.name });
        }

        Ok(RoomView {
            id: room.id,
            name: room.name,
            owner_id: room.owner_id,
            is_public: room.is_public,
            has_password: room.password.is_some(),
            members,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomSummary {
    id: Uuid,
    name: String,
    is_public: bool,
    has_password: bool,
}

#[derive(Deserialize)]
pub(crate) struct PasswordQuery {
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    let rooms = room::list_rooms(&db_pool, user.id).await?;
    Ok(Json(rooms.into_iter().map(|room| RoomSummary {
        has_password: room.password.is_some(),
        id: room.id,
        name: room.name,
        is_public: room.is_public,
    }).collect()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn detail(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<RoomView>> {
    let room = room::visible_room(&db_pool, room_id, user.id).await?;
    Ok(Json(RoomView::load(&db_pool, room).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn join(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    body: Option<Json<PasswordQuery>>,
) -> AppResult<StatusCode> {
    let password = body.and_then(|Json(query)| query.password);
    room::join_room(&db_pool, room_id, user.id, password.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn leave(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    room::leave_room(&db_pool, room_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn invite(
    user: CurrentUser,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    room::invite(&db_pool, room_id, user.id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn kick(
    user: CurrentUser,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    room::kick(&db_pool, room_id, user.id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn grant_admin(
    user: CurrentUser,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    room::grant_admin(&db_pool, room_id, user.id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn revoke_admin(
    user: CurrentUser,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    room::revoke_admin(&db_pool, room_id, user.id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_password(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    Json(PasswordQuery { password }): Json<PasswordQuery>,
) -> AppResult<StatusCode> {
    room::set_password(&db_pool, room_id, user.id, password.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(channels): State<RoomChannels>,
) -> AppResult<StatusCode> {
    room::delete_room(&db_pool, room_id, user.id).await?;
    channels.close(room_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Room history, minus what the caller ignores.
#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    user: CurrentUser,
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<RenderedMessage>>> {
    let ignored = users::ignore_list(&db_pool, user.id).await?;

    let mut rendered = Vec::new();
    for message in room::messages(&db_pool, room_id, user.id).await? {
        if !ignored.contains(&message.sender_id) {
            rendered.push(msg::msg_to_html(&db_pool, message).await?);
        }
    }
    Ok(Json(rendered))
}

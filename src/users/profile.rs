use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::CurrentUser, db::User, events::Hub, AppResult, AppState, Reject};

#[derive(Serialize)]
pub(crate) struct Me {
    id: Uuid,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicProfile {
    id: Uuid,
    name: String,
    nickname: Option<String>,
    status: String,
    wins: i64,
    losses: i64,
    ladder_level: i64,
    online: bool,
}

impl PublicProfile {
    async fn of(user: User, hub: &Hub) -> Self {
        PublicProfile {
            online: hub.is_online(user.id).await,
            id: user.id,
            name: user.name,
            nickname: user.nickname,
            status: user.status,
            wins: user.wins,
            losses: user.losses,
            ladder_level: user.ladder_level,
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn me(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Me>> {
    let user = super::find_by_id(&db_pool, user.id).await?;
    Ok(Json(Me { id: user.id, name: user.name }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    _: CurrentUser,
    Path(user_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<PublicProfile>> {
    let user = super::find_by_id(&db_pool, user_id).await?;
    Ok(Json(PublicProfile::of(user, &hub).await))
}

#[derive(Deserialize)]
pub(crate) struct PublicProfileQuery {
    friendname: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn public_profile(
    _: CurrentUser,
    Query(PublicProfileQuery { friendname }): Query<PublicProfileQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<PublicProfile>> {
    let user = super::find_by_name(&db_pool, &friendname)
        .await?
        .ok_or(Reject::NotFound("user"))?;
    Ok(Json(PublicProfile::of(user, &hub).await))
}

#[derive(Deserialize)]
pub(crate) struct CompleteRequest {
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Completeness {
    profile_complete: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn complete(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Json(CompleteRequest { password }): Json<CompleteRequest>,
) -> AppResult<Json<Completeness>> {
    super::complete(&db_pool, user.id, &password).await?;
    Ok(Json(Completeness { profile_complete: true }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn is_complete(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Completeness>> {
    Ok(Json(Completeness {
        profile_complete: super::is_profile_complete(&db_pool, user.id).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    Json(changes): Json<super::UserUpdate>,
) -> AppResult<Json<Me>> {
    let user = super::update(&db_pool, user.id, changes).await?;
    Ok(Json(Me { id: user.id, name: user.name }))
}

#[derive(Serialize)]
pub(crate) struct Friend {
    id: Uuid,
    name: String,
    status: &'static str,
}

#[debug_handler(state = AppState)]
pub(crate) async fn friends(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Vec<Friend>>> {
    let mut friends = Vec::new();
    for friend in super::friends(&db_pool, user.id).await? {
        friends.push(Friend {
            status: if hub.is_online(friend.id).await { "online" } else { "offline" },
            id: friend.id,
            name: friend.name,
        });
    }
    Ok(Json(friends))
}

#[debug_handler(state = AppState)]
pub(crate) async fn ignore(
    user: CurrentUser,
    Path(ignored_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    super::ignore(&db_pool, user.id, ignored_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn unignore(
    user: CurrentUser,
    Path(ignored_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    super::unignore(&db_pool, user.id, ignored_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

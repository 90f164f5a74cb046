use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, AppResult, AppState};

use super::{manage::RoomView, room};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRoomQuery {
    name: String,
    is_public: bool,
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,

    Json(NewRoomQuery { name, is_public, password }): Json<NewRoomQuery>,
) -> AppResult<(StatusCode, Json<RoomView>)> {
    let room = room::create_room(&db_pool, user.id, &name, is_public, password.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(RoomView::load(&db_pool, room).await?)))
}

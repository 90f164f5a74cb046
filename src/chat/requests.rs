use axum::{debug_handler, extract::{Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::CurrentUser, db::ChatMessage, events::Hub, AppResult, AppState};

use super::MessageType;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRequest {
    recipient: String,
    message_type: MessageType,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
pub(crate) struct MessageQuery {
    messageid: Uuid,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Json(NewRequest { recipient, message_type, content }): Json<NewRequest>,
) -> AppResult<(StatusCode, Json<ChatMessage>)> {
    let message = super::create_request(&db_pool, &hub, user.id, &recipient, message_type, &content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn pending(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(super::pending_for(&db_pool, user.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mine(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(super::sent_by(&db_pool, user.id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept(
    user: CurrentUser,
    Query(MessageQuery { messageid }): Query<MessageQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<ChatMessage>> {
    Ok(Json(super::accept(&db_pool, &hub, user.id, messageid).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn decline(
    user: CurrentUser,
    Query(MessageQuery { messageid }): Query<MessageQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<StatusCode> {
    super::decline(&db_pool, user.id, messageid).await?;
    Ok(StatusCode::NO_CONTENT)
}

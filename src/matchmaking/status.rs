use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{auth::CurrentUser, AppResult, AppState, Reject};

use super::{queue::Standing, MatchStatus, Matchmaking};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserStatus {
    in_queue: bool,
    match_status: MatchStatus,
}

fn only_self(user: &CurrentUser, user_id: Uuid) -> AppResult<()> {
    if user.id != user_id {
        return Err(Reject::Forbidden("queue status is private"))?;
    }
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn user_status(
    user: CurrentUser,
    Path(user_id): Path<Uuid>,
    State(matchmaking): State<Matchmaking>,
) -> AppResult<Json<UserStatus>> {
    only_self(&user, user_id)?;

    Ok(Json(UserStatus {
        in_queue: matchmaking.standing(user_id).await == Standing::Waiting,
        match_status: matchmaking.match_status(user_id).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn match_status(
    user: CurrentUser,
    Path(user_id): Path<Uuid>,
    State(matchmaking): State<Matchmaking>,
) -> AppResult<Json<MatchStatus>> {
    only_self(&user, user_id)?;
    Ok(Json(matchmaking.match_status(user_id).await?))
}

mod live;
pub mod session;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, routing::{get, post}, Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::CurrentUser, db::Game, events::{Hub, ServerEvent}, users, AppResult, AppState};

pub use live::LiveGames;
pub use session::Opened;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/challenge/{opponent}", post(challenge))
        .route("/mine", get(my_game))
        .route("/enemy/{name}", get(enemy_game))
        .route("/all", get(all_games))
}

/// Direct challenge. The first call leaves a pending game; only the opponent
/// calling back accepts it, and then the challenger gets `gameReady`.
#[debug_handler(state = AppState)]
async fn challenge(
    user: CurrentUser,
    Path(opponent): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(live): State<LiveGames>,
) -> AppResult<(StatusCode, Json<Game>)> {
    users::find_by_id(&db_pool, opponent).await?;

    match session::open_session(&db_pool, user.id, opponent).await? {
        Opened::Created(game) => Ok((StatusCode::CREATED, Json(game))),
        Opened::Pending(game) => Ok((StatusCode::OK, Json(game))),
        Opened::Joined(game) => {
            live.register(&game).await;
            hub.emit(opponent, ServerEvent::GameReady {
                game_id: game.id,
                message: "The other player has joined. The game is ready to start.".to_owned(),
            }).await;
            Ok((StatusCode::OK, Json(game)))
        }
        Opened::Resumed(game) => {
            live.register(&game).await;
            Ok((StatusCode::OK, Json(game)))
        }
    }
}

#[debug_handler(state = AppState)]
async fn my_game(
    user: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Option<Game>>> {
    Ok(Json(session::get_my_game(&db_pool, user.id).await?))
}

#[debug_handler(state = AppState)]
async fn enemy_game(
    _: CurrentUser,
    Path(name): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Option<Game>>> {
    Ok(Json(session::get_enemy_game(&db_pool, &name).await?))
}

#[debug_handler(state = AppState)]
async fn all_games(
    _: CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<Game>>> {
    Ok(Json(session::get_all_games(&db_pool).await?))
}

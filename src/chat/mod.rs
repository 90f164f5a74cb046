//! Friend requests and direct messages.
//!
//! Both are rows of `chat_messages`; a direct message is stored as an
//! already accepted `system_message`.

mod requests;

use axum::{routing::{get, post}, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::{self, ChatMessage},
    events::{Hub, ServerEvent},
    users, AppResult, AppState, Reject,
};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_ACCEPTED: &str = "accepted";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friendrequest", post(requests::create))
        .route("/pendingrequests", get(requests::pending))
        .route("/myrequests", get(requests::mine))
        .route("/accept", post(requests::accept))
        .route("/decline", post(requests::decline))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    FriendRequest,
    SystemMessage,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::FriendRequest => "friend_request",
            MessageType::SystemMessage => "system_message",
        }
    }
}

async fn insert(
    db_pool: &SqlitePool,
    sender_id: Uuid,
    receiver_id: Uuid,
    message_type: MessageType,
    content: &str,
    status: &str,
) -> AppResult<ChatMessage> {
    let message = ChatMessage {
        id: Uuid::now_v7(),
        sender_id,
        receiver_id,
        message_type: message_type.as_str().to_owned(),
        content: content.to_owned(),
        status: status.to_owned(),
        created_at: db::now(),
    };

    sqlx::query(
        "INSERT INTO chat_messages (id,sender_id,receiver_id,message_type,content,status,created_at)
         VALUES (?,?,?,?,?,?,?)",
    )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(&message.status)
        .bind(message.created_at)
        .execute(db_pool)
        .await?;

    Ok(message)
}

async fn find_message(db_pool: &SqlitePool, message_id: Uuid) -> AppResult<ChatMessage> {
    sqlx::query_as::<_, ChatMessage>("SELECT * FROM chat_messages WHERE id=?")
        .bind(message_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(Reject::NotFound("message").into())
}

/// Handles `POST /chat/friendrequest`; `recipient` is a user name.
pub async fn create_request(
    db_pool: &SqlitePool,
    hub: &Hub,
    sender_id: Uuid,
    recipient: &str,
    message_type: MessageType,
    content: &str,
) -> AppResult<ChatMessage> {
    let receiver = users::find_by_name(db_pool, recipient)
        .await?
        .ok_or(Reject::NotFound("recipient"))?;

    match message_type {
        MessageType::SystemMessage => send_direct(db_pool, hub, sender_id, receiver.id, content).await,
        MessageType::FriendRequest => {
            if receiver.id == sender_id {
                return Err(Reject::BadRequest("cannot befriend yourself"))?;
            }
            if users::are_friends(db_pool, sender_id, receiver.id).await? {
                return Err(Reject::Conflict("already friends"))?;
            }
            if has_pending_request(db_pool, sender_id, receiver.id).await? {
                return Err(Reject::Conflict("friend request already sent"))?;
            }

            let message = insert(db_pool, sender_id, receiver.id, message_type, content, STATUS_PENDING).await?;
            info!("friend request {} from {sender_id} to {}", message.id, receiver.id);

            let sender = users::find_by_id(db_pool, sender_id).await?;
            hub.emit(receiver.id, ServerEvent::FriendRequest {
                message: message.clone(),
                sender_name: sender.name,
            }).await;
            Ok(message)
        }
    }
}

async fn has_pending_request(db_pool: &SqlitePool, sender_id: Uuid, receiver_id: Uuid) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM chat_messages WHERE sender_id=? AND receiver_id=? AND message_type=? AND status=?")
        .bind(sender_id)
        .bind(receiver_id)
        .bind(MessageType::FriendRequest.as_str())
        .bind(STATUS_PENDING)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Persists a direct message and pushes it to the receiver as `receiveMessage`.
pub async fn send_direct(
    db_pool: &SqlitePool,
    hub: &Hub,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: &str,
) -> AppResult<ChatMessage> {
    if sender_id == receiver_id {
        return Err(Reject::BadRequest("cannot message yourself"))?;
    }
    if content.trim().is_empty() {
        return Err(Reject::BadRequest("message is empty"))?;
    }
    users::find_by_id(db_pool, receiver_id).await?;
    if users::ignores(db_pool, receiver_id, sender_id).await? {
        return Err(Reject::Forbidden("recipient ignores you"))?;
    }

    let message = insert(db_pool, sender_id, receiver_id, MessageType::SystemMessage, content, STATUS_ACCEPTED).await?;
    let sender = users::find_by_id(db_pool, sender_id).await?;
    hub.emit(receiver_id, ServerEvent::ReceiveMessage {
        message: message.clone(),
        sender_name: sender.name,
    }).await;
    Ok(message)
}

pub async fn pending_for(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<ChatMessage>> {
    Ok(sqlx::query_as(
        "SELECT * FROM chat_messages WHERE receiver_id=? AND message_type=? AND status=?
         ORDER BY created_at, id",
    )
        .bind(user_id)
        .bind(MessageType::FriendRequest.as_str())
        .bind(STATUS_PENDING)
        .fetch_all(db_pool)
        .await?)
}

pub async fn sent_by(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<ChatMessage>> {
    Ok(sqlx::query_as(
        "SELECT * FROM chat_messages WHERE sender_id=? AND message_type=?
         ORDER BY created_at, id",
    )
        .bind(user_id)
        .bind(MessageType::FriendRequest.as_str())
        .fetch_all(db_pool)
        .await?)
}

async fn pending_request_for(db_pool: &SqlitePool, user_id: Uuid, message_id: Uuid) -> AppResult<ChatMessage> {
    let message = find_message(db_pool, message_id).await?;
    if message.receiver_id != user_id {
        return Err(Reject::Forbidden("only the recipient can answer"))?;
    }
    if message.message_type != MessageType::FriendRequest.as_str() || message.status != STATUS_PENDING {
        return Err(Reject::Conflict("not a pending friend request"))?;
    }
    Ok(message)
}

pub async fn accept(db_pool: &SqlitePool, hub: &Hub, user_id: Uuid, message_id: Uuid) -> AppResult<ChatMessage> {
    let message = pending_request_for(db_pool, user_id, message_id).await?;

    sqlx::query("UPDATE chat_messages SET status=? WHERE id=?")
        .bind(STATUS_ACCEPTED)
        .bind(message_id)
        .execute(db_pool)
        .await?;
    users::add_friendship(db_pool, message.sender_id, message.receiver_id).await?;
    info!("{} and {} are now friends", message.sender_id, message.receiver_id);

    let accepter = users::find_by_id(db_pool, user_id).await?;
    hub.emit(message.sender_id, ServerEvent::FriendAccepted { user_id, name: accepter.name }).await;

    Ok(ChatMessage { status: STATUS_ACCEPTED.to_owned(), ..message })
}

pub async fn decline(db_pool: &SqlitePool, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
    pending_request_for(db_pool, user_id, message_id).await?;

    sqlx::query("DELETE FROM chat_messages WHERE id=?")
        .bind(message_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::db::testing;

    #[tokio::test]
    async fn accepted_request_makes_friends_both_ways() {
        let db_pool = testing::pool().await;
        let hub = Hub::default();
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let (_, mut ada_events, _) = hub.connect(ada).await;
        let (_, mut bob_events, _) = hub.connect(bob).await;

        let request = create_request(&db_pool, &hub, ada, "bob", MessageType::FriendRequest, "hi").await.unwrap();
        assert_eq!(request.status, STATUS_PENDING);
        assert_eq!(
            bob_events.recv().await,
            Some(ServerEvent::FriendRequest { message: request.clone(), sender_name: "ada".to_owned() })
        );

        assert_eq!(pending_for(&db_pool, bob).await.unwrap(), vec![request.clone()]);
        assert_eq!(sent_by(&db_pool, ada).await.unwrap(), vec![request.clone()]);

        let err = accept(&db_pool, &hub, ada, request.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let accepted = accept(&db_pool, &hub, bob, request.id).await.unwrap();
        assert_eq!(accepted.status, STATUS_ACCEPTED);
        assert!(users::are_friends(&db_pool, ada, bob).await.unwrap());
        assert!(users::are_friends(&db_pool, bob, ada).await.unwrap());
        assert_eq!(
            ada_events.recv().await,
            Some(ServerEvent::FriendAccepted { user_id: bob, name: "bob".to_owned() })
        );
        assert!(pending_for(&db_pool, bob).await.unwrap().is_empty());

        let err = create_request(&db_pool, &hub, bob, "ada", MessageType::FriendRequest, "").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn invalid_requests_are_refused() {
        let db_pool = testing::pool().await;
        let hub = Hub::default();
        let ada = testing::user(&db_pool, "ada").await;
        testing::user(&db_pool, "bob").await;

        let err = create_request(&db_pool, &hub, ada, "ada", MessageType::FriendRequest, "").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = create_request(&db_pool, &hub, ada, "nobody", MessageType::FriendRequest, "").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        create_request(&db_pool, &hub, ada, "bob", MessageType::FriendRequest, "").await.unwrap();
        let err = create_request(&db_pool, &hub, ada, "bob", MessageType::FriendRequest, "").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn declined_requests_are_deleted() {
        let db_pool = testing::pool().await;
        let hub = Hub::default();
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;

        let request = create_request(&db_pool, &hub, ada, "bob", MessageType::FriendRequest, "").await.unwrap();
        decline(&db_pool, bob, request.id).await.unwrap();

        assert!(sent_by(&db_pool, ada).await.unwrap().is_empty());
        assert!(!users::are_friends(&db_pool, ada, bob).await.unwrap());

        let err = decline(&db_pool, bob, request.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        // declining frees the pair for a new request
        create_request(&db_pool, &hub, ada, "bob", MessageType::FriendRequest, "again").await.unwrap();
    }

    #[tokio::test]
    async fn direct_messages_respect_the_ignore_list() {
        let db_pool = testing::pool().await;
        let hub = Hub::default();
        let ada = testing::user(&db_pool, "ada").await;
        let bob = testing::user(&db_pool, "bob").await;
        let (_, mut bob_events, _) = hub.connect(bob).await;

        let message = send_direct(&db_pool, &hub, ada, bob, "ping").await.unwrap();
        assert_eq!(message.message_type, "system_message");
        assert_eq!(
            bob_events.recv().await,
            Some(ServerEvent::ReceiveMessage { message, sender_name: "ada".to_owned() })
        );

        users::ignore(&db_pool, bob, ada).await.unwrap();
        let err = create_request(&db_pool, &hub, ada, "bob", MessageType::SystemMessage, "ping").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(bob_events.try_recv().is_err());

        let err = send_direct(&db_pool, &hub, ada, ada, "me").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // direct messages never show up as friend requests
        assert!(pending_for(&db_pool, bob).await.unwrap().is_empty());
    }
}

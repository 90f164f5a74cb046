use pulldown_cmark::{Event, Parser};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{db::RoomMessage, users, AppResult};

use super::room;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageQuery {
    reply_to_id: Option<Uuid>,
    content: String,
}

/// A room message as subscribers see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub reply_to_id: Option<Uuid>,
    pub content: String,
    pub html: String,
    pub sent_at: i64,
}

/// Markdown to HTML. Raw HTML in the source is escaped, never passed through.
pub fn render_markdown(content: &str) -> String {
    let parser = Parser::new(content).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        _ => event,
    });

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

pub(crate) async fn send_msg(
    db_pool: &SqlitePool,
    tx: &broadcast::Sender<RenderedMessage>,

    sender_id: Uuid,
    room_id: Uuid,

    SendMessageQuery { reply_to_id, content }: SendMessageQuery,
) -> AppResult<RenderedMessage> {
    let message = room::post_message(db_pool, room_id, sender_id, reply_to_id, &content).await?;
    let rendered = msg_to_html(db_pool, message).await?;

    // nobody listening is fine
    let _ = tx.send(rendered.clone());
    Ok(rendered)
}

pub(crate) async fn msg_to_html(db_pool: &SqlitePool, message: RoomMessage) -> AppResult<RenderedMessage> {
    let sender_name = users::find_by_id(db_pool, message.sender_id)
        .await
        .map(|user| user.name)
        .unwrap_or_else(|_| "Anonymous".to_owned());

    Ok(RenderedMessage {
        html: render_markdown(&message.content),
        id: message.id,
        room_id: message.room_id,
        sender_id: message.sender_id,
        sender_name,
        reply_to_id: message.reply_to_id,
        content: message.content,
        sent_at: message.sent_at,
    })
}

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::protocol::ServerEvent;

/// User-scoped fan-out. A user is online while at least one socket is attached.
#[derive(Clone, Default)]
pub struct Hub {
    channels: Arc<Mutex<HashMap<Uuid, Vec<(u64, mpsc::UnboundedSender<ServerEvent>)>>>>,
    next_id: Arc<AtomicU64>,
}

/// Handle for one attached socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub user_id: Uuid,
    pub id: u64,
}

impl Hub {
    /// Returns the socket handle, its event stream and whether the user just came online.
    pub async fn connect(&self, user_id: Uuid) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>, bool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut channels = self.channels.lock().await;
        let sockets = channels.entry(user_id).or_default();
        let came_online = sockets.is_empty();
        sockets.push((id, tx));

        (Connection { user_id, id }, rx, came_online)
    }

    /// Returns whether the user went offline.
    pub async fn disconnect(&self, connection: Connection) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(sockets) = channels.get_mut(&connection.user_id) else {
            return false;
        };

        sockets.retain(|(id, _)| *id != connection.id);
        if sockets.is_empty() {
            channels.remove(&connection.user_id);
            true
        } else {
            false
        }
    }

    /// Delivers to every socket of the user. Returns whether any socket took it.
    pub async fn emit(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(sockets) = channels.get_mut(&user_id) else {
            tracing::debug!("dropping {event:?} for offline user {user_id}");
            return false;
        };

        // Dead senders are pruned here, the entry itself goes away in `disconnect`.
        sockets.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        !sockets.is_empty()
    }

    /// Delivers to one socket only, used for replies to that socket's own requests.
    pub async fn reply(&self, connection: Connection, event: ServerEvent) -> bool {
        self.channels
            .lock()
            .await
            .get(&connection.user_id)
            .and_then(|sockets| sockets.iter().find(|(id, _)| *id == connection.id))
            .is_some_and(|(_, tx)| tx.send(event).is_ok())
    }

    pub async fn emit_all(&self, user_ids: &[Uuid], event: ServerEvent) {
        for user_id in user_ids {
            self.emit(*user_id, event.clone()).await;
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.channels
            .lock()
            .await
            .get(&user_id)
            .is_some_and(|sockets| !sockets.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn presence_follows_sockets() {
        let hub = Hub::default();
        let user = Uuid::now_v7();

        let (first, _rx1, came_online) = hub.connect(user).await;
        assert!(came_online);
        let (second, _rx2, came_online) = hub.connect(user).await;
        assert!(!came_online);
        assert!(hub.is_online(user).await);

        assert!(!hub.disconnect(first).await);
        assert!(hub.is_online(user).await);
        assert!(hub.disconnect(second).await);
        assert!(!hub.is_online(user).await);
    }

    #[tokio::test]
    async fn emit_reaches_every_socket_of_the_user() {
        let hub = Hub::default();
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();

        let (_, mut rx1, _) = hub.connect(user).await;
        let (_, mut rx2, _) = hub.connect(user).await;
        let (_, mut rx_other, _) = hub.connect(other).await;

        assert!(hub.emit(user, ServerEvent::RemainInQueue).await);
        assert_eq!(rx1.recv().await, Some(ServerEvent::RemainInQueue));
        assert_eq!(rx2.recv().await, Some(ServerEvent::RemainInQueue));
        assert!(rx_other.try_recv().is_err());

        let (third, mut rx3, _) = hub.connect(user).await;
        assert!(hub.reply(third, ServerEvent::error("nope")).await);
        assert_eq!(rx3.recv().await, Some(ServerEvent::error("nope")));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_to_offline_user_is_dropped() {
        let hub = Hub::default();
        let user = Uuid::now_v7();
        assert!(!hub.emit(user, ServerEvent::LeftQueue).await);

        let (_, rx, _) = hub.connect(user).await;
        drop(rx);
        assert!(!hub.emit(user, ServerEvent::LeftQueue).await);
        assert!(!hub.is_online(user).await);
    }
}

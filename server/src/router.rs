use inkroom_shared::{RoomId, ServerMessage};
use tokio::sync::{mpsc, oneshot};

use crate::error::RelayError;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound};

enum Command {
    Register {
        user_id: String,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<Outbound>,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    Unregister {
        user_id: String,
        connection_id: ConnectionId,
    },
    Join {
        user_id: String,
        connection_id: ConnectionId,
        room_id: RoomId,
    },
    Leave {
        user_id: String,
        connection_id: ConnectionId,
        room_id: RoomId,
    },
    IsCurrent {
        user_id: String,
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        message: ServerMessage,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the task that owns the connection registry. Commands are
/// applied one at a time in the order they were sent.
#[derive(Clone)]
pub struct RoomRouter {
    commands: mpsc::UnboundedSender<Command>,
}

impl RoomRouter {
    pub fn spawn() -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(receiver));
        Self { commands }
    }

    /// Returns the id of the connection this login evicted, if any.
    pub async fn register(
        &self,
        user_id: &str,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Option<ConnectionId>, RelayError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Register {
            user_id: user_id.to_string(),
            connection_id,
            sender,
            reply,
        })?;
        response.await.map_err(|_| RelayError::RouterClosed)
    }

    pub fn unregister(&self, user_id: &str, connection_id: ConnectionId) {
        let _ = self.send(Command::Unregister {
            user_id: user_id.to_string(),
            connection_id,
        });
    }

    pub fn join_room(
        &self,
        user_id: &str,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RelayError> {
        self.send(Command::Join {
            user_id: user_id.to_string(),
            connection_id,
            room_id,
        })
    }

    pub fn leave_room(
        &self,
        user_id: &str,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RelayError> {
        self.send(Command::Leave {
            user_id: user_id.to_string(),
            connection_id,
            room_id,
        })
    }

    /// False once a newer login for `user_id` replaced this connection, or
    /// after it was unregistered.
    pub async fn is_current(
        &self,
        user_id: &str,
        connection_id: ConnectionId,
    ) -> Result<bool, RelayError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::IsCurrent {
            user_id: user_id.to_string(),
            connection_id,
            reply,
        })?;
        response.await.map_err(|_| RelayError::RouterClosed)
    }

    /// Fans `message` out to every member of its room, returning how many
    /// connections accepted it.
    pub async fn broadcast(&self, message: ServerMessage) -> Result<usize, RelayError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Broadcast { message, reply })?;
        response.await.map_err(|_| RelayError::RouterClosed)
    }

    fn send(&self, command: Command) -> Result<(), RelayError> {
        self.commands
            .send(command)
            .map_err(|_| RelayError::RouterClosed)
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry = ConnectionRegistry::new();
    while let Some(command) = commands.recv().await {
        match command {
            Command::Register {
                user_id,
                connection_id,
                sender,
                reply,
            } => {
                let evicted = registry.register(&user_id, connection_id, sender);
                if let Some(previous) = evicted {
                    tracing::info!(user = %user_id, conn = %previous, "evicted by newer login");
                }
                tracing::info!(
                    user = %user_id,
                    conn = %connection_id,
                    connections = registry.len(),
                    "registered"
                );
                let _ = reply.send(evicted);
            }
            Command::Unregister {
                user_id,
                connection_id,
            } => {
                if registry.unregister(&user_id, connection_id) {
                    tracing::info!(
                        user = %user_id,
                        conn = %connection_id,
                        connections = registry.len(),
                        "unregistered"
                    );
                }
            }
            Command::Join {
                user_id,
                connection_id,
                room_id,
            } => {
                tracing::debug!(user = %user_id, room = %room_id, "join room");
                registry.join_room(&user_id, connection_id, room_id);
            }
            Command::Leave {
                user_id,
                connection_id,
                room_id,
            } => {
                tracing::debug!(user = %user_id, room = %room_id, "leave room");
                registry.leave_room(&user_id, connection_id, &room_id);
            }
            Command::IsCurrent {
                user_id,
                connection_id,
                reply,
            } => {
                let _ = reply.send(registry.is_current(&user_id, connection_id));
            }
            Command::Broadcast { message, reply } => {
                let _ = reply.send(fan_out(&registry, message));
            }
        }
    }
}

fn fan_out(registry: &ConnectionRegistry, message: ServerMessage) -> usize {
    let room_id = message.room_id().clone();
    let mut delivered = 0;
    for (user_id, connection) in registry.members(&room_id) {
        if connection
            .sender
            .send(Outbound::Message(message.clone()))
            .is_ok()
        {
            delivered += 1;
        } else {
            let error = RelayError::Delivery {
                connection: connection.id,
                room: room_id.to_string(),
            };
            tracing::warn!(user = %user_id, %error, "peer gone, skipped");
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    async fn connect(
        router: &RoomRouter,
        user_id: &str,
        rooms: &[&str],
    ) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        router.register(user_id, id, tx).await.unwrap();
        for room in rooms {
            router.join_room(user_id, id, RoomId::new(*room)).unwrap();
        }
        rx
    }

    fn shape_event(room: &str) -> ServerMessage {
        ServerMessage::ChatShape {
            room_id: RoomId::new(room),
            user_id: "a".into(),
            shape: json!({"type": "rect", "x": 0, "y": 0, "width": 1, "height": 1}),
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_only_room_members() {
        let router = RoomRouter::spawn();
        let mut members = Vec::new();
        for user in ["a", "b", "c"] {
            members.push(connect(&router, user, &["R"]).await);
        }
        let mut outsider = connect(&router, "d", &["S"]).await;

        let delivered = router.broadcast(shape_event("R")).await.unwrap();
        assert_eq!(delivered, 3);
        for rx in &mut members {
            assert_eq!(rx.try_recv().unwrap(), Outbound::Message(shape_event("R")));
        }
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn newer_login_closes_older_connection() {
        let router = RoomRouter::spawn();
        let mut first = connect(&router, "alice", &["R"]).await;
        let (tx, _second) = mpsc::unbounded_channel();
        let evicted = router.register("alice", Uuid::new_v4(), tx).await.unwrap();
        assert!(evicted.is_some());
        assert_eq!(first.try_recv().unwrap(), Outbound::Evicted);
        // membership belonged to the old connection
        assert_eq!(router.broadcast(shape_event("R")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dead_peer_is_skipped() {
        let router = RoomRouter::spawn();
        let gone = connect(&router, "a", &["R"]).await;
        drop(gone);
        let mut alive = connect(&router, "b", &["R"]).await;
        assert_eq!(router.broadcast(shape_event("R")).await.unwrap(), 1);
        assert!(alive.try_recv().is_ok());
    }

    #[tokio::test]
    async fn leaving_stops_delivery() {
        let router = RoomRouter::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        router.register("a", id, tx).await.unwrap();
        router.join_room("a", id, RoomId::new("R")).unwrap();
        router.leave_room("a", id, RoomId::new("R")).unwrap();
        assert_eq!(router.broadcast(shape_event("R")).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}

//! Chat relay: membership-checked fan-out of lobby chat.
//!
//! [`ChatRelay`] authorizes chat operations against the membership index and
//! forwards messages through the store's pub/sub channels, one channel per
//! lobby, so that every service instance's local subscribers see the same
//! stream. It never touches lobby occupancy and never contends for the
//! allocation lock.
//!
//! The edge layer owns connection lifecycle: it calls
//! [`connect`](ChatRelay::connect) when a client attaches (receiving the
//! event channel to drain into its transport) and
//! [`disconnect`](ChatRelay::disconnect) when the client goes away.
//!
//! Per instance, at most one live store subscription exists per lobby
//! channel: the relay subscribes when the first local connection joins a
//! lobby's chat and drops the subscription when the last one leaves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LobbyConfig;
use crate::error::{LobbyError, Result};
use crate::protocol::{chat_channel, ChatMessage};
use crate::store::LobbyStore;

/// Identifier the relay assigns to each attached connection.
pub type ConnectionId = uuid::Uuid;

/// Outcome of a chat operation.
///
/// Refusals are outcomes, not errors: the caller was told why (via a system
/// notice on their own event channel) and nothing was published or mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The connection joined the lobby's chat group.
    Joined,
    /// The connection left the lobby's chat group.
    Left,
    /// The message was published to the lobby's channel.
    Sent,
    /// The caller is not a member of the lobby they named. No publish, no
    /// mutation; only the caller was notified.
    Unauthorized,
    /// An input was empty. Nothing happened.
    InvalidInput,
}

impl ChatOutcome {
    /// Returns `true` if the operation was refused.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::InvalidInput)
    }
}

/// Transport-local relay state.
struct RelayState {
    /// Every attached connection's event channel.
    connections: HashMap<ConnectionId, mpsc::Sender<ChatMessage>>,
    /// Per-lobby broadcast groups.
    groups: HashMap<String, HashSet<ConnectionId>>,
    /// Per-lobby pump tasks draining the store subscription.
    pumps: HashMap<String, JoinHandle<()>>,
}

struct RelayInner {
    store: Arc<dyn LobbyStore>,
    channel_capacity: usize,
    state: Mutex<RelayState>,
}

/// Validates chat senders against the membership index and fans messages
/// out to the right lobby's subscribers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lobby_core::{ChatRelay, LobbyConfig, LobbyService};
/// use lobby_core::stores::MemoryStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> lobby_core::Result<()> {
/// let store = Arc::new(MemoryStore::new());
/// let config = LobbyConfig::new(8, 100);
/// let service = LobbyService::new(store.clone(), config.clone());
/// let relay = ChatRelay::new(store, &config);
///
/// let joined = service.join_lobby("alice", None).await?;
/// let lobby_id = joined.lobby_id.unwrap_or_default();
///
/// let (conn, mut events) = relay.connect().await;
/// relay.join_chat(conn, &lobby_id, "alice").await?;
/// relay.send_message(conn, &lobby_id, "alice", "hello").await?;
/// # let _ = events.recv().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatRelay {
    inner: Arc<RelayInner>,
}

impl ChatRelay {
    /// Create a relay over the given store.
    pub fn new(store: Arc<dyn LobbyStore>, config: &LobbyConfig) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                store,
                channel_capacity: config.chat_channel_capacity.max(1),
                state: Mutex::new(RelayState {
                    connections: HashMap::new(),
                    groups: HashMap::new(),
                    pumps: HashMap::new(),
                }),
            }),
        }
    }

    /// Attach a client connection.
    ///
    /// Returns the connection's id and the receiver the edge layer drains
    /// into its transport. When the receiver falls behind its bounded
    /// capacity, messages to that connection are dropped with a warning.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ChatMessage>) {
        let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);
        let connection_id = ConnectionId::new_v4();
        let mut state = self.inner.state.lock().await;
        state.connections.insert(connection_id, sender);
        debug!(connection_id = %connection_id, "chat connection attached");
        (connection_id, receiver)
    }

    /// Detach a client connection, removing it from every chat group.
    ///
    /// No "left chat" notice is published; that is
    /// [`leave_chat`](Self::leave_chat)'s job, for edges that want it.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut state = self.inner.state.lock().await;
        state.connections.remove(&connection_id);

        let mut emptied = Vec::new();
        for (lobby_id, group) in &mut state.groups {
            group.remove(&connection_id);
            if group.is_empty() {
                emptied.push(lobby_id.clone());
            }
        }
        for lobby_id in emptied {
            state.groups.remove(&lobby_id);
            if let Some(pump) = state.pumps.remove(&lobby_id) {
                pump.abort();
            }
            debug!(lobby_id = %lobby_id, "last local member gone, dropped chat subscription");
        }
        debug!(connection_id = %connection_id, "chat connection detached");
    }

    /// Join a lobby's chat group.
    ///
    /// On success the connection starts receiving that lobby's messages and
    /// a system "joined the chat" notice is published to all members.
    ///
    /// # Errors
    ///
    /// [`LobbyError::UnknownConnection`] if `connection_id` was never
    /// attached; store/serialization errors from the subscribe or publish.
    pub async fn join_chat(
        &self,
        connection_id: ConnectionId,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<ChatOutcome> {
        if is_blank(lobby_id) || is_blank(player_id) {
            warn!(lobby_id = %lobby_id, player_id = %player_id, "join chat refused: empty input");
            return Ok(ChatOutcome::InvalidInput);
        }
        let caller = self.connection_sender(connection_id).await?;
        if !self
            .authorize(player_id, lobby_id, &caller, "join chat for")
            .await?
        {
            return Ok(ChatOutcome::Unauthorized);
        }

        let channel = chat_channel(lobby_id);
        {
            let mut state = self.inner.state.lock().await;
            if !state.groups.contains_key(lobby_id) {
                // First local member: one subscription per channel per
                // instance, owned by the pump task below.
                let receiver = self.inner.store.subscribe(&channel).await?;
                state.groups.insert(lobby_id.to_string(), HashSet::new());
                state.pumps.insert(
                    lobby_id.to_string(),
                    spawn_pump(Arc::clone(&self.inner), lobby_id.to_string(), receiver),
                );
            }
            if let Some(group) = state.groups.get_mut(lobby_id) {
                group.insert(connection_id);
            }
        }
        info!(player_id = %player_id, lobby_id = %lobby_id, "player joined lobby chat");

        let notice = ChatMessage::system(format!("{player_id} has joined the chat."));
        self.publish_message(&channel, &notice).await?;
        Ok(ChatOutcome::Joined)
    }

    /// Leave a lobby's chat group.
    ///
    /// On success a system "left the chat" notice is published to the
    /// remaining members. Leaving chat does not leave the lobby itself.
    ///
    /// # Errors
    ///
    /// Same conditions as [`join_chat`](Self::join_chat).
    pub async fn leave_chat(
        &self,
        connection_id: ConnectionId,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<ChatOutcome> {
        if is_blank(lobby_id) || is_blank(player_id) {
            warn!(lobby_id = %lobby_id, player_id = %player_id, "leave chat refused: empty input");
            return Ok(ChatOutcome::InvalidInput);
        }
        let caller = self.connection_sender(connection_id).await?;
        if !self
            .authorize(player_id, lobby_id, &caller, "leave chat for")
            .await?
        {
            return Ok(ChatOutcome::Unauthorized);
        }

        {
            let mut state = self.inner.state.lock().await;
            let now_empty = match state.groups.get_mut(lobby_id) {
                Some(group) => {
                    group.remove(&connection_id);
                    group.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.groups.remove(lobby_id);
                if let Some(pump) = state.pumps.remove(lobby_id) {
                    pump.abort();
                }
                debug!(lobby_id = %lobby_id, "last local member left, dropped chat subscription");
            }
        }
        info!(player_id = %player_id, lobby_id = %lobby_id, "player left lobby chat");

        let notice = ChatMessage::system(format!("{player_id} has left the chat."));
        self.publish_message(&chat_channel(lobby_id), &notice).await?;
        Ok(ChatOutcome::Left)
    }

    /// Publish a chat message to a lobby.
    ///
    /// Every current subscriber of the lobby's channel — across all service
    /// instances — receives it, including the sender's own connection.
    ///
    /// # Errors
    ///
    /// Same conditions as [`join_chat`](Self::join_chat).
    pub async fn send_message(
        &self,
        connection_id: ConnectionId,
        lobby_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatOutcome> {
        if is_blank(lobby_id) || is_blank(sender_id) || is_blank(content) {
            warn!(lobby_id = %lobby_id, sender_id = %sender_id, "send refused: empty input");
            return Ok(ChatOutcome::InvalidInput);
        }
        let caller = self.connection_sender(connection_id).await?;
        if !self
            .authorize(sender_id, lobby_id, &caller, "send messages to")
            .await?
        {
            return Ok(ChatOutcome::Unauthorized);
        }

        let message = ChatMessage::new(sender_id, content);
        self.publish_message(&chat_channel(lobby_id), &message)
            .await?;
        Ok(ChatOutcome::Sent)
    }

    /// Look up the caller's event channel.
    async fn connection_sender(
        &self,
        connection_id: ConnectionId,
    ) -> Result<mpsc::Sender<ChatMessage>> {
        let state = self.inner.state.lock().await;
        state
            .connections
            .get(&connection_id)
            .cloned()
            .ok_or(LobbyError::UnknownConnection(connection_id))
    }

    /// Check the membership index against the claimed lobby. On mismatch,
    /// notify the caller alone and return `false`.
    async fn authorize(
        &self,
        player_id: &str,
        claimed_lobby_id: &str,
        caller: &mpsc::Sender<ChatMessage>,
        action: &str,
    ) -> Result<bool> {
        let actual = self.inner.store.player_lobby(player_id).await?;
        if actual.as_deref() == Some(claimed_lobby_id) {
            return Ok(true);
        }
        warn!(
            player_id = %player_id,
            claimed_lobby_id = %claimed_lobby_id,
            actual_lobby_id = %actual.as_deref().unwrap_or("None"),
            "chat operation refused: player is not a member of the claimed lobby"
        );
        let refusal = ChatMessage::system(format!(
            "You are not authorized to {action} lobby {claimed_lobby_id}."
        ));
        if caller.try_send(refusal).is_err() {
            warn!(player_id = %player_id, "could not deliver refusal notice to caller");
        }
        Ok(false)
    }

    async fn publish_message(&self, channel: &str, message: &ChatMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.inner.store.publish(channel, &payload).await
    }
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("channel_capacity", &self.inner.channel_capacity)
            .finish_non_exhaustive()
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Drain one lobby channel's subscription into the local group.
fn spawn_pump(
    inner: Arc<RelayInner>,
    lobby_id: String,
    mut receiver: mpsc::Receiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = receiver.recv().await {
            let message: ChatMessage = match serde_json::from_str(&payload) {
                Ok(message) => message,
                Err(error) => {
                    warn!(lobby_id = %lobby_id, error = %error, "discarding malformed chat payload");
                    continue;
                }
            };
            let members: Vec<mpsc::Sender<ChatMessage>> = {
                let state = inner.state.lock().await;
                match state.groups.get(&lobby_id) {
                    Some(group) => group
                        .iter()
                        .filter_map(|id| state.connections.get(id).cloned())
                        .collect(),
                    None => Vec::new(),
                }
            };
            for member in members {
                // Bounded per-connection channel: a lagging consumer loses
                // this message rather than stalling the whole group.
                if member.try_send(message.clone()).is_err() {
                    warn!(lobby_id = %lobby_id, "chat connection lagging or gone, dropping message");
                }
            }
        }
        debug!(lobby_id = %lobby_id, "chat pump stopped");
    })
}

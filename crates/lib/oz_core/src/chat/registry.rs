//! Broadcast groups keyed by chat session.
//!
//! Every admitted connection owns a bounded outbound queue. Join, leave and
//! fan-out all run under the DashMap shard lock of the session key, so a
//! payload is never delivered to a connection after it has left and the
//! member set cannot change while a fan-out is in progress.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound queue depth per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Identifies one live connection inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type Group = HashMap<ConnectionId, mpsc::Sender<String>>;

/// Session-id → member queues.
pub struct BroadcastRegistry {
    groups: DashMap<Uuid, Group>,
    capacity: usize,
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl BroadcastRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a new connection to `session_id`'s group.
    ///
    /// The returned receiver yields every payload broadcast to the group until
    /// the [`Membership`] is dropped or the member is evicted.
    pub fn join(self: &Arc<Self>, session_id: Uuid) -> (Membership, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let connection_id = ConnectionId::new();
        self.groups
            .entry(session_id)
            .or_default()
            .insert(connection_id, tx);
        debug!(%session_id, %connection_id, "joined broadcast group");

        let membership = Membership {
            registry: Arc::clone(self),
            session_id,
            connection_id,
        };
        (membership, rx)
    }

    /// Deliver `payload` to every member of `session_id`'s group.
    ///
    /// Members whose queue is full or closed are evicted. Returns the number
    /// of members the payload was queued for.
    pub fn broadcast(&self, session_id: Uuid, payload: &str) -> usize {
        let Some(mut group) = self.groups.get_mut(&session_id) else {
            return 0;
        };
        let mut delivered = 0;
        group.retain(|connection_id, tx| match tx.try_send(payload.to_owned()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%session_id, %connection_id, "evicting slow consumer");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%session_id, %connection_id, "dropping closed member");
                false
            }
        });
        delivered
    }

    /// Number of members currently in `session_id`'s group.
    pub fn member_count(&self, session_id: Uuid) -> usize {
        self.groups.get(&session_id).map_or(0, |g| g.len())
    }

    fn leave(&self, session_id: Uuid, connection_id: ConnectionId) {
        if let Some(mut group) = self.groups.get_mut(&session_id) {
            group.remove(&connection_id);
        }
        self.groups.remove_if(&session_id, |_, group| group.is_empty());
        debug!(%session_id, %connection_id, "left broadcast group");
    }
}

/// Group membership of one connection. Dropping it leaves the group.
pub struct Membership {
    registry: Arc<BroadcastRegistry>,
    session_id: Uuid,
    connection_id: ConnectionId,
}

impl Membership {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.registry.leave(self.session_id, self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let registry = Arc::new(BroadcastRegistry::default());
        let session = Uuid::new_v4();
        let (_a, mut rx_a) = registry.join(session);
        let (_b, mut rx_b) = registry.join(session);
        let (_other, mut rx_other) = registry.join(Uuid::new_v4());

        assert_eq!(registry.broadcast(session, "hi"), 2);
        assert_eq!(rx_a.recv().await.as_deref(), Some("hi"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("hi"));
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_membership_leaves_the_group() {
        let registry = Arc::new(BroadcastRegistry::default());
        let session = Uuid::new_v4();
        let (a, _rx_a) = registry.join(session);
        let (b, _rx_b) = registry.join(session);
        assert_eq!(registry.member_count(session), 2);

        drop(a);
        assert_eq!(registry.member_count(session), 1);
        drop(b);
        assert_eq!(registry.member_count(session), 0);
        assert!(registry.groups.is_empty());
        assert_eq!(registry.broadcast(session, "nobody"), 0);
    }

    #[tokio::test]
    async fn full_queue_evicts_the_member() {
        let registry = Arc::new(BroadcastRegistry::new(1));
        let session = Uuid::new_v4();
        let (_slow, mut rx_slow) = registry.join(session);

        assert_eq!(registry.broadcast(session, "one"), 1);
        assert_eq!(registry.broadcast(session, "two"), 0);
        assert_eq!(registry.member_count(session), 0);

        // The queued payload is still readable, then the channel reports closed.
        assert_eq!(rx_slow.recv().await.as_deref(), Some("one"));
        assert_eq!(rx_slow.recv().await, None);
    }
}

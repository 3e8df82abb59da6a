//! Connection Registry
//!
//! Shared record of which connections have joined and which display names are
//! online. Both collections live behind a single mutex so that every join,
//! leave, eviction and snapshot observes them in a consistent state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::connection::{ConnectionId, MessageSink};
use super::error::HubError;

/// A joined connection as seen by the broadcaster
#[derive(Clone)]
pub struct Recipient {
    pub id: ConnectionId,
    pub name: String,
    pub sink: Arc<dyn MessageSink>,
}

struct Member {
    name: String,
    sink: Arc<dyn MessageSink>,
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    /// Joined connections: ConnectionId → Member
    connections: HashMap<ConnectionId, Member>,
    /// Online names: name → number of connections using it
    online: BTreeMap<String, usize>,
    next_seq: u64,
}

impl RegistryState {
    fn remove(&mut self, id: &ConnectionId) -> Option<String> {
        let member = self.connections.remove(id)?;

        if let Some(count) = self.online.get_mut(&member.name) {
            *count -= 1;
            if *count == 0 {
                self.online.remove(&member.name);
            }
        }

        Some(member.name)
    }

    fn presence(&self) -> Vec<String> {
        self.online.keys().cloned().collect()
    }
}

/// Registry of joined connections and online display names
pub struct Registry {
    state: Mutex<RegistryState>,
    max_connections: usize,
}

impl Registry {
    /// Create an empty registry admitting at most `max_connections` members
    pub fn new(max_connections: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_connections,
        }
    }

    /// Register a connection under `name`
    ///
    /// Returns the online names as they stand right after the insertion.
    pub async fn join(
        &self,
        id: ConnectionId,
        name: &str,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Vec<String>, HubError> {
        let mut state = self.state.lock().await;

        if state.connections.contains_key(&id) {
            return Err(HubError::AlreadyJoined);
        }
        if state.connections.len() >= self.max_connections {
            return Err(HubError::TooManyConnections(self.max_connections));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.connections.insert(
            id,
            Member {
                name: name.to_string(),
                sink,
                seq,
            },
        );
        *state.online.entry(name.to_string()).or_insert(0) += 1;

        tracing::debug!(
            connection_id = %id,
            name = %name,
            connections = state.connections.len(),
            "Connection registered"
        );

        Ok(state.presence())
    }

    /// Remove a connection after its session ended
    ///
    /// Returns the removed name and the online names after removal, or `None`
    /// if the connection was not registered (for example, already evicted).
    pub async fn leave(&self, id: &ConnectionId) -> Option<(String, Vec<String>)> {
        let mut state = self.state.lock().await;
        let name = state.remove(id)?;

        tracing::debug!(
            connection_id = %id,
            name = %name,
            connections = state.connections.len(),
            "Connection unregistered"
        );

        Some((name, state.presence()))
    }

    /// Remove a connection that could not be reached during fan-out
    pub async fn evict(&self, id: &ConnectionId) -> Option<String> {
        let mut state = self.state.lock().await;
        state.remove(id)
    }

    /// All joined connections, in join order
    pub async fn snapshot(&self) -> Vec<Recipient> {
        let state = self.state.lock().await;

        let mut members: Vec<_> = state.connections.iter().collect();
        members.sort_by_key(|(_, member)| member.seq);

        members
            .into_iter()
            .map(|(id, member)| Recipient {
                id: *id,
                name: member.name.clone(),
                sink: Arc::clone(&member.sink),
            })
            .collect()
    }

    /// Names currently online
    pub async fn online_users(&self) -> Vec<String> {
        self.state.lock().await.presence()
    }

    /// Number of joined connections
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Number of distinct names online
    pub async fn online_count(&self) -> usize {
        self.state.lock().await.online.len()
    }

    #[cfg(test)]
    async fn assert_consistent(&self) {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for member in state.connections.values() {
            *counts.entry(member.name.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts, state.online);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::connection::testing::ChannelSink;

    fn sink() -> Arc<dyn MessageSink> {
        let (sink, _rx) = ChannelSink::new();
        sink
    }

    #[tokio::test]
    async fn test_join_returns_snapshot_including_self() {
        let registry = Registry::new(10);

        let users = registry.join(ConnectionId::new(), "Alice", sink()).await.unwrap();
        assert_eq!(users, vec!["Alice"]);

        let users = registry.join(ConnectionId::new(), "Bob", sink()).await.unwrap();
        assert_eq!(users, vec!["Alice", "Bob"]);

        assert_eq!(registry.connection_count().await, 2);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_leave_returns_name_and_remaining() {
        let registry = Registry::new(10);
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();

        registry.join(alice, "Alice", sink()).await.unwrap();
        registry.join(bob, "Bob", sink()).await.unwrap();

        let (name, users) = registry.leave(&alice).await.unwrap();
        assert_eq!(name, "Alice");
        assert_eq!(users, vec!["Bob"]);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_leave_absent_is_noop() {
        let registry = Registry::new(10);
        let id = ConnectionId::new();

        assert!(registry.leave(&id).await.is_none());

        registry.join(id, "Alice", sink()).await.unwrap();
        assert!(registry.leave(&id).await.is_some());
        assert!(registry.leave(&id).await.is_none());
        assert!(registry.evict(&id).await.is_none());
        assert_eq!(registry.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_same_name_counted_per_connection() {
        let registry = Registry::new(10);
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        registry.join(first, "Alice", sink()).await.unwrap();
        let users = registry.join(second, "Alice", sink()).await.unwrap();
        assert_eq!(users, vec!["Alice"]);

        let (_, users) = registry.leave(&first).await.unwrap();
        assert_eq!(users, vec!["Alice"]);

        let (_, users) = registry.leave(&second).await.unwrap();
        assert!(users.is_empty());
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let registry = Registry::new(1);

        registry.join(ConnectionId::new(), "Alice", sink()).await.unwrap();
        let result = registry.join(ConnectionId::new(), "Bob", sink()).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(1))));
        assert_eq!(registry.online_users().await, vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_double_join_rejected() {
        let registry = Registry::new(10);
        let id = ConnectionId::new();

        registry.join(id, "Alice", sink()).await.unwrap();
        let result = registry.join(id, "Alicia", sink()).await;

        assert!(matches!(result, Err(HubError::AlreadyJoined)));
        assert_eq!(registry.online_users().await, vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_snapshot_in_join_order() {
        let registry = Registry::new(10);
        let ids: Vec<_> = (0..5).map(|_| ConnectionId::new()).collect();

        for (i, id) in ids.iter().enumerate() {
            registry.join(*id, &format!("user{}", i), sink()).await.unwrap();
        }

        let snapshot = registry.snapshot().await;
        let names: Vec<_> = snapshot.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["user0", "user1", "user2", "user3", "user4"]);
        let snapshot_ids: Vec<_> = snapshot.iter().map(|r| r.id).collect();
        assert_eq!(snapshot_ids, ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_churn_keeps_invariant() {
        let registry = Arc::new(Registry::new(1000));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                // A few shared names so collisions happen
                let name = format!("user{}", i % 5);
                for _ in 0..20 {
                    let id = ConnectionId::new();
                    let users = registry.join(id, &name, sink()).await.unwrap();
                    assert!(users.contains(&name));
                    registry.assert_consistent().await;
                    registry.leave(&id).await.unwrap();
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        registry.assert_consistent().await;
        assert_eq!(registry.connection_count().await, 0);
        assert!(registry.online_users().await.is_empty());
    }
}

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Mutex;

use crate::{
    connection::{Connection, ConnectionId},
    error::RegistryError,
};

/// One named participant: the connection it writes to and its display name.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub connection: Arc<Connection>,
    pub name: String,
}

/// Table of everyone currently in the chat.
///
/// Every operation holds the lock only for a single map operation; callers
/// that need to write to sockets take a [`snapshot`](Self::snapshot) first.
/// Ids come from a monotonic counter, so a removed connection can never be
/// confused with a later one.
pub struct ConnectionRegistry {
    entries: Mutex<BTreeMap<ConnectionId, RegistryEntry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn insert(
        &self,
        connection: Arc<Connection>,
        name: String,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        let id = connection.id();
        if entries.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        entries.insert(id, RegistryEntry { connection, name });
        Ok(())
    }

    /// Removes the entry for `id` and returns its name.
    ///
    /// Returns `None` when the entry is already gone, so only the first of
    /// several racing removers gets to announce the departure.
    pub async fn remove(&self, id: ConnectionId) -> Option<String> {
        let mut entries = self.entries.lock().await;
        entries.remove(&id).map(|entry| entry.name)
    }

    /// Point-in-time copy of all entries, ordered by arrival.
    pub async fn snapshot(&self) -> Vec<RegistryEntry> {
        let entries = self.entries.lock().await;
        entries.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().await.contains_key(&id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(registry: &ConnectionRegistry) -> Arc<Connection> {
        let (writer, _reader) = tokio::io::duplex(64);
        Arc::new(Connection::new(registry.next_id(), None, writer))
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_connection() {
        let registry = ConnectionRegistry::new();
        let alice = connection(&registry);

        registry
            .insert(Arc::clone(&alice), "alice".into())
            .await
            .expect("first insert should pass");
        let result = registry.insert(Arc::clone(&alice), "alice".into()).await;

        assert_eq!(result, Err(RegistryError::AlreadyRegistered(alice.id())));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn names_are_not_identity() {
        let registry = ConnectionRegistry::new();
        registry
            .insert(connection(&registry), "sam".into())
            .await
            .expect("first sam");
        registry
            .insert(connection(&registry), "sam".into())
            .await
            .expect("second sam");

        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let bob = connection(&registry);
        registry
            .insert(Arc::clone(&bob), "bob".into())
            .await
            .expect("insert");

        assert_eq!(registry.remove(bob.id()).await.as_deref(), Some("bob"));
        assert_eq!(registry.remove(bob.id()).await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_and_detached() {
        let registry = ConnectionRegistry::new();
        let first = connection(&registry);
        let second = connection(&registry);
        registry
            .insert(Arc::clone(&second), "second".into())
            .await
            .expect("insert second");
        registry
            .insert(Arc::clone(&first), "first".into())
            .await
            .expect("insert first");

        let snapshot = registry.snapshot().await;
        registry.remove(first.id()).await;

        let names: Vec<_> = snapshot.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(registry.len().await, 1);
        assert!(!registry.contains(first.id()).await);
    }

    #[tokio::test]
    async fn concurrent_inserts_and_removes_stay_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for index in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let conn = connection(&registry);
                registry
                    .insert(Arc::clone(&conn), format!("user-{index}"))
                    .await
                    .expect("insert");
                if index % 2 == 0 {
                    registry.remove(conn.id()).await;
                    registry.remove(conn.id()).await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 16);
        assert_eq!(registry.len().await, snapshot.len());
    }
}

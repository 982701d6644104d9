use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use payrelay_core::ids::ConnectionId;

use crate::connection::Connection;

/// Concurrency-safe multimap from an order identifier to the set of
/// live connections listening for its outcome.
///
/// One lock guards the whole map: mutations are serialized, snapshots
/// are consistent, and a group that drains to zero members is removed
/// on the spot so `count` stays O(1) and accurate. Network I/O never
/// happens under the lock — callers fan out over a `snapshot`.
#[derive(Default)]
pub struct ConnectionRegistry {
    groups: RwLock<HashMap<String, HashMap<ConnectionId, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the group for `key`, creating the group if
    /// absent. Registering the same pair twice is a no-op (set
    /// semantics).
    pub fn register(&self, key: &str, conn: Arc<Connection>) {
        let mut groups = self.groups.write();
        groups
            .entry(key.to_owned())
            .or_default()
            .insert(conn.id().clone(), conn);
    }

    /// Remove a connection from the group for `key`, dropping the group
    /// entirely once empty. A no-op if the pair is absent — the
    /// connection may already have been removed by the other of the
    /// close/error notifications.
    pub fn unregister(&self, key: &str, id: &ConnectionId) {
        let mut groups = self.groups.write();
        if let Some(group) = groups.get_mut(key) {
            group.remove(id);
            if group.is_empty() {
                groups.remove(key);
            }
        }
    }

    /// Number of currently registered connections for `key`.
    pub fn count(&self, key: &str) -> usize {
        self.groups.read().get(key).map_or(0, HashMap::len)
    }

    /// Point-in-time copy of the group for `key`. The returned handles
    /// are non-owning back-references; iterating them cannot block
    /// registry mutations.
    pub fn snapshot(&self, key: &str) -> Vec<Arc<Connection>> {
        self.groups
            .read()
            .get(key)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total connections across all groups.
    pub fn total(&self) -> usize {
        self.groups.read().values().map(HashMap::len).sum()
    }

    /// Number of distinct keys with at least one listener.
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Drop connections whose peers stopped answering pings. Returns
    /// how many were removed.
    pub fn sweep_dead(&self, timeout: Duration) -> usize {
        let stale: Vec<(String, ConnectionId)> = {
            let groups = self.groups.read();
            groups
                .iter()
                .flat_map(|(key, group)| {
                    group
                        .values()
                        .filter(|conn| !conn.is_open() || !conn.is_alive(timeout))
                        .map(|conn| (key.clone(), conn.id().clone()))
                })
                .collect()
        };

        for (key, id) in &stale {
            tracing::info!(client_key = %key, connection_id = %id, "sweeping dead connection");
            self.unregister(key, id);
        }
        stale.len()
    }
}

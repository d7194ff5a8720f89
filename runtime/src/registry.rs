//! Connection registry.
//!
//! Maps each identity to the live connections it owns. `register` and
//! `unregister` are the only mutation entry points and are serialized by one
//! write lock, so readers always see a whole handle set for an identity.
//!
//! The registry does not detect dead connections. A session must unregister
//! its own handle on every teardown path.
//!
//! # Example
//!
//! ```
//! use rentwise_runtime::registry::{ConnectionHandle, ConnectionRegistry};
//! use rentwise_core::{Identity, UserId, UserRole};
//!
//! # async fn example() {
//! let registry = ConnectionRegistry::new();
//! let identity = Identity::new(UserId::new("E1"), UserRole::Employee);
//!
//! let (handle, _outbound) = ConnectionHandle::channel(16);
//! let connection_id = handle.id();
//! assert_eq!(registry.register(&identity, handle).await, 1);
//!
//! assert_eq!(registry.unregister(&identity.id, connection_id).await, 0);
//! assert!(!registry.is_registered(&identity.id).await);
//! # }
//! ```

use crate::metrics::NotificationMetrics;
use crate::role_cache::RoleCache;
use rentwise_core::{Identity, Notification, UserId, UserRole};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One live duplex channel, bound to exactly one identity.
///
/// The handle is the sending half; the session owns the receiving half and
/// forwards what it receives to the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    sender: mpsc::Sender<Notification>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its session drains.
    ///
    /// `buffer` bounds how many notifications may queue before sends start
    /// waiting.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, sender }, receiver)
    }

    /// Process-unique connection id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the session has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) async fn deliver(
        &self,
        message: Notification,
        timeout: Duration,
    ) -> Result<(), SendTimeoutError<Notification>> {
        self.sender.send_timeout(message, timeout).await
    }
}

/// Identity to connection-set mapping, plus the role cache it maintains.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, Vec<ConnectionHandle>>>,
    roles: RoleCache,
    total: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to `identity`'s connection set and cache its role.
    ///
    /// Returns the identity's handle count after registration.
    pub async fn register(&self, identity: &Identity, handle: ConnectionHandle) -> usize {
        let connection_id = handle.id();
        let mut connections = self.connections.write().await;
        let handles = connections.entry(identity.id.clone()).or_default();
        handles.push(handle);
        let count = handles.len();
        self.roles.insert(identity.id.clone(), identity.role).await;
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        drop(connections);

        NotificationMetrics::set_active_connections(total);
        tracing::info!(
            identity = %identity.id,
            role = %identity.role,
            connection_id,
            handles = count,
            "Connection registered"
        );
        count
    }

    /// Remove one handle. When it was the identity's last, the identity entry
    /// and its cached role are removed too.
    ///
    /// Returns the identity's remaining handle count. Unknown ids are a no-op.
    pub async fn unregister(&self, user_id: &UserId, connection_id: u64) -> usize {
        let mut connections = self.connections.write().await;
        let Some(handles) = connections.get_mut(user_id) else {
            return 0;
        };

        let before = handles.len();
        handles.retain(|handle| handle.id() != connection_id);
        let removed = before - handles.len();
        let remaining = handles.len();
        if remaining == 0 {
            connections.remove(user_id);
            self.roles.invalidate(user_id).await;
        }
        let total = self.total.fetch_sub(removed, Ordering::SeqCst) - removed;
        drop(connections);

        if removed > 0 {
            NotificationMetrics::set_active_connections(total);
            tracing::info!(
                identity = %user_id,
                connection_id,
                handles = remaining,
                "Connection unregistered"
            );
        }
        remaining
    }

    /// Snapshot of one identity's handles.
    pub async fn handles_for(&self, user_id: &UserId) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every registered identity and its handles.
    ///
    /// Taken under the read lock and returned by value so no lock is held
    /// while delivering.
    pub async fn snapshot(&self) -> Vec<(UserId, Vec<ConnectionHandle>)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(user_id, handles)| (user_id.clone(), handles.clone()))
            .collect()
    }

    /// Snapshot of the identities whose cached role is `role`, with their
    /// handles.
    ///
    /// Roles are only written under the connection write lock, so reading
    /// them once while holding the read lock yields one consistent view.
    /// Identities without a cached role are skipped.
    pub async fn snapshot_for_role(&self, role: UserRole) -> Vec<(UserId, Vec<ConnectionHandle>)> {
        let connections = self.connections.read().await;
        let roles = self.roles.snapshot().await;
        connections
            .iter()
            .filter(|(user_id, _)| match roles.get(*user_id) {
                Some(cached) => *cached == role,
                None => {
                    tracing::debug!(identity = %user_id, "No cached role, skipping");
                    false
                },
            })
            .map(|(user_id, handles)| (user_id.clone(), handles.clone()))
            .collect()
    }

    /// Whether `user_id` has at least one registered handle.
    pub async fn is_registered(&self, user_id: &UserId) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Number of registered identities.
    pub async fn identity_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of registered handles across all identities.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// The role cache this registry maintains.
    #[must_use]
    pub const fn roles(&self) -> &RoleCache {
        &self.roles
    }
}

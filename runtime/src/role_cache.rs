//! Identity to role cache.
//!
//! Populated when an identity registers its first connection and invalidated
//! when its last connection goes away, so role-filtered broadcasts never query
//! the store. Only the [`ConnectionRegistry`](crate::registry::ConnectionRegistry)
//! writes to it.

use rentwise_core::{UserId, UserRole};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Roles of currently connected identities.
#[derive(Debug, Default)]
pub struct RoleCache {
    roles: RwLock<HashMap<UserId, UserRole>>,
}

impl RoleCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached role of `user_id`, if connected.
    pub async fn get(&self, user_id: &UserId) -> Option<UserRole> {
        self.roles.read().await.get(user_id).copied()
    }

    /// Copy of every cached role, read under one lock acquisition.
    pub async fn snapshot(&self) -> HashMap<UserId, UserRole> {
        self.roles.read().await.clone()
    }

    /// Number of cached identities.
    pub async fn len(&self) -> usize {
        self.roles.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.roles.read().await.is_empty()
    }

    pub(crate) async fn insert(&self, user_id: UserId, role: UserRole) {
        self.roles.write().await.insert(user_id, role);
    }

    pub(crate) async fn invalidate(&self, user_id: &UserId) {
        self.roles.write().await.remove(user_id);
    }
}

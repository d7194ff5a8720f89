//! Notification fan-out.
//!
//! Deliveries go to registry snapshots, never under the registry lock. Each
//! handle gets its own bounded send, and all sends of one fan-out run
//! concurrently, so a slow or dead connection costs at most one timeout and
//! never affects its siblings.

use crate::metrics::NotificationMetrics;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use futures::future::join_all;
use rentwise_core::error::DeliveryFailure;
use rentwise_core::{Notification, UserId, UserRole};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handles that accepted the message.
    pub delivered: usize,
    /// Handles that timed out or were closed.
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// Number of failed handles.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn merge(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

/// Delivers notifications to registered connections.
#[derive(Debug, Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl Notifier {
    /// Create a notifier bounded by `timeout` per recipient handle.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// The registry this notifier reads.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `message` to every handle of `user_id`.
    ///
    /// An identity with no handles yields an empty report.
    pub async fn send_to_identity(&self, user_id: &UserId, message: &Notification) -> DeliveryReport {
        let handles = self.registry.handles_for(user_id).await;
        let report = self.deliver_all(user_id, &handles, message).await;
        Self::record(message, &report);
        report
    }

    /// Deliver `message` to every identity whose cached role is `role`.
    ///
    /// Identities without a cached role are skipped.
    pub async fn broadcast_by_role(&self, role: UserRole, message: &Notification) -> DeliveryReport {
        let recipients = self.registry.snapshot_for_role(role).await;

        let deliveries = recipients
            .iter()
            .map(|(user_id, handles)| self.deliver_all(user_id, handles, message));
        let mut report = DeliveryReport::default();
        for part in join_all(deliveries).await {
            report.merge(part);
        }

        Self::record(message, &report);
        report
    }

    async fn deliver_all(
        &self,
        user_id: &UserId,
        handles: &[ConnectionHandle],
        message: &Notification,
    ) -> DeliveryReport {
        let sends = handles
            .iter()
            .map(|handle| self.deliver_one(user_id, handle, message.clone()));

        let mut report = DeliveryReport::default();
        for outcome in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    async fn deliver_one(
        &self,
        user_id: &UserId,
        handle: &ConnectionHandle,
        message: Notification,
    ) -> Result<(), DeliveryFailure> {
        let failure = match handle.deliver(message, self.timeout).await {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(_)) => DeliveryFailure::Timeout {
                identity: user_id.clone(),
                connection: handle.id(),
                timeout: self.timeout,
            },
            Err(SendTimeoutError::Closed(_)) => DeliveryFailure::Closed {
                identity: user_id.clone(),
                connection: handle.id(),
            },
        };
        tracing::warn!(
            identity = %user_id,
            connection_id = handle.id(),
            reason = %failure,
            "Notification delivery failed"
        );
        Err(failure)
    }

    fn record(message: &Notification, report: &DeliveryReport) {
        NotificationMetrics::record_delivered(report.delivered);
        NotificationMetrics::record_failed(report.failed());
        tracing::debug!(
            kind = message.kind(),
            delivered = report.delivered,
            failed = report.failed(),
            "Notification fan-out complete"
        );
    }
}

//! SyncReconciler: pushes unacknowledged local order state to the remote service.
//!
//! Stateless between runs. What still needs pushing is exactly the set of
//! orders with `is_synced = 0`, so a run can be repeated or interrupted at
//! any point. An order is only marked synced when the remote acknowledged the
//! status it still has locally.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::value_objects::OrderId;
use crate::store::OrderLedger;
use crate::sync::remote::{OrderPayload, RemoteError, RemoteOrderService, StatusUpdate};
use crate::sync::retry::RetryPolicy;
use crate::Result;

/// Outcome of one [`SyncReconciler::sync_all`] run.
///
/// Every attempted order lands in exactly one bucket:
/// `attempted == succeeded + failed + superseded`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Acknowledged by the remote, but the order changed status meanwhile.
    /// Neither succeeded nor failed; it stays unsynced for the next run.
    pub superseded: usize,
    /// The remote was unreachable and nothing was attempted.
    pub offline: bool,
}

pub struct SyncReconciler {
    ledger: OrderLedger,
    remote: Arc<dyn RemoteOrderService>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl SyncReconciler {
    pub fn new(ledger: OrderLedger, remote: Arc<dyn RemoteOrderService>, policy: RetryPolicy) -> Self {
        Self { ledger, remote, policy, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Pushes every unsynced order. A failing order never stops the others.
    ///
    /// Only a local storage failure while listing is returned as an error;
    /// remote failures end up in the report.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let pending = self.ledger.list_unsynced().await?;
        let mut report = SyncReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        if !self.remote.is_reachable().await {
            tracing::info!(pending = pending.len(), "Remote order service unreachable, skipping sync");
            report.offline = true;
            return Ok(report);
        }

        for order in &pending {
            if self.cancel.is_cancelled() {
                tracing::info!("Sync cancelled, remaining orders stay unsynced");
                break;
            }
            report.attempted += 1;
            self.sync_one(order, &mut report).await;
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            superseded = report.superseded,
            "Sync finished"
        );
        Ok(report)
    }

    async fn sync_one(&self, order: &Order, report: &mut SyncReport) {
        let payload = OrderPayload::from(order);
        if let Err(e) = self.with_retry(|| self.remote.upsert_order(&payload)).await {
            tracing::warn!(order_id = %order.id(), "Order push failed: {e}");
            report.failed += 1;
            return;
        }
        match self.ledger.mark_synced_if(order.id(), order.status()).await {
            Ok(true) => report.succeeded += 1,
            Ok(false) => {
                tracing::debug!(order_id = %order.id(), "Order changed during push, leaving unsynced");
                report.superseded += 1;
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id(), "Could not record acknowledgment: {e}");
                report.failed += 1;
            }
        }
    }

    /// Pushes one status change right away instead of waiting for the next
    /// [`sync_all`](Self::sync_all). The local transition has already been
    /// committed; an error here only means the order stays unsynced.
    #[tracing::instrument(skip(self))]
    pub async fn push_status_change(&self, order_id: OrderId, status: OrderStatus) -> std::result::Result<(), RemoteError> {
        let update = StatusUpdate { order_id, status };
        self.with_retry(|| self.remote.update_status(&update)).await?;
        match self.ledger.mark_synced_if(order_id, status).await {
            Ok(true) => tracing::debug!("Status change acknowledged"),
            Ok(false) => tracing::debug!("Order moved past the pushed status, leaving unsynced"),
            Err(e) => tracing::warn!("Could not record acknowledgment: {e}"),
        }
        Ok(())
    }

    async fn with_retry<F, Fut>(&self, op: F) -> std::result::Result<(), RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<(), RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(RemoteError::Cancelled),
                outcome = tokio::time::timeout(self.policy.attempt_timeout, op()) => {
                    outcome.unwrap_or(Err(RemoteError::Timeout(self.policy.attempt_timeout)))
                }
            };
            let error = match outcome {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            attempt += 1;
            if !self.policy.should_retry(&error, attempt) {
                return Err(error);
            }
            let delay = self.policy.backoff.delay_for_attempt(attempt - 1);
            tracing::debug!(attempt, ?delay, "Remote call failed, retrying: {error}");
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RemoteError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-process remote whose behavior is scripted per order id.
    #[derive(Default)]
    pub struct ScriptedRemote {
        pub offline: bool,
        pub reject: HashSet<OrderId>,
        /// Fail this many calls per order with a transport error before succeeding.
        pub flaky: Mutex<HashMap<OrderId, u32>>,
        pub delay: Option<Duration>,
        pub upserts: Mutex<Vec<OrderPayload>>,
        pub updates: Mutex<Vec<StatusUpdate>>,
    }

    impl ScriptedRemote {
        fn outcome(&self, order_id: OrderId) -> std::result::Result<(), RemoteError> {
            if self.reject.contains(&order_id) {
                return Err(RemoteError::Rejected { status: 500 });
            }
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(&order_id) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(RemoteError::Transport("connection reset".into()))
                }
                _ => Ok(()),
            }
        }

        pub fn upsert_count(&self) -> usize { self.upserts.lock().unwrap().len() }
    }

    #[async_trait]
    impl RemoteOrderService for ScriptedRemote {
        async fn is_reachable(&self) -> bool { !self.offline }

        async fn upsert_order(&self, order: &OrderPayload) -> std::result::Result<(), RemoteError> {
            if let Some(delay) = self.delay { tokio::time::sleep(delay).await; }
            self.upserts.lock().unwrap().push(order.clone());
            self.outcome(order.id)
        }

        async fn update_status(&self, update: &StatusUpdate) -> std::result::Result<(), RemoteError> {
            if let Some(delay) = self.delay { tokio::time::sleep(delay).await; }
            self.updates.lock().unwrap().push(update.clone());
            self.outcome(update.order_id)
        }
    }

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(200)).with_backoff(crate::sync::retry::BackoffStrategy::Fixed(Duration::from_millis(5)))
    }
}

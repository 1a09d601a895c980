//! SyncWorker: background task driving the reconciler.
//!
//! Runs a sync on startup, then on a fixed interval and whenever a
//! [`SyncHandle`] asks for one. Request handlers only ever enqueue; they never
//! wait on the network.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::OrderId;
use crate::sync::SyncReconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Push every unsynced order.
    SyncNow,
    /// Push one status change immediately.
    PushStatus { order_id: OrderId, status: OrderStatus },
}

/// Cheap to clone. Sends are best-effort: a full or closed queue is logged and
/// the order simply waits for the next periodic sync.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    pub fn request_sync(&self) -> bool {
        self.send(SyncCommand::SyncNow)
    }

    pub fn push_status(&self, order_id: OrderId, status: OrderStatus) -> bool {
        self.send(SyncCommand::PushStatus { order_id, status })
    }

    fn send(&self, command: SyncCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                tracing::warn!(?command, "Sync queue full, dropping command");
                false
            }
            Err(TrySendError::Closed(command)) => {
                tracing::warn!(?command, "Sync worker stopped, dropping command");
                false
            }
        }
    }
}

pub struct SyncWorker {
    reconciler: Arc<SyncReconciler>,
    interval: Duration,
    rx: mpsc::Receiver<SyncCommand>,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(reconciler: Arc<SyncReconciler>, interval: Duration, capacity: usize, shutdown: CancellationToken) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { reconciler, interval, rx, shutdown }, SyncHandle { tx })
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(interval = ?self.interval, "SyncWorker started");

        self.sync_all().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("SyncWorker shutting down");
                    break;
                }

                _ = ticker.tick() => self.sync_all().await,

                command = self.rx.recv() => match command {
                    Some(SyncCommand::SyncNow) => self.sync_all().await,
                    Some(SyncCommand::PushStatus { order_id, status }) => {
                        if let Err(e) = self.reconciler.push_status_change(order_id, status).await {
                            tracing::warn!(%order_id, %status, "Status push failed, left for the next sync: {e}");
                        }
                    }
                    None => {
                        tracing::info!("All sync handles dropped, SyncWorker stopping");
                        break;
                    }
                },
            }
        }

        tracing::info!("SyncWorker stopped");
    }

    async fn sync_all(&self) {
        if let Err(e) = self.reconciler.sync_all().await {
            tracing::error!("Sync failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DeliveryMethod, PlaceOrder};
    use crate::domain::value_objects::UserId;
    use crate::store::testing::{draft, test_pool};
    use crate::store::Stores;
    use crate::sync::reconciler::testing::{fast_policy, ScriptedRemote};
    use uuid::Uuid;

    async fn wait_until_synced(stores: &Stores, order_id: OrderId) {
        for _ in 0..100 {
            if stores.ledger.get_order(order_id).await.unwrap().is_synced() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("order {order_id} never synced");
    }

    #[tokio::test]
    async fn test_worker_syncs_on_start_and_on_request() {
        let stores = Stores::new(test_pool().await);
        let product = stores.catalog.upsert_product(None, &draft("Bread", "Bakery", 300, 10)).await.unwrap();
        let place = |qty| PlaceOrder::new(UserId::new(Uuid::new_v4()), product.id(), qty, DeliveryMethod::Pickup, None);
        let first = stores.ledger.place_order(place(1)).await.unwrap();

        let remote = Arc::new(ScriptedRemote::default());
        let reconciler = Arc::new(SyncReconciler::new(stores.ledger.clone(), remote.clone(), fast_policy()));
        let shutdown = CancellationToken::new();
        let (worker, handle) = SyncWorker::new(reconciler, Duration::from_secs(3600), 8, shutdown.clone());
        let task = worker.spawn();

        wait_until_synced(&stores, first.id()).await;

        let second = stores.ledger.place_order(place(2)).await.unwrap();
        assert!(handle.request_sync());
        wait_until_synced(&stores, second.id()).await;

        stores.ledger.cancel_order(second.id()).await.unwrap();
        assert!(handle.push_status(second.id(), OrderStatus::Cancelled));
        wait_until_synced(&stores, second.id()).await;
        assert_eq!(remote.updates.lock().unwrap().len(), 1);

        shutdown.cancel();
        task.await.unwrap();
        assert!(!handle.request_sync());
    }

    #[tokio::test]
    async fn test_full_queue_never_blocks() {
        let stores = Stores::new(test_pool().await);
        let reconciler = Arc::new(SyncReconciler::new(stores.ledger.clone(), Arc::new(ScriptedRemote::default()), fast_policy()));
        let (_worker, handle) = SyncWorker::new(reconciler, Duration::from_secs(3600), 1, CancellationToken::new());

        assert!(handle.request_sync());
        assert!(!handle.request_sync());
    }
}

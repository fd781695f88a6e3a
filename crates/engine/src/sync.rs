//! Live task synchronization.
//!
//! A feed re-reads the *entire* scoped collection on every backend change
//! notification and republishes it as a fresh immutable snapshot, newest
//! first. The subscription is the single source of truth: no optimistic
//! local state is merged on top of it.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tp_core::{Task, TaskRecord, TaskStore, TpError};

use crate::session::SessionState;

/// Snapshot state delivered to consumers. `Failed` is observably distinct
/// from an empty `Ready` list.
#[derive(Debug, Clone)]
pub enum SyncState {
    Loading,
    Ready(Arc<Vec<Task>>),
    Failed(TpError),
}

impl SyncState {
    pub fn tasks(&self) -> &[Task] {
        match self {
            Self::Ready(tasks) => tasks,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error(&self) -> Option<&TpError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Cancellable handle over a live subscription. Cancellation is explicit:
/// dropping the handle without calling [`TaskFeed::cancel`] leaks the
/// underlying subscription task.
pub struct TaskFeed {
    rx: watch::Receiver<SyncState>,
    handle: JoinHandle<()>,
}

impl TaskFeed {
    pub fn state(&self) -> SyncState {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. Returns the latest state if
    /// the feed has already ended.
    pub async fn changed(&mut self) -> SyncState {
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Additional observer of the same feed.
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.rx.clone()
    }

    /// Tear down the subscription. No further snapshots are delivered.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Opens live subscriptions against the task store.
pub struct TaskSyncEngine {
    store: Arc<dyn TaskStore>,
}

impl TaskSyncEngine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Subscribe to the collection scoped to `user_id`.
    pub fn subscribe(&self, user_id: &str) -> TaskFeed {
        let (tx, rx) = watch::channel(SyncState::Loading);
        let handle = tokio::spawn(run_feed(
            Arc::clone(&self.store),
            user_id.to_string(),
            tx,
        ));
        TaskFeed { rx, handle }
    }

    /// Feed that tracks the session: subscribes on login, republishes an
    /// empty list immediately on logout.
    pub fn follow(&self, mut session_rx: watch::Receiver<SessionState>) -> TaskFeed {
        let store = Arc::clone(&self.store);
        let (tx, rx) = watch::channel(SyncState::Ready(Arc::new(Vec::new())));
        let handle = tokio::spawn(async move {
            let mut inner: Option<(String, watch::Receiver<SyncState>, JoinHandle<()>)> = None;
            loop {
                let latest = session_rx.borrow_and_update().clone();
                match latest {
                    // In-flight identity operation: the session has not
                    // ended, so the live subscription stays up.
                    SessionState::Loading => {}
                    SessionState::Authenticated(session) => {
                        let same_user = inner
                            .as_ref()
                            .is_some_and(|(uid, _, _)| *uid == session.user_id);
                        if !same_user {
                            if let Some((_, _, task)) = inner.take() {
                                task.abort();
                            }
                            let user_id = session.user_id;
                            debug!(user_id = %user_id, "session active; opening task feed");
                            let (inner_tx, inner_rx) = watch::channel(SyncState::Loading);
                            let task = tokio::spawn(run_feed(
                                Arc::clone(&store),
                                user_id.clone(),
                                inner_tx,
                            ));
                            let _ = tx.send(SyncState::Loading);
                            inner = Some((user_id, inner_rx, task));
                        }
                    }
                    SessionState::Unauthenticated => {
                        if let Some((_, _, task)) = inner.take() {
                            task.abort();
                            debug!("session ended; publishing empty snapshot");
                            let _ = tx.send(SyncState::Ready(Arc::new(Vec::new())));
                        }
                    }
                }

                tokio::select! {
                    changed = session_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    forwarded = async {
                        match &mut inner {
                            Some((_, inner_rx, _)) => inner_rx.changed().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        match forwarded {
                            Ok(()) => {
                                if let Some((_, inner_rx, _)) = &mut inner {
                                    let state = inner_rx.borrow_and_update().clone();
                                    let _ = tx.send(state);
                                }
                            }
                            Err(_) => {
                                if let Some((_, _, task)) = inner.take() {
                                    task.abort();
                                }
                            }
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            if let Some((_, _, task)) = inner.take() {
                task.abort();
            }
        });
        TaskFeed { rx, handle }
    }
}

async fn run_feed(
    store: Arc<dyn TaskStore>,
    user_id: String,
    tx: watch::Sender<SyncState>,
) {
    // Subscribe before the initial read so no committed write is missed.
    let mut changes = store.changes();
    publish_snapshot(&store, &user_id, &tx).await;

    loop {
        match changes.recv().await {
            Ok(event) => {
                if event.user_id != user_id {
                    continue;
                }
            }
            // Dropped notifications are harmless: every publish re-reads
            // the full current state anyway.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "change feed lagged; re-reading");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(user_id = %user_id, "change feed closed");
                break;
            }
        }
        publish_snapshot(&store, &user_id, &tx).await;
        if tx.is_closed() {
            break;
        }
    }
}

async fn publish_snapshot(
    store: &Arc<dyn TaskStore>,
    user_id: &str,
    tx: &watch::Sender<SyncState>,
) {
    match store.list(user_id).await {
        Ok(mut records) => {
            // Most recently created first; consumer-level re-sorts are the
            // projector's business.
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let tasks: Vec<Task> = records.iter().map(TaskRecord::to_task).collect();
            let _ = tx.send(SyncState::Ready(Arc::new(tasks)));
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "task re-read failed");
            let _ = tx.send(SyncState::Failed(e));
        }
    }
}

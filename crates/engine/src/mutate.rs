//! Mutation gateway: session-scoped writes against the task store.
//!
//! Every operation verifies that the target records belong to the active
//! session before touching the store, and every failure comes back as a
//! classified error plus a readable last-error slot. Bulk operations go
//! through a single atomic batch: all listed tasks receive the patch or
//! none do. The gateway performs no retries; redelivery policy belongs to
//! the caller.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use tp_core::{
    RecordPatch, Task, TaskDraft, TaskPatch, TaskRecord, TaskStatus, TaskStore, TpError, TpResult,
    WriteBatch,
};

use crate::session::SessionState;

pub struct MutationGateway {
    store: Arc<dyn TaskStore>,
    session: watch::Receiver<SessionState>,
    timeout: Option<Duration>,
    last_error: RwLock<Option<TpError>>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn TaskStore>, session: watch::Receiver<SessionState>) -> Self {
        Self {
            store,
            session,
            timeout: None,
            last_error: RwLock::new(None),
        }
    }

    /// Bound every store call. Unset by default: a hung backend call hangs
    /// the caller, matching the historical behavior.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Most recent operation failure; cleared when the next one starts.
    pub fn last_error(&self) -> Option<TpError> {
        self.last_error
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn current_user_id(&self) -> TpResult<String> {
        self.session
            .borrow()
            .user_id()
            .map(str::to_string)
            .ok_or_else(|| TpError::PermissionDenied("no active session".into()))
    }

    fn begin_op(&self) {
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn finish_op<T>(&self, result: TpResult<T>) -> TpResult<T> {
        if let Err(e) = &result {
            *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = Some(e.clone());
        }
        result
    }

    async fn guarded<T>(&self, fut: impl Future<Output = TpResult<T>>) -> TpResult<T> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(TpError::Timeout(limit.as_millis() as u64)),
            },
            None => fut.await,
        }
    }

    /// Fetch a record and verify it belongs to the active session.
    async fn owned_record(&self, id: &str, user_id: &str) -> TpResult<TaskRecord> {
        let record = self
            .guarded(self.store.get(id))
            .await?
            .ok_or_else(|| TpError::NotFound(format!("task {id}")))?;
        if record.user_id != user_id {
            return Err(TpError::PermissionDenied(format!(
                "task {id} belongs to another user"
            )));
        }
        Ok(record)
    }

    /// Create a task. The store assigns the id; creation and update markers
    /// are set here and the task always starts unstarred.
    pub async fn add(&self, draft: TaskDraft) -> TpResult<Task> {
        self.begin_op();
        let result = self.try_add(draft).await;
        self.finish_op(result)
    }

    async fn try_add(&self, draft: TaskDraft) -> TpResult<Task> {
        let user_id = self.current_user_id()?;
        if draft.title.trim().is_empty() {
            return Err(TpError::ValidationFailed("title must not be empty".into()));
        }
        let due_date = parse_rfc3339("due_date", &draft.due_date)?;

        let now = Utc::now();
        let mut record = TaskRecord {
            id: String::new(),
            user_id,
            title: draft.title,
            description: draft.description,
            due_date,
            priority: draft.priority,
            status: draft.status,
            tags: draft.tags,
            starred: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        record.id = self.guarded(self.store.insert(record.clone())).await?;
        debug!(id = %record.id, "task created");
        Ok(record.to_task())
    }

    /// Partial patch: only supplied fields change, the update marker is
    /// always refreshed.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> TpResult<()> {
        self.begin_op();
        let result = self.try_update(id, patch).await;
        self.finish_op(result)
    }

    async fn try_update(&self, id: &str, patch: TaskPatch) -> TpResult<()> {
        let user_id = self.current_user_id()?;
        let current = self.owned_record(id, &user_id).await?;
        let record_patch = to_record_patch(&patch, current.status, Utc::now())?;
        self.guarded(self.store.update(id, &record_patch)).await
    }

    /// Delete one task. A missing id reports `NotFound` and leaves the
    /// collection untouched.
    pub async fn remove(&self, id: &str) -> TpResult<()> {
        self.begin_op();
        let result = self.try_remove(id).await;
        self.finish_op(result)
    }

    async fn try_remove(&self, id: &str) -> TpResult<()> {
        let user_id = self.current_user_id()?;
        self.owned_record(id, &user_id).await?;
        self.guarded(self.store.delete(id)).await
    }

    /// Apply one patch to every listed task atomically.
    pub async fn bulk_update(&self, ids: &[String], patch: TaskPatch) -> TpResult<()> {
        self.begin_op();
        let result = self.try_bulk_update(ids, patch).await;
        self.finish_op(result)
    }

    async fn try_bulk_update(&self, ids: &[String], patch: TaskPatch) -> TpResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let user_id = self.current_user_id()?;
        let now = Utc::now();

        // Ownership is verified for the whole set before anything is
        // written, so a bad id rejects the batch up front.
        let mut batch = WriteBatch::default();
        for id in ids {
            let current = self.owned_record(id, &user_id).await?;
            let record_patch = to_record_patch(&patch, current.status, now)?;
            batch = batch.update(id.clone(), record_patch);
        }
        self.guarded(self.store.apply(batch)).await?;
        debug!(count = ids.len(), "bulk update committed");
        Ok(())
    }

    /// Delete every listed task atomically.
    pub async fn bulk_delete(&self, ids: &[String]) -> TpResult<()> {
        self.begin_op();
        let result = self.try_bulk_delete(ids).await;
        self.finish_op(result)
    }

    async fn try_bulk_delete(&self, ids: &[String]) -> TpResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let user_id = self.current_user_id()?;

        let mut batch = WriteBatch::default();
        for id in ids {
            self.owned_record(id, &user_id).await?;
            batch = batch.delete(id.clone());
        }
        self.guarded(self.store.apply(batch)).await?;
        debug!(count = ids.len(), "bulk delete committed");
        Ok(())
    }
}

fn parse_rfc3339(field: &str, value: &str) -> TpResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TpError::ValidationFailed(format!("{field}: {e}")))
}

/// Render a consumer patch into backend-native form. The update marker is
/// always set; `completed_at` is stamped on a transition into Completed and
/// deliberately not cleared on reversal.
fn to_record_patch(
    patch: &TaskPatch,
    current_status: TaskStatus,
    now: DateTime<Utc>,
) -> TpResult<RecordPatch> {
    let due_date = patch
        .due_date
        .as_deref()
        .map(|value| parse_rfc3339("due_date", value))
        .transpose()?;

    let completed_at = match patch.status {
        Some(TaskStatus::Completed) if current_status != TaskStatus::Completed => Some(now),
        _ => None,
    };

    Ok(RecordPatch {
        title: patch.title.clone(),
        description: patch.description.clone(),
        due_date,
        priority: patch.priority,
        status: patch.status,
        tags: patch.tags.clone(),
        starred: patch.starred,
        completed_at,
        updated_at: Some(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_stamps_completion_once() {
        let now = Utc::now();
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };

        let rendered = to_record_patch(&patch, TaskStatus::Pending, now).unwrap();
        assert_eq!(rendered.completed_at, Some(now));

        // Already completed: no restamp.
        let rendered = to_record_patch(&patch, TaskStatus::Completed, now).unwrap();
        assert_eq!(rendered.completed_at, None);

        // Reversal does not clear the marker.
        let reopen = TaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        let rendered = to_record_patch(&reopen, TaskStatus::Completed, now).unwrap();
        assert_eq!(rendered.completed_at, None);
        assert_eq!(rendered.updated_at, Some(now));
    }

    #[test]
    fn bad_due_date_is_validation_failure() {
        let patch = TaskPatch {
            due_date: Some("tomorrow".into()),
            ..Default::default()
        };
        assert!(matches!(
            to_record_patch(&patch, TaskStatus::Pending, Utc::now()).unwrap_err(),
            TpError::ValidationFailed(_)
        ));
    }
}

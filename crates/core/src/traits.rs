use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::{ProviderError, TpResult};
use crate::model::{AuthHandle, Profile, RecordPatch, TaskRecord};

/// Change notification emitted by a task store after any committed write.
/// Carries the scoping key so subscribers can ignore foreign-scope churn.
/// Delivery is at-least-once; consumers re-read the full collection per
/// event rather than interpreting deltas.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub user_id: String,
}

/// A single operation inside an atomic write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Update { id: String, patch: RecordPatch },
    Delete { id: String },
}

/// Multi-document write that commits or fails as a single unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn update(mut self, id: impl Into<String>, patch: RecordPatch) -> Self {
        self.ops.push(BatchOp::Update {
            id: id.into(),
            patch,
        });
        self
    }

    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Delete { id: id.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Identity provider boundary: password and OAuth sign-in, sign-up,
/// sign-out, password reset. Errors carry raw provider codes; the identity
/// gateway normalizes them.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthHandle, ProviderError>;
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthHandle, ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;
    async fn oauth_sign_in(&self) -> Result<AuthHandle, ProviderError>;
    /// Already-active session, if the provider persisted one.
    async fn current_user(&self) -> Result<Option<AuthHandle>, ProviderError>;
}

/// Per-user profile records, separate from the task collection.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> TpResult<Option<Profile>>;
    /// Last writer wins if two first-logins race to create the same id.
    async fn create(&self, profile: &Profile) -> TpResult<()>;
    async fn touch_last_login(&self, user_id: &str, at: DateTime<Utc>) -> TpResult<()>;
}

/// Scoped task collection: single-document CRUD, atomic batches, full
/// re-reads, and a live change feed.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new record. The store assigns the id and returns it; any
    /// id on the incoming record is ignored.
    async fn insert(&self, record: TaskRecord) -> TpResult<String>;
    async fn get(&self, id: &str) -> TpResult<Option<TaskRecord>>;
    async fn update(&self, id: &str, patch: &RecordPatch) -> TpResult<()>;
    async fn delete(&self, id: &str) -> TpResult<()>;
    /// Apply every operation or none: a mid-batch failure must leave the
    /// store unchanged.
    async fn apply(&self, batch: WriteBatch) -> TpResult<()>;
    /// Full current collection for one scoping key.
    async fn list(&self, user_id: &str) -> TpResult<Vec<TaskRecord>>;
    /// Subscribe to committed-write notifications.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

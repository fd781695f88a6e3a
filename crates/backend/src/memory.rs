use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use tp_core::{
    AuthHandle, BatchOp, ChangeEvent, IdentityBackend, Profile, ProfileStore, ProviderError,
    RecordPatch, TaskRecord, TaskStore, TpError, TpResult, WriteBatch,
};

/// Buffer depth for the change feed. Subscribers that lag simply re-read
/// the full collection, so overflow is harmless.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Task store
// ---------------------------------------------------------------------------

/// In-memory task store with a broadcast change feed.
///
/// Batches are staged against a clone of the map and committed only when
/// every operation succeeds, so a mid-batch failure leaves the store
/// untouched. `fail_after_writes` injects such failures for tests.
pub struct MemoryTaskStore {
    records: RwLock<HashMap<String, TaskRecord>>,
    change_tx: broadcast::Sender<ChangeEvent>,
    /// Countdown of write operations until an injected failure, if any.
    fault: Mutex<Option<usize>>,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            change_tx,
            fault: Mutex::new(None),
        }
    }

    /// Arrange for the n-th subsequent write operation (1-based, counting
    /// individual ops inside batches) to fail with a storage error.
    pub fn fail_after_writes(&self, n: usize) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(n);
    }

    fn check_write_fault(&self) -> TpResult<()> {
        let mut fault = self.fault.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(remaining) = fault.as_mut() {
            if *remaining <= 1 {
                *fault = None;
                return Err(TpError::Storage("injected write failure".into()));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn notify(&self, user_id: &str) {
        // No receivers is fine; the send result is intentionally ignored.
        let _ = self.change_tx.send(ChangeEvent {
            user_id: user_id.to_string(),
        });
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, mut record: TaskRecord) -> TpResult<String> {
        let id = Uuid::now_v7().to_string();
        record.id = id.clone();

        let mut records = self.records.write().await;
        self.check_write_fault()?;
        let user_id = record.user_id.clone();
        records.insert(id.clone(), record);
        drop(records);

        debug!(id = %id, user_id = %user_id, "task inserted");
        self.notify(&user_id);
        Ok(id)
    }

    async fn get(&self, id: &str) -> TpResult<Option<TaskRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: &RecordPatch) -> TpResult<()> {
        let mut records = self.records.write().await;
        self.check_write_fault()?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| TpError::NotFound(format!("task {id}")))?;
        patch.apply_to(record);
        let user_id = record.user_id.clone();
        drop(records);

        self.notify(&user_id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> TpResult<()> {
        let mut records = self.records.write().await;
        self.check_write_fault()?;
        let record = records
            .remove(id)
            .ok_or_else(|| TpError::NotFound(format!("task {id}")))?;
        drop(records);

        self.notify(&record.user_id);
        Ok(())
    }

    async fn apply(&self, batch: WriteBatch) -> TpResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write().await;

        // Stage on a clone; commit only if every op succeeds.
        let mut staged = records.clone();
        let mut touched: HashSet<String> = HashSet::new();
        for op in &batch.ops {
            self.check_write_fault()?;
            match op {
                BatchOp::Update { id, patch } => {
                    let record = staged
                        .get_mut(id)
                        .ok_or_else(|| TpError::NotFound(format!("task {id}")))?;
                    patch.apply_to(record);
                    touched.insert(record.user_id.clone());
                }
                BatchOp::Delete { id } => {
                    let record = staged
                        .remove(id)
                        .ok_or_else(|| TpError::NotFound(format!("task {id}")))?;
                    touched.insert(record.user_id);
                }
            }
        }
        *records = staged;
        drop(records);

        debug!(ops = batch.ops.len(), "batch committed");
        for user_id in touched {
            self.notify(&user_id);
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> TpResult<Vec<TaskRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Profile store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: &str) -> TpResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn create(&self, profile: &Profile) -> TpResult<()> {
        // Racing first-logins overwrite each other; last writer wins.
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn touch_last_login(&self, user_id: &str, at: DateTime<Utc>) -> TpResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| TpError::NotFound(format!("profile {user_id}")))?;
        profile.last_login = at;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identity backend
// ---------------------------------------------------------------------------

struct Account {
    password: String,
    handle: AuthHandle,
    disabled: bool,
}

/// In-memory identity provider speaking the same `auth/*` error codes as
/// the remote one, so gateway normalization is exercised for real.
#[derive(Default)]
pub struct MemoryIdentityBackend {
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<AuthHandle>>,
    offline: Mutex<bool>,
}

impl MemoryIdentityBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as a network error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap_or_else(|e| e.into_inner()) = offline;
    }

    pub async fn disable_account(&self, email: &str) {
        if let Some(account) = self.accounts.write().await.get_mut(email) {
            account.disabled = true;
        }
    }

    fn check_online(&self) -> Result<(), ProviderError> {
        if *self.offline.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(ProviderError::new(
                "auth/network-request-failed",
                "network request failed",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityBackend for MemoryIdentityBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthHandle, ProviderError> {
        self.check_online()?;
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(email)
            .ok_or_else(|| ProviderError::new("auth/user-not-found", "no such user"))?;
        if account.disabled {
            return Err(ProviderError::new("auth/user-disabled", "account disabled"));
        }
        if account.password != password {
            return Err(ProviderError::new(
                "auth/invalid-credential",
                "invalid email or password",
            ));
        }
        let handle = account.handle.clone();
        drop(accounts);

        *self.current.write().await = Some(handle.clone());
        Ok(handle)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthHandle, ProviderError> {
        self.check_online()?;
        if password.len() < 6 {
            return Err(ProviderError::new("auth/weak-password", "password too weak"));
        }
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(ProviderError::new(
                "auth/email-already-in-use",
                "email already in use",
            ));
        }
        let handle = AuthHandle {
            user_id: Uuid::now_v7().to_string(),
            email: email.to_string(),
            display_name: Some(display_name.to_string()),
            email_verified: false,
        };
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                handle: handle.clone(),
                disabled: false,
            },
        );
        drop(accounts);

        *self.current.write().await = Some(handle.clone());
        Ok(handle)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.check_online()?;
        *self.current.write().await = None;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        self.check_online()?;
        if !self.accounts.read().await.contains_key(email) {
            return Err(ProviderError::new("auth/user-not-found", "no such user"));
        }
        Ok(())
    }

    async fn oauth_sign_in(&self) -> Result<AuthHandle, ProviderError> {
        self.check_online()?;
        // OAuth providers hand back addresses they have already verified.
        let handle = AuthHandle {
            user_id: Uuid::now_v7().to_string(),
            email: "oauth@example.com".into(),
            display_name: Some("OAuth User".into()),
            email_verified: true,
        };
        *self.current.write().await = Some(handle.clone());
        Ok(handle)
    }

    async fn current_user(&self) -> Result<Option<AuthHandle>, ProviderError> {
        self.check_online()?;
        Ok(self.current.read().await.clone())
    }
}

//! Session manager: composes the identity gateway and profile service into
//! one observable session state machine.
//!
//! State is published through a `watch` channel so consumers always see
//! the in-flight `Loading` phase and never act on stale session data. A
//! failed transition restores the prior state and records a retrievable
//! last error, cleared at the start of the next operation.

use std::sync::RwLock;

use tokio::sync::watch;
use tracing::{info, warn};

use tp_core::{AuthHandle, Profile, TpError, TpResult};

use crate::identity::IdentityGateway;
use crate::profile::ProfileService;

/// Authenticated identity plus its profile, valid until logout.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub profile: Profile,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    /// Transient: initial resume check or an in-flight identity operation.
    Loading,
    Authenticated(Session),
}

impl SessionState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated(session) => Some(&session.user_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

pub struct SessionManager {
    identity: IdentityGateway,
    profiles: ProfileService,
    state_tx: watch::Sender<SessionState>,
    last_error: RwLock<Option<TpError>>,
}

impl SessionManager {
    pub fn new(identity: IdentityGateway, profiles: ProfileService) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            identity,
            profiles,
            state_tx,
            last_error: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn is_demo_mode(&self) -> bool {
        self.identity.is_demo()
    }

    /// Most recent operation failure, if any. Cleared when the next
    /// operation starts.
    pub fn last_error(&self) -> Option<TpError> {
        self.last_error
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn begin_op(&self) -> SessionState {
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = None;
        let prior = self.state();
        self.state_tx.send_replace(SessionState::Loading);
        prior
    }

    fn fail_op(&self, prior: SessionState, err: TpError) -> TpError {
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = Some(err.clone());
        self.state_tx.send_replace(prior);
        err
    }

    /// Resolve the profile and publish the authenticated state. A profile
    /// store failure must not fail the identity operation: the session
    /// falls back to a profile synthesized from the handle.
    async fn establish(&self, handle: AuthHandle) -> Session {
        let profile = match self.profiles.lookup_or_create(&handle).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %handle.user_id, error = %e, "profile lookup failed; using fallback");
                let username = handle
                    .display_name
                    .clone()
                    .unwrap_or_else(|| handle.email.split('@').next().unwrap_or_default().into());
                let mut fallback = Profile::new(&handle.user_id, &handle.email, username);
                fallback.is_verified = handle.email_verified;
                fallback
            }
        };
        self.profiles.touch_last_login_detached(&handle.user_id);

        let session = Session {
            user_id: handle.user_id,
            profile,
        };
        info!(user_id = %session.user_id, "session established");
        self.state_tx
            .send_replace(SessionState::Authenticated(session.clone()));
        session
    }

    /// Check for an already-active session from a prior run. Observable as
    /// `Loading` while the check is in flight.
    pub async fn resume(&self) -> TpResult<Option<Session>> {
        let prior = self.begin_op();
        match self.identity.current_user().await {
            Ok(Some(handle)) => Ok(Some(self.establish(handle).await)),
            Ok(None) => {
                self.state_tx.send_replace(SessionState::Unauthenticated);
                Ok(None)
            }
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> TpResult<Session> {
        let prior = self.begin_op();
        match self.identity.login(email, password).await {
            Ok(handle) => Ok(self.establish(handle).await),
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }

    pub async fn signup(&self, email: &str, password: &str, username: &str) -> TpResult<Session> {
        let prior = self.begin_op();
        match self.identity.signup(email, password, username).await {
            Ok(handle) => Ok(self.establish(handle).await),
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }

    pub async fn oauth_login(&self) -> TpResult<Session> {
        let prior = self.begin_op();
        match self.identity.oauth_login().await {
            Ok(handle) => Ok(self.establish(handle).await),
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }

    /// Destroy the session, returning to the unauthenticated state.
    pub async fn logout(&self) -> TpResult<()> {
        let prior = self.begin_op();
        match self.identity.logout().await {
            Ok(()) => {
                info!("session ended");
                self.state_tx.send_replace(SessionState::Unauthenticated);
                Ok(())
            }
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }

    /// Password reset does not change the session state; the prior state is
    /// restored after the in-flight phase.
    pub async fn reset_password(&self, email: &str) -> TpResult<()> {
        let prior = self.begin_op();
        match self.identity.reset_password(email).await {
            Ok(()) => {
                self.state_tx.send_replace(prior);
                Ok(())
            }
            Err(e) => Err(self.fail_op(prior, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tp_backend::{MemoryIdentityBackend, MemoryProfileStore};
    use tp_core::IdentityBackend;

    fn demo_manager() -> SessionManager {
        SessionManager::new(
            IdentityGateway::demo(Duration::ZERO),
            ProfileService::new(Arc::new(MemoryProfileStore::new())),
        )
    }

    fn remote_manager(ident: Arc<MemoryIdentityBackend>) -> SessionManager {
        SessionManager::new(
            IdentityGateway::new(ident),
            ProfileService::new(Arc::new(MemoryProfileStore::new())),
        )
    }

    #[tokio::test]
    async fn demo_signup_then_login_is_deterministic() {
        let manager = demo_manager();
        assert!(manager.is_demo_mode());

        let first = manager.signup("a@x.com", "pw", "A").await.unwrap();
        manager.logout().await.unwrap();
        let second = manager.login("a@x.com", "pw").await.unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert!(manager.state().is_authenticated());
    }

    #[tokio::test]
    async fn failed_login_leaves_unauthenticated_with_error() {
        let ident = Arc::new(MemoryIdentityBackend::new());
        ident.sign_up("a@x.com", "secret1", "A").await.unwrap();
        ident.sign_out().await.unwrap();
        let manager = remote_manager(ident);

        let err = manager.login("a@x.com", "wrong").await.unwrap_err();
        assert_eq!(err, TpError::InvalidCredentials);
        assert!(matches!(manager.state(), SessionState::Unauthenticated));
        assert_eq!(manager.last_error(), Some(TpError::InvalidCredentials));

        // Next operation clears the previous error.
        manager.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(manager.last_error(), None);
    }

    #[tokio::test]
    async fn logout_returns_to_unauthenticated() {
        let manager = demo_manager();
        manager.login("a@x.com", "pw").await.unwrap();
        assert!(manager.state().is_authenticated());

        manager.logout().await.unwrap();
        assert!(matches!(manager.state(), SessionState::Unauthenticated));
    }

    #[tokio::test]
    async fn resume_without_prior_session_is_none() {
        let manager = demo_manager();
        assert!(manager.resume().await.unwrap().is_none());
        assert!(matches!(manager.state(), SessionState::Unauthenticated));
    }

    #[tokio::test]
    async fn resume_restores_provider_session() {
        let ident = Arc::new(MemoryIdentityBackend::new());
        ident.sign_up("a@x.com", "secret1", "A").await.unwrap();
        let manager = remote_manager(ident);

        let session = manager.resume().await.unwrap().unwrap();
        assert_eq!(session.profile.email, "a@x.com");
        assert!(manager.state().is_authenticated());
    }

    #[tokio::test]
    async fn demo_oauth_login_creates_verified_profile() {
        let manager = demo_manager();
        let session = manager.oauth_login().await.unwrap();
        assert_eq!(session.profile.email, "demo@google.com");
        assert!(session.profile.is_verified);
    }

    #[tokio::test]
    async fn reset_password_preserves_state() {
        let manager = demo_manager();
        manager.login("a@x.com", "pw").await.unwrap();
        manager.reset_password("a@x.com").await.unwrap();
        assert!(manager.state().is_authenticated());
    }

    #[tokio::test]
    async fn loading_is_observable_during_login() {
        // Nonzero demo delay keeps the operation in flight long enough for
        // the Loading state to be observed before it resolves.
        let manager = Arc::new(SessionManager::new(
            IdentityGateway::demo(Duration::from_millis(20)),
            ProfileService::new(Arc::new(MemoryProfileStore::new())),
        ));
        let mut rx = manager.subscribe();

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login("a@x.com", "pw").await })
        };

        // First transition is into Loading, then into Authenticated.
        rx.changed().await.unwrap();
        assert!(matches!(*rx.borrow_and_update(), SessionState::Loading));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());

        task.await.unwrap().unwrap();
    }
}

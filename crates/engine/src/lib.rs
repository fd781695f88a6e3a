//! Client-side synchronization and session core.
//!
//! Composes the identity gateway, profile service, session manager, task
//! sync engine, and mutation gateway over injected backend traits. The
//! remote store is the single source of truth: consumers see only
//! subscription-confirmed state.

pub mod config;
pub mod identity;
pub mod mutate;
pub mod profile;
pub mod project;
pub mod session;
pub mod sync;

pub use config::{BackendConfig, EngineConfig};
pub use identity::IdentityGateway;
pub use mutate::MutationGateway;
pub use profile::ProfileService;
pub use project::{TaskFilter, project};
pub use session::{Session, SessionManager, SessionState};
pub use sync::{SyncState, TaskFeed, TaskSyncEngine};

use std::sync::Arc;
use std::time::Duration;

use tp_core::{IdentityBackend, ProfileStore, TaskStore};

/// The full client core wired together from one config and one backend.
///
/// Demo mode is decided here, once: an unconfigured backend swaps the
/// identity gateway for the in-memory simulation regardless of what was
/// injected. Task and profile stores stay as supplied.
pub struct TaskPilotClient {
    session: Arc<SessionManager>,
    sync: TaskSyncEngine,
    mutations: MutationGateway,
}

impl TaskPilotClient {
    pub fn new(
        config: &EngineConfig,
        identity: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        let gateway = if config.backend.is_configured() {
            IdentityGateway::new(identity)
        } else {
            IdentityGateway::demo(Duration::from_millis(config.demo_delay_ms))
        };
        Self::assemble(config, gateway, profiles, tasks)
    }

    /// Fully in-memory client: demo identity plus the reference stores.
    pub fn demo(config: &EngineConfig) -> Self {
        Self::assemble(
            config,
            IdentityGateway::demo(Duration::from_millis(config.demo_delay_ms)),
            Arc::new(tp_backend::MemoryProfileStore::new()),
            Arc::new(tp_backend::MemoryTaskStore::new()),
        )
    }

    fn assemble(
        config: &EngineConfig,
        gateway: IdentityGateway,
        profiles: Arc<dyn ProfileStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(gateway, ProfileService::new(profiles)));
        let sync = TaskSyncEngine::new(Arc::clone(&tasks));
        let mut mutations = MutationGateway::new(tasks, session.subscribe());
        if let Some(secs) = config.request_timeout_secs {
            mutations = mutations.with_timeout(Duration::from_secs(secs));
        }
        Self {
            session,
            sync,
            mutations,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn sync(&self) -> &TaskSyncEngine {
        &self.sync
    }

    pub fn mutations(&self) -> &MutationGateway {
        &self.mutations
    }

    /// Feed that follows this client's session lifecycle.
    pub fn task_feed(&self) -> TaskFeed {
        self.sync.follow(self.session.subscribe())
    }
}

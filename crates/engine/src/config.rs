use serde::{Deserialize, Serialize};

/// Placeholder value shipped in config templates; treated as unconfigured.
const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Remote backend project settings. Absent or placeholder values gate the
/// whole client into demo mode, decided once at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            project_id: std::env::var("TASKPILOT_PROJECT_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            api_key: std::env::var("TASKPILOT_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            auth_domain: std::env::var("TASKPILOT_AUTH_DOMAIN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    /// Real credentials present: project id set and the api key is neither
    /// missing nor the template placeholder.
    pub fn is_configured(&self) -> bool {
        let has_project = self
            .project_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty() && k != PLACEHOLDER_API_KEY);
        has_project && has_key
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Artificial latency for simulated identity operations in demo mode.
    #[serde(default = "default_demo_delay_ms")]
    pub demo_delay_ms: u64,
    /// Bound on every remote call when set. None reproduces the historical
    /// behavior of waiting indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_demo_delay_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            demo_delay_ms: default_demo_delay_ms(),
            request_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            backend: BackendConfig::from_env(),
            ..Default::default()
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use tp_core::{AuthHandle, Profile, ProfileStore, TpResult};

/// Profile record access for the session manager: lazy creation on first
/// sign-in and best-effort last-login updates.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Fetch the profile for an identity, creating it with defaults on the
    /// first successful sign-up or OAuth login. Existing records are never
    /// overwritten here.
    pub async fn lookup_or_create(&self, handle: &AuthHandle) -> TpResult<Profile> {
        if let Some(profile) = self.store.get(&handle.user_id).await? {
            return Ok(profile);
        }
        let username = handle
            .display_name
            .clone()
            .unwrap_or_else(|| handle.email.split('@').next().unwrap_or_default().to_string());
        let mut profile = Profile::new(&handle.user_id, &handle.email, username);
        profile.is_verified = handle.email_verified;
        self.store.create(&profile).await?;
        debug!(user_id = %profile.user_id, "profile created");
        Ok(profile)
    }

    /// Update the last-login marker without blocking or failing the caller.
    /// Failures are logged and dropped.
    pub fn touch_last_login_detached(&self, user_id: &str) {
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_login(&user_id, Utc::now()).await {
                warn!(user_id = %user_id, error = %e, "last-login update failed");
            }
        });
    }
}

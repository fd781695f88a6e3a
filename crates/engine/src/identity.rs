//! Identity gateway: wraps the identity provider and normalizes its error
//! codes into the stable taxonomy. When no backend is configured the
//! gateway runs in demo mode and simulates every operation in-memory.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info};

use tp_core::{AuthHandle, IdentityBackend, ProviderError, TpError, TpResult};

/// Map a raw provider code onto the error taxonomy.
pub fn normalize(err: ProviderError) -> TpError {
    match err.code.as_str() {
        "auth/invalid-credential" | "auth/wrong-password" => TpError::InvalidCredentials,
        "auth/user-not-found" => TpError::AccountNotFound,
        "auth/user-disabled" => TpError::AccountDisabled,
        "auth/weak-password" => TpError::WeakPassword,
        "auth/email-already-in-use" => TpError::EmailInUse,
        "auth/invalid-email" => TpError::ValidationFailed("invalid email address".into()),
        "auth/network-request-failed" => TpError::NetworkUnavailable(err.message),
        "auth/configuration-not-found" | "auth/invalid-api-key" | "auth/operation-not-allowed" => {
            TpError::BackendMisconfigured(err.message)
        }
        "auth/too-many-requests" => TpError::RateLimited,
        _ => TpError::Unknown(err.code),
    }
}

/// Deterministic demo-mode user id, derived only from the email.
fn demo_user_id(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("demo-{hex}")
}

fn email_local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// Gateway over the identity provider. `backend == None` means demo mode:
/// a global, immutable decision made once at construction, never
/// renegotiated per call.
pub struct IdentityGateway {
    backend: Option<Arc<dyn IdentityBackend>>,
    demo_delay: Duration,
}

impl IdentityGateway {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self {
            backend: Some(backend),
            demo_delay: Duration::ZERO,
        }
    }

    pub fn demo(demo_delay: Duration) -> Self {
        info!("identity backend unconfigured; running in demo mode");
        Self {
            backend: None,
            demo_delay,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.backend.is_none()
    }

    async fn simulate(
        &self,
        email: &str,
        display_name: Option<&str>,
        verified: bool,
    ) -> AuthHandle {
        sleep(self.demo_delay).await;
        let handle = AuthHandle {
            user_id: demo_user_id(email),
            email: email.to_string(),
            display_name: Some(
                display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| email_local_part(email)),
            ),
            email_verified: verified,
        };
        debug!(user_id = %handle.user_id, "demo identity synthesized");
        handle
    }

    /// Password sign-in. Demo mode accepts any credentials.
    pub async fn login(&self, email: &str, password: &str) -> TpResult<AuthHandle> {
        match &self.backend {
            Some(backend) => backend.sign_in(email, password).await.map_err(normalize),
            None => Ok(self.simulate(email, None, false).await),
        }
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> TpResult<AuthHandle> {
        match &self.backend {
            Some(backend) => backend
                .sign_up(email, password, display_name)
                .await
                .map_err(normalize),
            None => Ok(self.simulate(email, Some(display_name), false).await),
        }
    }

    pub async fn logout(&self) -> TpResult<()> {
        match &self.backend {
            Some(backend) => backend.sign_out().await.map_err(normalize),
            None => Ok(()),
        }
    }

    pub async fn reset_password(&self, email: &str) -> TpResult<()> {
        match &self.backend {
            Some(backend) => backend.send_password_reset(email).await.map_err(normalize),
            None => {
                sleep(self.demo_delay).await;
                debug!(email, "demo password reset simulated");
                Ok(())
            }
        }
    }

    pub async fn oauth_login(&self) -> TpResult<AuthHandle> {
        match &self.backend {
            Some(backend) => backend.oauth_sign_in().await.map_err(normalize),
            // The fixed demo OAuth identity comes with a verified email,
            // like a real OAuth provider would report.
            None => Ok(self
                .simulate("demo@google.com", Some("Demo Google User"), true)
                .await),
        }
    }

    /// Already-active session from a prior run, if the provider kept one.
    pub async fn current_user(&self) -> TpResult<Option<AuthHandle>> {
        match &self.backend {
            Some(backend) => backend.current_user().await.map_err(normalize),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_covers_known_codes() {
        let cases = [
            ("auth/invalid-credential", TpError::InvalidCredentials),
            ("auth/wrong-password", TpError::InvalidCredentials),
            ("auth/user-not-found", TpError::AccountNotFound),
            ("auth/user-disabled", TpError::AccountDisabled),
            ("auth/weak-password", TpError::WeakPassword),
            ("auth/email-already-in-use", TpError::EmailInUse),
            ("auth/too-many-requests", TpError::RateLimited),
        ];
        for (code, expected) in cases {
            assert_eq!(normalize(ProviderError::new(code, "m")), expected);
        }
        assert!(matches!(
            normalize(ProviderError::new("auth/network-request-failed", "m")),
            TpError::NetworkUnavailable(_)
        ));
        assert!(matches!(
            normalize(ProviderError::new("auth/invalid-api-key", "m")),
            TpError::BackendMisconfigured(_)
        ));
        assert_eq!(
            normalize(ProviderError::new("auth/something-new", "m")),
            TpError::Unknown("auth/something-new".into())
        );
    }

    #[test]
    fn demo_user_id_is_stable_and_email_derived() {
        let a = demo_user_id("a@x.com");
        assert_eq!(a, demo_user_id("a@x.com"));
        assert_eq!(a, demo_user_id("  A@X.COM "));
        assert_ne!(a, demo_user_id("b@x.com"));
        assert!(a.starts_with("demo-"));
    }

    #[tokio::test]
    async fn demo_login_never_fails() {
        let gateway = IdentityGateway::demo(Duration::ZERO);
        assert!(gateway.is_demo());

        let handle = gateway.login("a@x.com", "anything").await.unwrap();
        assert_eq!(handle.email, "a@x.com");
        assert_eq!(handle.display_name.as_deref(), Some("a"));

        let again = gateway.login("a@x.com", "different-password").await.unwrap();
        assert_eq!(handle.user_id, again.user_id);

        assert!(gateway.reset_password("a@x.com").await.is_ok());
        assert!(gateway.logout().await.is_ok());
        assert_eq!(gateway.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn demo_signup_keeps_display_name() {
        let gateway = IdentityGateway::demo(Duration::ZERO);
        let handle = gateway.signup("b@x.com", "pw", "Bea").await.unwrap();
        assert_eq!(handle.display_name.as_deref(), Some("Bea"));
        assert!(!handle.email_verified);
    }

    #[tokio::test]
    async fn demo_oauth_identity_is_fixed_and_verified() {
        let gateway = IdentityGateway::demo(Duration::ZERO);
        let handle = gateway.oauth_login().await.unwrap();
        assert_eq!(handle.email, "demo@google.com");
        assert_eq!(handle.display_name.as_deref(), Some("Demo Google User"));
        assert!(handle.email_verified);
    }
}

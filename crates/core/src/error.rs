use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TpError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("backend misconfigured: {0}")]
    BackendMisconfigured(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account not found")]
    AccountNotFound,

    #[error("account disabled")]
    AccountDisabled,

    #[error("weak password")]
    WeakPassword,

    #[error("email already in use")]
    EmailInUse,

    #[error("rate limited")]
    RateLimited,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Elapsed limit in milliseconds, so sub-second limits stay visible.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("backend error: {0}")]
    Unknown(String),
}

impl TpError {
    /// Human-readable message suitable for direct display, one per
    /// taxonomy entry. Callers that need the raw classification match on
    /// the variant instead.
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnavailable(_) => {
                "Network error. Please check your internet connection.".into()
            }
            Self::BackendMisconfigured(_) => {
                "The backend is not configured. Please check the project settings.".into()
            }
            Self::PermissionDenied(_) => "You do not have access to this item.".into(),
            Self::NotFound(_) => "The requested item could not be found.".into(),
            Self::InvalidCredentials => "Invalid email or password.".into(),
            Self::AccountNotFound => "No account found with this email address.".into(),
            Self::AccountDisabled => "This account has been disabled.".into(),
            Self::WeakPassword => "Password should be at least 6 characters long.".into(),
            Self::EmailInUse => "An account with this email already exists.".into(),
            Self::RateLimited => "Too many attempts. Please try again later.".into(),
            Self::ValidationFailed(msg) => format!("Invalid input: {msg}"),
            Self::Timeout(millis) => format!("The request timed out after {millis}ms."),
            Self::Storage(_) | Self::Unknown(_) => {
                "Something went wrong. Please try again.".into()
            }
        }
    }
}

pub type TpResult<T> = Result<T, TpError>;

/// Raw error surfaced by an identity provider before normalization.
/// The identity gateway maps `code` into the `TpError` taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

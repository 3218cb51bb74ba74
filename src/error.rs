use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures a dashboard action can end in. Each one is turned into a
/// message for the user at the boundary that detects it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no data found for {0}")]
    NoData(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("forecasting model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    #[error("invalid username or password")]
    AuthFailure,

    #[error("credential store error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("upstream service error: {0}")]
    Upstream(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Text shown to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoData(_) => "No data found.".to_string(),
            Self::InvalidParameter(msg) => msg.clone(),
            Self::ModelUnavailable(msg) => msg.clone(),
            Self::DuplicateUsername(_) => "Username already exists.".to_string(),
            Self::AuthFailure => "Invalid username or password".to_string(),
            Self::Storage(e) => format!("Error: {}", e),
            Self::Upstream(msg) => format!("Error: {}", msg),
        }
    }
}

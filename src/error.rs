use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// A versioned update lost a race against another writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

const GENERIC_MESSAGE: &str = "An unexpected error occurred";

impl PaymentError {
    /// HTTP status class the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidArgument(_) => 400,
            Self::InvalidState(_) => 409,
            Self::Authentication(_) => 401,
            Self::Conflict(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Csv(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Message safe to hand back to a caller. Internal faults are flattened
    /// into a generic text so storage or transport details never leak.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into().into())
    }
}

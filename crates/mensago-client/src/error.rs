//! Client error types

use mensago_common::MensagoError;

/// Error type for Mensago client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Mensago(#[from] MensagoError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("server returned error: code={code}, status={status}")]
    Server {
        code: u16,
        status: String,
        info: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection not ready")]
    NotConnected,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("administrator login required")]
    NotAdmin,

    #[error("request timeout")]
    Timeout,

    #[error("no active profile")]
    NoActiveProfile,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub(crate) fn bad_value(msg: impl Into<String>) -> Self {
        ClientError::Mensago(MensagoError::BadValue(msg.into()))
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        ClientError::Mensago(MensagoError::NotFound(msg.into()))
    }

    pub(crate) fn exists(msg: impl Into<String>) -> Self {
        ClientError::Mensago(MensagoError::Exists(msg.into()))
    }

    /// The server status code, if this error came from a server response
    pub fn server_code(&self) -> Option<u16> {
        match self {
            ClientError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

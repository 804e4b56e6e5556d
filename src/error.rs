//! Error types for local-kube

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Duplicate application id: {0}")]
    DuplicateId(u32),

    #[error("Registry conflict: {0}")]
    RegistryConflict(String),

    #[error("No free service port in range {min}-{max}")]
    NoFreePort { min: u16, max: u16 },

    #[error("Container start failed for {instance}: {reason}")]
    ContainerStartFailed { instance: String, reason: String },

    #[error("Container stop failed for {instance}: {reason}")]
    ContainerStopFailed { instance: String, reason: String },

    #[error("Listener attach failed on port {port}: {reason}")]
    ListenerAttachFailed { port: u16, reason: String },

    #[error("Listener detach failed on port {port}: {reason}")]
    ListenerDetachFailed { port: u16, reason: String },

    #[error("Timeout exceeded during {step}")]
    TimeoutExceeded { step: String },

    #[error("Application {id} removed with {} teardown error(s): {}", .errors.len(), join(.errors))]
    StopIncomplete { id: u32, errors: Vec<Error> },

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable name of the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::NotFound(_) => "NotFound",
            Error::DuplicateId(_) => "DuplicateId",
            Error::RegistryConflict(_) => "RegistryConflict",
            Error::NoFreePort { .. } => "NoFreePort",
            Error::ContainerStartFailed { .. } => "ContainerStartFailed",
            Error::ContainerStopFailed { .. } => "ContainerStopFailed",
            Error::ListenerAttachFailed { .. } => "ListenerAttachFailed",
            Error::ListenerDetachFailed { .. } => "ListenerDetachFailed",
            Error::TimeoutExceeded { .. } => "TimeoutExceeded",
            Error::StopIncomplete { .. } => "StopIncomplete",
            Error::ShuttingDown => "ShuttingDown",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Sqlite(_) => "Sqlite",
        }
    }

    /// Whether the caller, not the orchestrator, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::NotFound(_))
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

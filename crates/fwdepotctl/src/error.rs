//! Error types and exit codes for fwdepotctl

use fwdepot_service::DepotError;
use thiserror::Error;

/// Failures raised by the CLI itself rather than the depot
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing capability: {0}")]
    MissingCapability(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Process exit code for a failed command
pub fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(depot) = error.downcast_ref::<DepotError>() {
        return depot_exit_code(depot);
    }

    match error.downcast_ref::<CliError>() {
        Some(CliError::InvalidArgument(_)) | Some(CliError::JsonError(_)) => 4,
        Some(CliError::MissingCapability(_)) => 3,
        Some(CliError::IoError(_)) | None => 1,
    }
}

fn depot_exit_code(error: &DepotError) -> u8 {
    match error {
        DepotError::NotFound(_) => 2,
        DepotError::PermissionDenied(_) => 3,
        DepotError::Validation(_)
        | DepotError::Corruption(_)
        | DepotError::UnsupportedFormat(_)
        | DepotError::DuplicateIdentity(_)
        | DepotError::DuplicateDeviceVersion(_)
        | DepotError::IdentifierReassigned(_) => 4,
        DepotError::Trust(_) | DepotError::SigningKeyUnavailable(_) => 5,
        DepotError::Timeout { .. } | DepotError::Storage(_) => 1,
    }
}

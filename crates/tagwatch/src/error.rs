use tagwatch_core::{ChecksumError, FetchError};
use tagwatch_platform::AppPathsError;
use thiserror::Error;

use crate::credentials::CredentialStoreError;

/// Failures that stop the command before it can report a result.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error("failed to prepare application directories: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialStoreError),
    #[error("failed to set up the release client: {0}")]
    Client(#[from] FetchError),
    #[error("failed to set up the package downloader: {0}")]
    Downloader(#[from] ChecksumError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

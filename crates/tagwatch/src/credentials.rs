use std::path::PathBuf;

use tagwatch_core::Credentials;
use thiserror::Error;

/// Environment variable whose token overrides the stored one.
pub const TOKEN_OVERRIDE_ENV: &str = "TAGWATCH_GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("failed to {action} stored token at {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where the operator's API token is persisted.
pub trait CredentialStore {
    fn get(&self) -> Result<Option<String>, CredentialStoreError>;
    fn set(&self, token: &str) -> Result<(), CredentialStoreError>;
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// Keeps the token in a single owner-only file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn io_error(&self, action: &'static str, source: std::io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            action,
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<String>, CredentialStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.io_error("read", error)),
        }
    }

    fn set(&self, token: &str) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| self.io_error("create", error))?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .map_err(|error| self.io_error("write", error))?;
        std::io::Write::write_all(&mut file, token.trim().as_bytes())
            .map_err(|error| self.io_error("write", error))
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error("remove", error)),
        }
    }
}

/// Active credentials: the override wins over whatever the store holds.
pub fn resolve_credentials(
    store: &dyn CredentialStore,
    override_token: Option<String>,
) -> Result<Credentials, CredentialStoreError> {
    Ok(Credentials::resolve(override_token, store.get()?))
}

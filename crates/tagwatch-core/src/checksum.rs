use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub const CHECKSUM_MISMATCH_CODE: &str = "checksum_mismatch";
pub const DOWNLOAD_FAILED_CODE: &str = "download_failed";

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP limits for package downloads. `timeout` bounds the whole transfer,
/// body included, so it is kept apart from the release API's limit.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            user_agent: crate::client::DEFAULT_USER_AGENT.to_string(),
            connect_timeout: DEFAULT_DOWNLOAD_CONNECT_TIMEOUT,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// What the host should do with a download it is about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageVerdict {
    /// Not ours to check; let the host download as usual.
    PassThrough,
    /// Downloaded and verified; the host installs from this file and owns it.
    Verified(PathBuf),
}

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("failed to build package download client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to download update package: {0}")]
    Download(#[source] reqwest::Error),
    #[error("update package download failed with HTTP {status}")]
    DownloadStatus { status: reqwest::StatusCode },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Update package checksum mismatch.")]
    Mismatch { expected: String, actual: String },
}

impl ChecksumError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    /// Stable code reported to the host's upgrader.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mismatch { .. } => CHECKSUM_MISMATCH_CODE,
            Self::ClientBuild(_)
            | Self::Download(_)
            | Self::DownloadStatus { .. }
            | Self::Io { .. } => DOWNLOAD_FAILED_CODE,
        }
    }
}

/// Downloads a package into a private directory and checks its SHA-256.
#[derive(Debug, Clone)]
pub struct ChecksumVerifier {
    http: reqwest::Client,
    download_dir: PathBuf,
}

impl ChecksumVerifier {
    #[must_use]
    pub fn new(http: reqwest::Client, download_dir: PathBuf) -> Self {
        Self { http, download_dir }
    }

    /// A verifier with its own HTTP client, limited by `options` rather than
    /// by the release API's timeout.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn build(options: &DownloadOptions, download_dir: PathBuf) -> Result<Self, ChecksumError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(ChecksumError::ClientBuild)?;
        Ok(Self::new(http, download_dir))
    }

    /// Intercept a download of `package_url`.
    ///
    /// Only the package this updater published last is verified, and only
    /// when an expected digest is configured; anything else passes through.
    ///
    /// # Errors
    /// Returns [`ChecksumError::Mismatch`] when the digest differs (the
    /// temporary file is removed first), or a download/IO error when the
    /// package could not be fetched.
    pub async fn verify_download(
        &self,
        package_url: &str,
        published_package: Option<&str>,
        expected_sha256: Option<&str>,
    ) -> Result<PackageVerdict, ChecksumError> {
        if published_package != Some(package_url) {
            debug!("Download {package_url} is not the published package, skipping verification");
            return Ok(PackageVerdict::PassThrough);
        }

        let Some(expected) = expected_sha256.map(str::trim).filter(|value| !value.is_empty())
        else {
            debug!("No expected checksum configured, skipping verification");
            return Ok(PackageVerdict::PassThrough);
        };

        info!("Verifying package checksum.");

        std::fs::create_dir_all(&self.download_dir).map_err(|error| {
            ChecksumError::io_with_path(
                "failed to create download directory",
                &self.download_dir,
                &error,
            )
        })?;
        let temp_path = tempfile::Builder::new()
            .prefix("package-")
            .suffix(".zip")
            .tempfile_in(&self.download_dir)
            .map_err(|error| ChecksumError::io("failed to create temporary package file", error))?
            .into_temp_path();

        download_file(&self.http, package_url, &temp_path).await?;
        let actual = sha256_file(&temp_path)?;

        if !digests_match(expected, &actual) {
            warn!("Checksum mismatch.");
            if let Err(error) = temp_path.close() {
                warn!("Failed to remove rejected package: {error}");
            }
            return Err(ChecksumError::Mismatch {
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }

        info!("Checksum verified.");
        let path = temp_path
            .keep()
            .map_err(|error| ChecksumError::io("failed to keep verified package", error.error))?;
        Ok(PackageVerdict::Verified(path))
    }
}

/// Case-insensitive, constant-time digest comparison.
#[must_use]
pub fn digests_match(expected: &str, actual: &str) -> bool {
    let expected = expected.trim().to_ascii_lowercase();
    let actual = actual.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), ChecksumError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(ChecksumError::Download)?;

    if !response.status().is_success() {
        return Err(ChecksumError::DownloadStatus {
            status: response.status(),
        });
    }

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        ChecksumError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ChecksumError::Download)?;
        file.write_all(&chunk).await.map_err(|error| {
            ChecksumError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|error| {
        ChecksumError::io_with_path("failed to flush download file", dest, &error)
    })?;

    debug!("Download complete: {downloaded} bytes");
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String, ChecksumError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        ChecksumError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            ChecksumError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

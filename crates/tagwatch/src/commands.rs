use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use serde_json::{Value, json};
use tagwatch_core::{ChecksumVerifier, PackageVerdict, ReleaseSource, UpdateResolver};

use crate::credentials::{CredentialStore, TOKEN_OVERRIDE_ENV};
use crate::error::AppError;

/// A command's JSON answer and the status the process exits with.
pub struct Outcome {
    pub output: Value,
    pub exit: ExitCode,
}

impl Outcome {
    fn success(output: Value) -> Self {
        Self {
            output,
            exit: ExitCode::SUCCESS,
        }
    }

    fn failure(output: Value) -> Self {
        Self {
            output,
            exit: ExitCode::FAILURE,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum VerifyOutput {
    PassThrough,
    Verified {
        path: PathBuf,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

pub async fn check<S: ReleaseSource>(resolver: &UpdateResolver<S>) -> Result<Outcome, AppError> {
    let descriptor = resolver.check_for_update().await;
    Ok(Outcome::success(serde_json::to_value(descriptor)?))
}

pub async fn info<S: ReleaseSource>(resolver: &UpdateResolver<S>) -> Result<Outcome, AppError> {
    let info = resolver.get_latest_version_info().await;
    Ok(Outcome::success(serde_json::to_value(info)?))
}

pub async fn test_connection<S: ReleaseSource>(
    resolver: &UpdateResolver<S>,
) -> Result<Outcome, AppError> {
    let report = resolver.test_connection().await;
    let output = serde_json::to_value(&report)?;
    Ok(if report.ok {
        Outcome::success(output)
    } else {
        Outcome::failure(output)
    })
}

pub async fn verify<S: ReleaseSource>(
    resolver: &UpdateResolver<S>,
    verifier: &ChecksumVerifier,
    package_url: &str,
) -> Result<Outcome, AppError> {
    let (verdict, failed) = match resolver.verify_download(verifier, package_url).await {
        Ok(PackageVerdict::PassThrough) => (VerifyOutput::PassThrough, false),
        Ok(PackageVerdict::Verified(path)) => (VerifyOutput::Verified { path }, false),
        Err(error) => (
            VerifyOutput::Error {
                code: error.code(),
                message: error.to_string(),
            },
            true,
        ),
    };

    let output = serde_json::to_value(&verdict)?;
    Ok(if failed {
        Outcome::failure(output)
    } else {
        Outcome::success(output)
    })
}

pub fn plugin_info<S: ReleaseSource>(
    resolver: &UpdateResolver<S>,
    slug: Option<&str>,
) -> Result<Outcome, AppError> {
    let slug = slug.unwrap_or(&resolver.config().plugin.slug);
    let information = resolver.plugin_information(slug);
    Ok(Outcome::success(serde_json::to_value(information)?))
}

pub fn token_set(store: &dyn CredentialStore, token: &str) -> Result<Outcome, AppError> {
    if token.trim().is_empty() {
        return Ok(Outcome::failure(json!({ "stored": false })));
    }
    store.set(token)?;
    log::info!("Stored API token");
    Ok(Outcome::success(json!({ "stored": true })))
}

pub fn token_clear(store: &dyn CredentialStore) -> Result<Outcome, AppError> {
    store.clear()?;
    log::info!("Cleared stored API token");
    Ok(Outcome::success(json!({ "stored": false })))
}

pub fn token_status(store: &dyn CredentialStore) -> Result<Outcome, AppError> {
    let stored = store.get()?.is_some();
    let env_override = std::env::var(TOKEN_OVERRIDE_ENV)
        .ok()
        .is_some_and(|value| !value.trim().is_empty());
    Ok(Outcome::success(json!({
        "stored": stored,
        "env_override": env_override,
    })))
}

mod commands;
mod credentials;
mod error;
mod logging;
mod settings;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tagwatch_core::{ChecksumVerifier, ReleaseClient, ResolverState, UpdateResolver};
use tagwatch_platform::AppPaths;

use crate::commands::Outcome;
use crate::credentials::{FileCredentialStore, TOKEN_OVERRIDE_ENV, resolve_credentials};
use crate::error::AppError;
use crate::settings::Settings;
use crate::state::StateFile;

#[derive(Debug, Parser)]
#[command(name = "tagwatch", version, about = "Resolve plugin updates from GitHub releases")]
struct Cli {
    /// Keep settings, state and logs under this directory instead of the
    /// platform defaults.
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Resolve(ResolveCommand),
    /// Manage the stored API token.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Debug, Subcommand)]
enum ResolveCommand {
    /// Run an update check and publish the result.
    Check,
    /// Show the newest stable release.
    Info,
    /// Check that the configured repository is reachable.
    TestConnection,
    /// Verify a package download before it is installed.
    Verify { url: String },
    /// Show plugin details for the information dialog.
    PluginInfo { slug: Option<String> },
}

#[derive(Debug, Subcommand)]
enum TokenAction {
    Set { token: String },
    Clear,
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => {
            println!("{}", outcome.output);
            outcome.exit
        }
        Err(error) => {
            eprintln!("tagwatch: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome, AppError> {
    let paths = match &cli.home {
        Some(root) => AppPaths::rooted(root),
        None => AppPaths::new()?,
    };
    paths.ensure_dirs()?;

    let settings_path = paths.settings_file();
    let (settings, warnings) = Settings::load_from_path(&settings_path);
    logging::init_logging(&paths, settings.debug_logging, settings.max_log_size_bytes);
    for warning in &warnings {
        log::warn!("{warning}");
        eprintln!("tagwatch: warning: {warning}");
    }
    if !settings_path.exists()
        && let Err(error) = settings.save_to_path(&settings_path)
    {
        log::warn!("Failed to write default settings to {}: {error}", settings_path.display());
    }

    let store = FileCredentialStore::new(paths.token_file());

    match cli.command {
        Command::Token { action } => match action {
            TokenAction::Set { token } => commands::token_set(&store, &token),
            TokenAction::Clear => commands::token_clear(&store),
            TokenAction::Status => commands::token_status(&store),
        },
        Command::Resolve(command) => resolve(command, &paths, &settings, &store).await,
    }
}

async fn resolve(
    command: ResolveCommand,
    paths: &AppPaths,
    settings: &Settings,
    store: &FileCredentialStore,
) -> Result<Outcome, AppError> {
    let credentials = resolve_credentials(store, std::env::var(TOKEN_OVERRIDE_ENV).ok())?;
    let client = ReleaseClient::new(&settings.client_options())?;
    let verifier = ChecksumVerifier::build(&settings.download_options(), paths.download_dir())?;

    let state = Arc::new(ResolverState::new(settings.cache_ttl()));
    let state_path = paths.state_file();
    let previous = StateFile::load_from_path(&state_path).unwrap_or_default();
    previous.restore_into(&state).await;

    let resolver = UpdateResolver::new(
        client,
        credentials,
        settings.resolver_config(),
        Arc::clone(&state),
    );

    let outcome = match command {
        ResolveCommand::Check => commands::check(&resolver).await?,
        ResolveCommand::Info => commands::info(&resolver).await?,
        ResolveCommand::TestConnection => commands::test_connection(&resolver).await?,
        ResolveCommand::Verify { url } => commands::verify(&resolver, &verifier, &url).await?,
        ResolveCommand::PluginInfo { slug } => {
            commands::plugin_info(&resolver, slug.as_deref())?
        }
    };

    let snapshot = StateFile::capture(&state, &previous).await;
    if let Err(error) = snapshot.save_to_path(&state_path) {
        log::warn!("Failed to save resolver state to {}: {error}", state_path.display());
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, ResolveCommand, TokenAction};
    use clap::Parser;

    #[test]
    fn parses_verify_with_home() {
        let cli = Cli::try_parse_from([
            "tagwatch",
            "verify",
            "https://dl.test/widget.zip",
            "--home",
            "/tmp/tagwatch",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.home.as_deref(), Some(std::path::Path::new("/tmp/tagwatch")));
        assert!(matches!(
            cli.command,
            Command::Resolve(ResolveCommand::Verify { url }) if url == "https://dl.test/widget.zip"
        ));
    }

    #[test]
    fn parses_token_and_plugin_info() {
        let cli = Cli::try_parse_from(["tagwatch", "token", "set", "ghp_x"])
            .expect("arguments should parse");
        assert!(matches!(
            cli.command,
            Command::Token { action: TokenAction::Set { token } } if token == "ghp_x"
        ));

        let cli = Cli::try_parse_from(["tagwatch", "plugin-info"])
            .expect("arguments should parse");
        assert!(matches!(
            cli.command,
            Command::Resolve(ResolveCommand::PluginInfo { slug: None })
        ));
    }

    #[test]
    fn verify_requires_url() {
        assert!(Cli::try_parse_from(["tagwatch", "verify"]).is_err());
    }
}

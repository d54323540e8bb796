use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagwatch_core::{
    Channel, ClientOptions, DEFAULT_API_BASE, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_USER_AGENT,
    DownloadOptions, PluginIdentity, RepositoryCoordinates, ResolverConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    #[serde(default)]
    pub asset_name: String,

    #[serde(default)]
    pub channel: Channel,

    #[serde(default)]
    pub expected_sha256: Option<String>,

    #[serde(default)]
    pub current_version: String,

    #[serde(default)]
    pub plugin_file: String,

    #[serde(default)]
    pub slug: String,

    #[serde(default)]
    pub plugin_name: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_download_timeout() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

fn default_http_timeout() -> u64 {
    15
}

fn default_cache_ttl() -> u64 {
    5 * 60
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            asset_name: String::new(),
            channel: Channel::Stable,
            expected_sha256: None,
            current_version: String::new(),
            plugin_file: String::new(),
            slug: String::new(),
            plugin_name: String::new(),
            author: String::new(),
            description: String::new(),
            debug_logging: false,
            http_timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            max_log_size_bytes: default_max_log_size_bytes(),
            user_agent: default_user_agent(),
            api_base_url: default_api_base_url(),
        }
    }
}

/// Accept any casing of a known channel and fall back to stable for anything
/// else, so one bad value cannot discard the rest of the file.
fn normalize_channel(value: &mut serde_json::Value, warnings: &mut Vec<String>) {
    let Some(fields) = value.as_object_mut() else {
        return;
    };
    let Some(raw) = fields.get("channel") else {
        return;
    };

    match raw.as_str().map(str::parse::<Channel>) {
        Some(Ok(channel)) => {
            fields.insert("channel".to_string(), channel.as_str().into());
        }
        Some(Err(error)) => {
            warnings.push(format!("{error}, using {}", Channel::Stable));
            fields.remove("channel");
        }
        None if raw.is_null() => {
            fields.remove("channel");
        }
        None => {
            warnings.push(format!(
                "update channel must be a string, got {raw}, using {}",
                Channel::Stable
            ));
            fields.remove("channel");
        }
    }
}

impl Settings {
    /// Read settings from `path`, along with warnings for values that were
    /// ignored. A missing file yields the defaults; an unreadable or
    /// malformed one yields the defaults and a warning.
    pub fn load_from_path(path: &Path) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        if !path.exists() {
            return (Self::default(), warnings);
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|error| error.to_string())
            .and_then(|content| {
                serde_json::from_str::<serde_json::Value>(&content)
                    .map_err(|error| error.to_string())
            })
            .and_then(|mut value| {
                normalize_channel(&mut value, &mut warnings);
                serde_json::from_value::<Self>(value).map_err(|error| error.to_string())
            });

        match parsed {
            Ok(settings) => (settings, warnings),
            Err(error) => {
                warnings.push(format!(
                    "Ignoring malformed settings in {}: {error}",
                    path.display()
                ));
                (Self::default(), warnings)
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Package downloads connect within the API timeout but may take
    /// `download_timeout_secs` to finish.
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.http_timeout_secs),
            timeout: Duration::from_secs(self.download_timeout_secs),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_base: self.api_base_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let slug = if self.slug.is_empty() {
            self.repo.clone()
        } else {
            self.slug.clone()
        };

        ResolverConfig {
            coordinates: RepositoryCoordinates::new(self.owner.trim(), self.repo.trim()),
            asset_name: self.asset_name.trim().to_string(),
            channel: self.channel,
            expected_sha256: self
                .expected_sha256
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            current_version: self.current_version.trim().to_string(),
            plugin: PluginIdentity {
                plugin_file: self.plugin_file.clone(),
                name: self.plugin_name.clone(),
                author: self.author.clone(),
                description: self.description.clone(),
                slug,
            },
        }
    }
}

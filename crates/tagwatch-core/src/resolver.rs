use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, info, warn};

use crate::asset::{find_named_asset, locate_asset};
use crate::cache::{CacheSnapshot, DEFAULT_TTL, ReleaseCache};
use crate::channel::resolve_channel;
use crate::checksum::{ChecksumError, ChecksumVerifier, PackageVerdict};
use crate::client::{FetchError, FetchFailureKind, ReleaseSource};
use crate::release::{
    Channel, ConnectionReport, Credentials, PluginInformation, PluginSections,
    RepositoryCoordinates, UpdateDescriptor, VersionInfo,
};
use crate::version::{is_newer_version, normalize_version};

/// How the host identifies the plugin being updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub slug: String,
    /// Host-side plugin identifier, e.g. `widget/widget.php`.
    pub plugin_file: String,
    pub name: String,
    pub author: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub coordinates: RepositoryCoordinates,
    pub asset_name: String,
    pub channel: Channel,
    pub expected_sha256: Option<String>,
    pub current_version: String,
    pub plugin: PluginIdentity,
}

/// State shared by every resolver operation: the release-info cache and the
/// descriptor most recently handed to the host.
pub struct ResolverState {
    cache: ReleaseCache,
    published: RwLock<Option<UpdateDescriptor>>,
}

impl Default for ResolverState {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResolverState {
    #[must_use]
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: ReleaseCache::new(cache_ttl),
            published: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ReleaseCache {
        &self.cache
    }

    pub async fn cached_version_info(&self) -> Option<CacheSnapshot> {
        self.cache.snapshot().await
    }

    #[must_use]
    pub fn published(&self) -> Option<UpdateDescriptor> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn published_package(&self) -> Option<String> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|descriptor| descriptor.package.clone())
    }

    /// Record the outcome of an update check. `None` withdraws any earlier
    /// descriptor.
    pub fn publish(&self, descriptor: Option<UpdateDescriptor>) {
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = descriptor;
    }
}

/// Resolves which release to install and whether to trust its package.
pub struct UpdateResolver<S> {
    source: S,
    credentials: Credentials,
    config: ResolverConfig,
    state: Arc<ResolverState>,
}

impl<S: ReleaseSource> UpdateResolver<S> {
    pub fn new(
        source: S,
        credentials: Credentials,
        config: ResolverConfig,
        state: Arc<ResolverState>,
    ) -> Self {
        Self {
            source,
            credentials,
            config,
            state,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ResolverState> {
        &self.state
    }

    /// Newest stable release for display, served from the cache while it is
    /// fresh. Never drives an update.
    pub async fn get_latest_version_info(&self) -> Option<VersionInfo> {
        let coordinates = &self.config.coordinates;
        if !coordinates.is_complete() {
            debug!("Owner or repo missing, no release info");
            return None;
        }

        let source = &self.source;
        let credentials = &self.credentials;
        self.state
            .cache
            .get_or_fetch(move || async move {
                let release =
                    resolve_channel(source, coordinates, credentials, Channel::Stable).await?;
                Ok::<_, FetchError>(VersionInfo {
                    version: normalize_version(&release.tag_name).to_string(),
                    url: release.html_url,
                })
            })
            .await
    }

    /// Work out the update descriptor for the configured channel.
    ///
    /// `Ok(None)` means there is nothing to offer: the release is not newer
    /// than the running version, or it has no download target.
    ///
    /// # Errors
    /// Returns the release lookup failure; callers treat it as "no
    /// information".
    pub async fn compute_update(&self) -> Result<Option<UpdateDescriptor>, FetchError> {
        let config = &self.config;
        info!("Checking updates.");

        if !config.coordinates.is_complete() {
            info!("Owner or repo missing.");
            return Ok(None);
        }
        if config.current_version.trim().is_empty() {
            info!("Running version unknown, nothing to compare against.");
            return Ok(None);
        }

        debug!(
            "Resolving {} channel for {} ({})",
            config.channel,
            config.coordinates,
            if self.credentials.is_present() {
                "authenticated"
            } else {
                "anonymous"
            }
        );
        let release = resolve_channel(
            &self.source,
            &config.coordinates,
            &self.credentials,
            config.channel,
        )
        .await?;

        let latest_version = normalize_version(&release.tag_name);
        let current_version = normalize_version(config.current_version.trim());
        if !is_newer_version(latest_version, current_version) {
            info!("No update available.");
            return Ok(None);
        }

        let Some(package) =
            locate_asset(&release, &config.asset_name).filter(|url| !url.is_empty())
        else {
            info!("Download URL missing.");
            return Ok(None);
        };

        info!("Update available: {current_version} -> {latest_version}");
        Ok(Some(UpdateDescriptor {
            slug: config.plugin.slug.clone(),
            plugin: config.plugin.plugin_file.clone(),
            new_version: latest_version.to_string(),
            package: package.to_string(),
            url: release.html_url.clone(),
        }))
    }

    /// The periodic update-check hook. Failures are absorbed, and the outcome
    /// (descriptor or nothing) becomes the published descriptor that decides
    /// which download gets verified.
    pub async fn check_for_update(&self) -> Option<UpdateDescriptor> {
        let descriptor = match self.compute_update().await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                match error.kind() {
                    FetchFailureKind::NoRelease => warn!("No release tag found."),
                    FetchFailureKind::Network | FetchFailureKind::Decode => {
                        warn!("Update check failed: {error}");
                    }
                }
                None
            }
        };
        self.state.publish(descriptor.clone());
        descriptor
    }

    /// Resolve the configured channel and report on it for the operator.
    /// Touches neither the cache nor the published descriptor.
    pub async fn test_connection(&self) -> ConnectionReport {
        let config = &self.config;
        if !config.coordinates.is_complete() {
            return ConnectionReport::failed(
                "GitHub owner and repo are required to test the connection.",
            );
        }

        let release = match resolve_channel(
            &self.source,
            &config.coordinates,
            &self.credentials,
            config.channel,
        )
        .await
        {
            Ok(release) => release,
            Err(error) => {
                debug!("Connection test failed: {error}");
                return ConnectionReport::failed(
                    "Could not fetch latest release. Check owner/repo or repo visibility.",
                );
            }
        };

        let version = normalize_version(&release.tag_name);
        let asset = config.asset_name.as_str();
        if !asset.is_empty() && find_named_asset(&release, asset).is_none() {
            return ConnectionReport::failed(format!(
                "Latest release found (v{version}), but asset \"{asset}\" is missing."
            ));
        }

        ConnectionReport::passed(format!("Connection OK. Latest release: v{version}."))
    }

    /// Verify a download the host is about to perform.
    ///
    /// # Errors
    /// See [`ChecksumVerifier::verify_download`].
    pub async fn verify_download(
        &self,
        verifier: &ChecksumVerifier,
        package_url: &str,
    ) -> Result<PackageVerdict, ChecksumError> {
        let published = self.state.published_package();
        verifier
            .verify_download(
                package_url,
                published.as_deref(),
                self.config.expected_sha256.as_deref(),
            )
            .await
    }

    /// Details for the host's plugin-information dialog; only answers for
    /// this plugin's slug.
    #[must_use]
    pub fn plugin_information(&self, slug: &str) -> Option<PluginInformation> {
        let plugin = &self.config.plugin;
        if slug.is_empty() || slug != plugin.slug {
            return None;
        }

        Some(PluginInformation {
            name: plugin.name.clone(),
            slug: plugin.slug.clone(),
            version: self.config.current_version.clone(),
            author: plugin.author.clone(),
            homepage: self.config.coordinates.homepage(),
            sections: PluginSections {
                description: plugin.description.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::tests::{FakeSource, release};

    fn config(current_version: &str, asset_name: &str, channel: Channel) -> ResolverConfig {
        ResolverConfig {
            coordinates: RepositoryCoordinates::new("acme", "widget"),
            asset_name: asset_name.to_string(),
            channel,
            expected_sha256: None,
            current_version: current_version.to_string(),
            plugin: PluginIdentity {
                slug: "widget".to_string(),
                plugin_file: "widget/widget.php".to_string(),
                name: "Widget".to_string(),
                author: "Acme".to_string(),
                description: "Adds widgets.".to_string(),
            },
        }
    }

    fn resolver(source: FakeSource, config: ResolverConfig) -> UpdateResolver<FakeSource> {
        UpdateResolver::new(
            source,
            Credentials::anonymous(),
            config,
            Arc::new(ResolverState::default()),
        )
    }

    #[tokio::test]
    async fn equal_versions_offer_no_update_even_with_prefix() {
        let resolver = resolver(
            FakeSource::with_latest(release("v1.0.0", false)),
            config("1.0.0", "widget.zip", Channel::Stable),
        );

        assert_eq!(resolver.compute_update().await.expect("lookup succeeds"), None);
    }

    #[tokio::test]
    async fn newer_release_produces_descriptor() {
        let resolver = resolver(
            FakeSource::with_latest(release("v1.0.1", false)),
            config("1.0.0", "widget.zip", Channel::Stable),
        );

        let descriptor = resolver
            .compute_update()
            .await
            .expect("lookup succeeds")
            .expect("newer release should be offered");

        assert_eq!(descriptor.new_version, "1.0.1");
        assert_eq!(descriptor.package, "https://dl.test/v1.0.1/widget.zip");
        assert_eq!(descriptor.url, "https://github.com/acme/widget/releases/tag/v1.0.1");
        assert_eq!(descriptor.slug, "widget");
        assert_eq!(descriptor.plugin, "widget/widget.php");
    }

    #[tokio::test]
    async fn missing_asset_uses_source_archive_then_gives_up() {
        let resolver_with_zipball = resolver(
            FakeSource::with_latest(release("v2.0.0", false)),
            config("1.0.0", "other.zip", Channel::Stable),
        );
        let descriptor = resolver_with_zipball
            .compute_update()
            .await
            .expect("lookup succeeds")
            .expect("source archive should stand in for the asset");
        assert_eq!(descriptor.package, "https://dl.test/v2.0.0/source.zip");

        let mut bare = release("v2.0.0", false);
        bare.zipball_url = None;
        let resolver_without = resolver(
            FakeSource::with_latest(bare),
            config("1.0.0", "other.zip", Channel::Stable),
        );
        assert_eq!(resolver_without.compute_update().await.expect("lookup succeeds"), None);
    }

    #[tokio::test]
    async fn beta_channel_offers_prerelease() {
        let source = FakeSource::with_latest(release("v2.0.0", false));
        source.set_recent(Some(vec![release("v2.1.0-beta.1", true), release("v2.0.0", false)]));
        let resolver = resolver(source, config("2.0.0", "widget.zip", Channel::Beta));

        let descriptor = resolver
            .compute_update()
            .await
            .expect("lookup succeeds")
            .expect("prerelease is newer than 2.0.0");

        assert_eq!(descriptor.new_version, "2.1.0-beta.1");
    }

    #[tokio::test]
    async fn incomplete_configuration_skips_the_network() {
        let mut incomplete = config("1.0.0", "widget.zip", Channel::Stable);
        incomplete.coordinates.repo = String::new();
        let no_repo = resolver(FakeSource::with_latest(release("v9.0.0", false)), incomplete);

        assert_eq!(no_repo.compute_update().await.expect("nothing to do"), None);
        assert_eq!(no_repo.get_latest_version_info().await, None);
        assert_eq!(no_repo.source.latest_calls(), 0);

        let unknown_version = resolver(
            FakeSource::with_latest(release("v9.0.0", false)),
            config("", "widget.zip", Channel::Stable),
        );
        assert_eq!(unknown_version.compute_update().await.expect("nothing to do"), None);
        assert_eq!(unknown_version.source.latest_calls(), 0);
    }

    #[tokio::test]
    async fn check_for_update_publishes_and_withdraws_descriptors() {
        let resolver = resolver(
            FakeSource::with_latest(release("v1.1.0", false)),
            config("1.0.0", "widget.zip", Channel::Stable),
        );

        let offered = resolver.check_for_update().await;
        assert!(offered.is_some());
        assert_eq!(
            resolver.state().published_package().as_deref(),
            Some("https://dl.test/v1.1.0/widget.zip")
        );

        resolver.source.set_latest(None);
        assert_eq!(resolver.check_for_update().await, None);
        assert_eq!(resolver.state().published(), None);
    }

    #[tokio::test]
    async fn latest_version_info_is_cached_and_stable_only() {
        let source = FakeSource::with_latest(release("v3.0.0", false));
        source.set_recent(Some(vec![release("v3.1.0-beta", true)]));
        let resolver = resolver(source, config("1.0.0", "widget.zip", Channel::Beta));

        let first = resolver.get_latest_version_info().await;
        let second = resolver.get_latest_version_info().await;

        assert_eq!(
            first,
            Some(VersionInfo {
                version: "3.0.0".to_string(),
                url: "https://github.com/acme/widget/releases/tag/v3.0.0".to_string(),
            })
        );
        assert_eq!(first, second);
        assert_eq!(resolver.source.latest_calls(), 1);
        assert_eq!(resolver.source.recent_calls(), 0);
    }

    #[tokio::test]
    async fn failed_lookup_returns_no_version_info() {
        let resolver = resolver(FakeSource::default(), config("1.0.0", "", Channel::Stable));

        assert_eq!(resolver.get_latest_version_info().await, None);
        assert!(resolver.state().cached_version_info().await.is_none());
    }

    #[tokio::test]
    async fn test_connection_reports_each_outcome() {
        let ok = resolver(
            FakeSource::with_latest(release("v1.4.2", false)),
            config("1.0.0", "widget.zip", Channel::Stable),
        );
        assert_eq!(
            ok.test_connection().await,
            ConnectionReport {
                ok: true,
                message: "Connection OK. Latest release: v1.4.2.".to_string(),
            }
        );

        let missing_asset = resolver(
            FakeSource::with_latest(release("v1.4.2", false)),
            config("1.0.0", "bundle.zip", Channel::Stable),
        );
        let report = missing_asset.test_connection().await;
        assert!(!report.ok);
        assert_eq!(
            report.message,
            "Latest release found (v1.4.2), but asset \"bundle.zip\" is missing."
        );

        let unreachable = resolver(
            FakeSource::default(),
            config("1.0.0", "widget.zip", Channel::Stable),
        );
        let report = unreachable.test_connection().await;
        assert!(!report.ok);
        assert!(report.message.starts_with("Could not fetch latest release."));

        let mut incomplete = config("1.0.0", "widget.zip", Channel::Stable);
        incomplete.coordinates.owner = " ".to_string();
        let report = resolver(FakeSource::default(), incomplete).test_connection().await;
        assert_eq!(
            report.message,
            "GitHub owner and repo are required to test the connection."
        );
    }

    #[tokio::test]
    async fn test_connection_has_no_side_effects() {
        let resolver = resolver(
            FakeSource::with_latest(release("v1.4.2", false)),
            config("1.0.0", "widget.zip", Channel::Stable),
        );

        resolver.test_connection().await;

        assert!(resolver.state().cached_version_info().await.is_none());
        assert_eq!(resolver.state().published(), None);
    }

    #[tokio::test]
    async fn plugin_information_answers_only_for_own_slug() {
        let resolver = resolver(FakeSource::default(), config("1.0.0", "", Channel::Stable));

        let info = resolver
            .plugin_information("widget")
            .expect("own slug should be answered");
        assert_eq!(info.name, "Widget");
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.homepage, "https://github.com/acme/widget");
        assert_eq!(info.sections.description, "Adds widgets.");

        assert!(resolver.plugin_information("gadget").is_none());
        assert!(resolver.plugin_information("").is_none());
    }
}

//! Release resolution for self-updating plugins.
//!
//! This crate decides which published release a plugin should move to and
//! whether the package it downloads can be trusted:
//! - Release lookup against a GitHub-style releases API.
//! - Stable/beta channel selection and asset location.
//! - Semantic version comparison.
//! - A short-lived cache of the latest release info.
//! - SHA-256 verification of the package the resolver published.

mod asset;
mod cache;
mod channel;
mod checksum;
mod client;
mod release;
mod resolver;
mod version;

/// Asset lookup inside a release.
pub use asset::{find_named_asset, locate_asset};
/// Release-info cache with a fixed lifetime.
pub use cache::{CacheSnapshot, DEFAULT_TTL, ReleaseCache};
/// Channel-aware release selection.
pub use channel::{BETA_SCAN_DEPTH, resolve_channel};
/// Package download verification.
pub use checksum::{
    CHECKSUM_MISMATCH_CODE, ChecksumError, ChecksumVerifier, DEFAULT_DOWNLOAD_CONNECT_TIMEOUT,
    DEFAULT_DOWNLOAD_TIMEOUT, DOWNLOAD_FAILED_CODE, DownloadOptions, PackageVerdict, digests_match,
};
/// Releases API client and the source trait it implements.
pub use client::{
    ClientOptions, DEFAULT_API_BASE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, FetchError,
    FetchFailureKind, RELEASES_MEDIA_TYPE, ReleaseClient, ReleaseSource,
};
/// Release, credential, and descriptor types.
pub use release::{
    AssetRecord, Channel, ConnectionReport, Credentials, ParseChannelError, PluginInformation,
    PluginSections, ReleaseRecord, RepositoryCoordinates, UpdateDescriptor, VersionInfo,
};
/// Orchestration of the operations the host calls.
pub use resolver::{PluginIdentity, ResolverConfig, ResolverState, UpdateResolver};
/// Version normalization and ordering.
pub use version::{compare_versions, is_newer_version, normalize_version};

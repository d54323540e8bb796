use crate::release::{AssetRecord, ReleaseRecord};

/// First asset whose name equals `asset_name` exactly.
#[must_use]
pub fn find_named_asset<'a>(release: &'a ReleaseRecord, asset_name: &str) -> Option<&'a AssetRecord> {
    if asset_name.is_empty() {
        return None;
    }
    release.assets.iter().find(|asset| asset.name == asset_name)
}

/// Download URL for the configured asset, falling back to the release's
/// source archive. `None` means the release has nothing to download.
#[must_use]
pub fn locate_asset<'a>(release: &'a ReleaseRecord, asset_name: &str) -> Option<&'a str> {
    find_named_asset(release, asset_name)
        .map(|asset| asset.browser_download_url.as_str())
        .or_else(|| release.zipball_url.as_deref().filter(|url| !url.is_empty()))
}

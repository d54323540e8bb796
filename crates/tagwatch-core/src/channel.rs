use log::{debug, warn};

use crate::client::{FetchError, ReleaseSource};
use crate::release::{Channel, Credentials, ReleaseRecord, RepositoryCoordinates};

/// How many recent releases the beta channel scans for a prerelease.
pub const BETA_SCAN_DEPTH: u8 = 10;

/// Pick the release a channel should install.
///
/// `Stable` is the latest non-prerelease. `Beta` is the newest prerelease
/// among the recent releases, falling back to the latest stable one when the
/// scan finds none or cannot be fetched.
///
/// # Errors
/// Returns the stable lookup's error when no release could be resolved.
pub async fn resolve_channel<S>(
    source: &S,
    coordinates: &RepositoryCoordinates,
    credentials: &Credentials,
    channel: Channel,
) -> Result<ReleaseRecord, FetchError>
where
    S: ReleaseSource + ?Sized,
{
    if channel == Channel::Beta {
        match source
            .fetch_recent(coordinates, credentials, BETA_SCAN_DEPTH)
            .await
        {
            Ok(releases) => {
                if let Some(prerelease) = releases.into_iter().find(|release| release.prerelease) {
                    debug!("Beta channel resolved to prerelease {}", prerelease.tag_name);
                    return Ok(prerelease);
                }
                debug!("No prerelease among recent releases of {coordinates}, using stable");
            }
            Err(error) => {
                warn!("Prerelease scan for {coordinates} failed, using stable: {error}");
            }
        }
    }

    source.fetch_latest(coordinates, credentials).await
}

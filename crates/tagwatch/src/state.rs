use std::io::Write;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tagwatch_core::{ResolverState, UpdateDescriptor, VersionInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVersionInfo {
    pub info: VersionInfo,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedUpdate {
    pub descriptor: UpdateDescriptor,
    pub published_at: DateTime<Utc>,
}

/// Resolver state carried from one invocation to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub latest: Option<CachedVersionInfo>,
    #[serde(default)]
    pub published: Option<PublishedUpdate>,
}

impl StateFile {
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data)
    }

    /// Seed a fresh [`ResolverState`] with what an earlier invocation left.
    pub async fn restore_into(&self, state: &ResolverState) {
        if let Some(latest) = &self.latest
            && let Ok(age) = (Utc::now() - latest.cached_at).to_std()
        {
            state.cache().restore(latest.info.clone(), age).await;
        }

        if let Some(published) = &self.published {
            state.publish(Some(published.descriptor.clone()));
        }
    }

    /// Snapshot `state`, keeping the earlier publish time when the
    /// descriptor has not changed since `previous`.
    pub async fn capture(state: &ResolverState, previous: &StateFile) -> Self {
        let now = Utc::now();

        let latest = state.cached_version_info().await.map(|snapshot| {
            let age = TimeDelta::from_std(snapshot.age).unwrap_or_default();
            CachedVersionInfo {
                info: snapshot.info,
                cached_at: now - age,
            }
        });

        let published = state.published().map(|descriptor| {
            let published_at = previous
                .published
                .as_ref()
                .filter(|earlier| earlier.descriptor == descriptor)
                .map_or(now, |earlier| earlier.published_at);
            PublishedUpdate {
                descriptor,
                published_at,
            }
        });

        Self { latest, published }
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "state path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".state-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

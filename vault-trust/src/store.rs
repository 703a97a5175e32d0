//! Trust profile store collaborator: CRUD on `UserTrustProfile` keyed
//! by `user_id`. The default implementation is a per-user JSON file in
//! a configured directory (`<data_dir>/<user_id>_profile.json`).

use crate::types::UserTrustProfile;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use vault_core::{VaultError, VaultResult};

#[async_trait]
pub trait TrustProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> VaultResult<Option<UserTrustProfile>>;
    async fn save(&self, profile: &UserTrustProfile) -> VaultResult<()>;
}

/// JSON-file-backed store, one file per user under `data_dir`.
#[derive(Debug, Clone)]
pub struct JsonFileTrustProfileStore {
    data_dir: PathBuf,
}

impl JsonFileTrustProfileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn profile_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("{user_id}_profile.json"))
    }
}

#[async_trait]
impl TrustProfileStore for JsonFileTrustProfileStore {
    async fn load(&self, user_id: &str) -> VaultResult<Option<UserTrustProfile>> {
        let path = self.profile_path(user_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let profile = serde_json::from_str(&content).map_err(|e| {
                    VaultError::Persistence(format!("corrupt trust profile at {path:?}: {e}"))
                })?;
                Ok(Some(profile))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Persistence(format!(
                "failed to read trust profile at {path:?}: {e}"
            ))),
        }
    }

    async fn save(&self, profile: &UserTrustProfile) -> VaultResult<()> {
        if let Err(e) = tokio::fs::create_dir_all(&self.data_dir).await {
            return Err(VaultError::Persistence(format!(
                "failed to create trust data dir {:?}: {e}",
                self.data_dir
            )));
        }
        let path = self.profile_path(&profile.user_id);
        debug!(user_id = %profile.user_id, path = ?path, "persisting trust profile");
        let content = serde_json::to_string_pretty(profile)
            .map_err(|e| VaultError::Persistence(format!("failed to serialize trust profile: {e}")))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| VaultError::Persistence(format!("failed to write trust profile at {path:?}: {e}")))
    }
}

/// In-memory store, useful in tests and for callers that do not want
/// persistence.
#[derive(Debug, Default)]
pub struct InMemoryTrustProfileStore {
    profiles: parking_lot::Mutex<std::collections::HashMap<String, UserTrustProfile>>,
}

impl InMemoryTrustProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrustProfileStore for InMemoryTrustProfileStore {
    async fn load(&self, user_id: &str) -> VaultResult<Option<UserTrustProfile>> {
        Ok(self.profiles.lock().get(user_id).cloned())
    }

    async fn save(&self, profile: &UserTrustProfile) -> VaultResult<()> {
        self.profiles
            .lock()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

/// Whether `path` looks like it is inside an existing, writable data
/// directory root. Used by `System::initialize` to fail fast on a
/// misconfigured `data_dir` rather than discover it on first write.
pub fn is_plausible_data_dir(path: &Path) -> bool {
    path.parent().map(|p| p.exists() || p == Path::new("")).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserTrustProfile;

    #[tokio::test]
    async fn json_store_round_trips_a_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTrustProfileStore::new(dir.path());

        let mut profile = UserTrustProfile::new("user-42");
        profile.baseline_score = 72.5;
        profile.total_evaluations = 3;

        store.save(&profile).await.unwrap();
        let loaded = store.load("user-42").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "user-42");
        assert_eq!(loaded.total_evaluations, 3);
    }

    #[tokio::test]
    async fn json_store_returns_none_for_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTrustProfileStore::new(dir.path());
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryTrustProfileStore::new();
        let profile = UserTrustProfile::new("user-7");
        store.save(&profile).await.unwrap();
        let loaded = store.load("user-7").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "user-7");
    }
}

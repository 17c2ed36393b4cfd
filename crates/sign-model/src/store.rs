//! Artifact persistence.
//!
//! The filesystem layout is `<root>/<model_id>/<version>.json` plus a
//! `CURRENT` pointer naming the live version. Saving writes the new version
//! file first and then swaps the pointer with a rename, so readers only ever
//! see a complete artifact.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;

use sign_core::{Error, ModelId, Result};

use crate::artifact::{ArtifactVersion, TrainedArtifact};

const POINTER_FILE: &str = "CURRENT";

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new artifact, superseding any previous one for the model.
    async fn save(&self, artifact: &TrainedArtifact) -> Result<()>;

    /// Load the live artifact, or [`Error::ModelNotFound`].
    async fn load(&self, model_id: &ModelId) -> Result<TrainedArtifact>;

    /// Remove every version. Returns whether anything existed.
    async fn delete(&self, model_id: &ModelId) -> Result<bool>;

    /// Cheap lookup of the live version used for cache freshness.
    async fn version(&self, model_id: &ModelId) -> Result<Option<ArtifactVersion>>;
}

/// Reject identifiers that could escape the store root.
fn check_model_id(model_id: &ModelId) -> Result<()> {
    let id = model_id.as_str();
    if id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.contains("..")
    {
        return Err(Error::InvalidInput(format!("Invalid model id: {:?}", id)));
    }
    Ok(())
}

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, model_id: &ModelId) -> Result<PathBuf> {
        check_model_id(model_id)?;
        Ok(self.root.join(model_id.as_str()))
    }

    async fn read_pointer(&self, dir: &Path) -> Result<Option<ArtifactVersion>> {
        match fs::read(dir.join(POINTER_FILE)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of superseded version files.
    async fn prune(&self, dir: &Path, keep: &ArtifactVersion) {
        let keep_name = format!("{}.json", keep.id);
        let Ok(mut entries) = fs::read_dir(dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") && name != keep_name {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    tracing::warn!("Failed to prune {}: {}", name, e);
                }
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, artifact: &TrainedArtifact) -> Result<()> {
        let dir = self.model_dir(&artifact.model_id)?;
        fs::create_dir_all(&dir).await?;

        let version_path = dir.join(format!("{}.json", artifact.version.id));
        fs::write(&version_path, artifact.to_bytes()?).await?;

        let tmp = dir.join(format!("{}.tmp", POINTER_FILE));
        fs::write(&tmp, serde_json::to_vec(&artifact.version)?).await?;
        fs::rename(&tmp, dir.join(POINTER_FILE)).await?;

        self.prune(&dir, &artifact.version).await;

        tracing::info!(
            "Saved artifact {} version {}",
            artifact.model_id,
            artifact.version.id
        );
        Ok(())
    }

    async fn load(&self, model_id: &ModelId) -> Result<TrainedArtifact> {
        let dir = self.model_dir(model_id)?;
        let version = self
            .read_pointer(&dir)
            .await?
            .ok_or_else(|| Error::ModelNotFound(model_id.to_string()))?;

        let bytes = match fs::read(dir.join(format!("{}.json", version.id))).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ModelNotFound(model_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        TrainedArtifact::from_bytes(&bytes)
    }

    async fn delete(&self, model_id: &ModelId) -> Result<bool> {
        let dir = self.model_dir(model_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn version(&self, model_id: &ModelId) -> Result<Option<ArtifactVersion>> {
        let dir = self.model_dir(model_id)?;
        self.read_pointer(&dir).await
    }
}

/// Process-local store, used in tests and for ephemeral engines.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<ModelId, TrainedArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, artifact: &TrainedArtifact) -> Result<()> {
        self.artifacts
            .write()
            .insert(artifact.model_id.clone(), artifact.clone());
        Ok(())
    }

    async fn load(&self, model_id: &ModelId) -> Result<TrainedArtifact> {
        self.artifacts
            .read()
            .get(model_id)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound(model_id.to_string()))
    }

    async fn delete(&self, model_id: &ModelId) -> Result<bool> {
        Ok(self.artifacts.write().remove(model_id).is_some())
    }

    async fn version(&self, model_id: &ModelId) -> Result<Option<ArtifactVersion>> {
        Ok(self.artifacts.read().get(model_id).map(|a| a.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::sample_artifact;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("sign-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_fs_save_load_supersede() {
        let root = temp_root();
        let store = FsArtifactStore::new(&root);
        let id = ModelId::new("user-model");

        assert!(store.version(&id).await.unwrap().is_none());
        assert!(store.load(&id).await.unwrap_err().is_not_found());

        let first = sample_artifact("user-model");
        store.save(&first).await.unwrap();
        assert_eq!(store.version(&id).await.unwrap(), Some(first.version));

        let second = sample_artifact("user-model");
        store.save(&second).await.unwrap();
        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.version, second.version);

        // only the live version file and the pointer remain
        let mut count = 0;
        let mut entries = fs::read_dir(root.join("user-model")).await.unwrap();
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.version(&id).await.unwrap().is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_fs_rejects_path_escape() {
        let store = FsArtifactStore::new(temp_root());
        for id in ["../evil", "a/b", "", ".hidden"] {
            let err = store.version(&ModelId::new(id)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}", id);
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryArtifactStore::new();
        let artifact = sample_artifact("m");
        store.save(&artifact).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.version(&ModelId::new("m")).await.unwrap(),
            Some(artifact.version)
        );
        assert!(store.delete(&ModelId::new("m")).await.unwrap());
        assert!(store
            .load(&ModelId::new("m"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}

//! Content-addressed cache of step outputs.
//!
//! A step's output is stored under
//! `<artifacts>/cache/<step>/<sha256(step, inputs)>.json` and reused when the
//! same step runs again with identical inputs. Only steps whose output is a
//! pure function of their inputs are cached.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::PipelineError;

/// Key of a cached step output: hex-encoded SHA-256 of the step name and
/// its JSON-serialized inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<I: Serialize + ?Sized>(step: &str, inputs: &I) -> Result<Self, PipelineError> {
        let encoded = serde_json::to_vec(inputs)?;

        let mut hasher = Sha256::new();
        hasher.update(step.as_bytes());
        hasher.update([0u8]);
        hasher.update(&encoded);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Step output cache rooted in the artifact directory.
#[derive(Debug, Clone)]
pub struct StepCache {
    root: PathBuf,
    enabled: bool,
}

impl StepCache {
    pub fn new(artifact_root: &Path, enabled: bool) -> Self {
        Self {
            root: artifact_root.join("cache"),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn entry_path(&self, step: &str, key: &CacheKey) -> PathBuf {
        self.root.join(step).join(format!("{}.json", key.as_str()))
    }

    /// Returns the cached output, if caching is enabled and an entry exists.
    ///
    /// An unreadable entry is treated as a miss.
    pub async fn load<T: DeserializeOwned>(&self, step: &str, key: &CacheKey) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(step, key);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!(step = step, key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(step = step, path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    /// Stores a step output. Does nothing when caching is disabled.
    pub async fn store<T: Serialize>(
        &self,
        step: &str,
        key: &CacheKey,
        value: &T,
    ) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.entry_path(step, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(value)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_depends_on_step_and_inputs() {
        let a = CacheKey::new("clean_documents", &vec![1, 2, 3]).unwrap();
        let b = CacheKey::new("clean_documents", &vec![1, 2, 3]).unwrap();
        let c = CacheKey::new("clean_documents", &vec![1, 2]).unwrap();
        let d = CacheKey::new("other_step", &vec![1, 2, 3]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StepCache::new(dir.path(), true);
        let key = CacheKey::new("step", "input").unwrap();

        assert!(cache.load::<Vec<String>>("step", &key).await.is_none());

        cache
            .store("step", &key, &vec!["out".to_string()])
            .await
            .unwrap();
        let loaded: Vec<String> = cache.load("step", &key).await.unwrap();
        assert_eq!(loaded, vec!["out".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StepCache::new(dir.path(), false);
        let key = CacheKey::new("step", "input").unwrap();

        cache.store("step", &key, &42u32).await.unwrap();
        assert!(cache.load::<u32>("step", &key).await.is_none());
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StepCache::new(dir.path(), true);
        let key = CacheKey::new("step", "input").unwrap();

        let path = dir
            .path()
            .join("cache")
            .join("step")
            .join(format!("{}.json", key.as_str()));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        assert!(cache.load::<u32>("step", &key).await.is_none());
    }
}

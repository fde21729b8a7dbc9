//! Deck storage
//!
//! Blobs are addressed by relative paths such as
//! `submissions/{id}/deck.pdf`.

use async_trait::async_trait;
use deckflow_common::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Path-addressed document storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
    /// Missing blobs are not an error
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Blob store rooted in a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("Invalid blob path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        tracing::debug!(path, bytes = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("submissions/a/deck.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(store.get("submissions/a/deck.pdf").await.unwrap(), b"%PDF-1.4");

        store.delete("submissions/a/deck.pdf").await.unwrap();
        store.delete("submissions/a/deck.pdf").await.unwrap();
        assert!(matches!(
            store.get("submissions/a/deck.pdf").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for path in ["../secret", "/etc/passwd", "a/../../b", ""] {
            assert!(store.put(path, b"x").await.is_err(), "{} accepted", path);
        }
    }
}

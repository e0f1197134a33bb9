//! Local directory acting as a bucket

use crate::{BucketObject, ObjectBucket};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// A directory whose files are the bucket's objects.
///
/// Object names use `/` separators and map onto nested directories.
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.is_empty() || escapes {
            anyhow::bail!("Invalid object name: '{name}'");
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }
}

/// Walk `root` and return every file as a `/`-separated relative name.
async fn list_files(root: &Path) -> Result<Vec<BucketObject>> {
    let mut results = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == root => {
                return Ok(results);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read directory: {}", dir.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .with_context(|| format!("Failed to get metadata for: {}", entry_path.display()))?;

            if metadata.is_dir() {
                pending.push(entry_path);
            } else if metadata.is_file() {
                let relative = entry_path.strip_prefix(root).with_context(|| {
                    format!("{} is outside {}", entry_path.display(), root.display())
                })?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                results.push(BucketObject {
                    name,
                    size: metadata.len(),
                });
            }
        }
    }

    Ok(results)
}

#[async_trait]
impl ObjectBucket for LocalBucket {
    fn display_name(&self) -> String {
        self.root.display().to_string()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BucketObject>> {
        let mut results: Vec<BucketObject> = list_files(&self.root)
            .await?
            .into_iter()
            .filter(|o| o.name.starts_with(prefix))
            .collect();

        // Sort for consistent ordering
        results.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            "Listed {} files under '{}' in: {}",
            results.len(),
            prefix,
            self.root.display()
        );

        Ok(results)
    }

    async fn upload_file(&self, name: &str, source: &Path) -> Result<()> {
        let path = self.path_for(name)?;
        Self::ensure_parent(&path).await?;
        tokio::fs::copy(source, &path).await.with_context(|| {
            format!("Failed to copy {} to {}", source.display(), path.display())
        })?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete file: {}", path.display()))
    }

    fn object_url(&self, name: &str) -> String {
        format!("file://{}", self.root.join(name).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_and_list_under_prefix() {
        let sources = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let bucket = LocalBucket::new(temp_dir.path().to_path_buf());

        for (name, content) in [
            ("parcels/1.jpg", &b"one"[..]),
            ("parcels/2.png", &b"two!"[..]),
            ("roads/9.pdf", &b"nine"[..]),
        ] {
            let source = source_file(&sources, "upload.bin", content);
            bucket.upload_file(name, &source).await.unwrap();
        }

        let objects = bucket.list("parcels/").await.unwrap();
        assert_eq!(
            objects,
            vec![
                BucketObject {
                    name: "parcels/1.jpg".to_string(),
                    size: 3
                },
                BucketObject {
                    name: "parcels/2.png".to_string(),
                    size: 4
                },
            ]
        );
        assert_eq!(bucket.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_file_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("export.zip");
        std::fs::write(&source, "zip bytes").unwrap();

        let bucket = LocalBucket::new(temp_dir.path().join("bucket"));
        bucket
            .upload_file("Parcels_01_Jan_2024.gdb.zip", &source)
            .await
            .unwrap();
        assert_eq!(bucket.list("Parcels").await.unwrap().len(), 1);

        bucket.delete("Parcels_01_Jan_2024.gdb.zip").await.unwrap();
        assert!(bucket.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = LocalBucket::new(temp_dir.path().join("missing"));
        assert!(bucket.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_file(&temp_dir, "x.txt", b"x");
        let bucket = LocalBucket::new(temp_dir.path().join("bucket"));
        let result = bucket.upload_file("../outside.txt", &source).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_object_url() {
        let bucket = LocalBucket::new(PathBuf::from("/srv/bucket"));
        assert_eq!(bucket.object_url("parcels/1.jpg"), "file:///srv/bucket/parcels/1.jpg");
    }
}

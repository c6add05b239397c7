//! Sidecar metadata store
//!
//! Each upload is a binary plus a pretty-printed `<id>.meta.json` next to
//! it. The sidecar is the record of truth; a sidecar whose binary has gone
//! is an orphan and gets purged when files are listed.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::Path;

use super::layout::{generate_file_id, StorageLayout, META_SUFFIX};
use crate::error::{Error, Result};
use crate::types::{AnalysisResult, FileCategory, FileError, StoredFile};

/// Filesystem-backed store of [`StoredFile`] records
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: StorageLayout,
}

impl MetadataStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Persist a new upload: binary first, then its sidecar
    pub async fn create(&self, original_name: &str, mime_type: &str, data: &[u8]) -> Result<StoredFile> {
        let id = generate_file_id();
        let name = StorageLayout::storage_name(&id, original_name);
        let binary_path = self.layout.binary_path(&name)?;

        tokio::fs::create_dir_all(self.layout.root()).await?;
        tokio::fs::write(&binary_path, data).await?;

        let file = StoredFile {
            id,
            name,
            original_name: original_name.to_string(),
            size: data.len() as u64,
            mime_type: mime_type.to_string(),
            category: FileCategory::from_mime(mime_type),
            uploaded_at: Utc::now(),
            storage_path: binary_path.to_string_lossy().to_string(),
            analysis: None,
            errors: None,
        };

        if let Err(e) = self.save(&file).await {
            // don't leave a binary without a record
            let _ = tokio::fs::remove_file(&binary_path).await;
            return Err(e);
        }

        tracing::info!(
            "Stored upload {} ({}, {} bytes) as {}",
            file.original_name,
            file.mime_type,
            file.size,
            file.id
        );
        Ok(file)
    }

    /// Write the sidecar for a record
    pub async fn save(&self, file: &StoredFile) -> Result<()> {
        let meta_path = self.layout.meta_path(&file.id)?;
        let json = serde_json::to_string_pretty(file)?;
        write_atomic(&meta_path, json.as_bytes()).await
    }

    /// Load one record
    pub async fn load(&self, id: &str) -> Result<StoredFile> {
        let meta_path = self.layout.meta_path(id)?;
        let content = match tokio::fs::read_to_string(&meta_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::not_found(format!("File not found: {}", id)));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// All records whose binary still exists, newest first.
    ///
    /// Orphaned sidecars are deleted; unreadable sidecars are skipped.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.ends_with(META_SUFFIX) {
                continue;
            }
            let path = entry.path();

            let record = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<StoredFile>(&content),
                Err(e) => {
                    tracing::warn!("Could not read sidecar {}: {}", path.display(), e);
                    continue;
                }
            };
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping corrupt sidecar {}: {}", path.display(), e);
                    continue;
                }
            };

            let binary_exists = match self.layout.binary_path(&record.name) {
                Ok(binary) => tokio::fs::try_exists(&binary).await.unwrap_or(false),
                Err(_) => false,
            };

            if binary_exists {
                files.push(record);
            } else {
                tracing::info!("Purging orphaned sidecar for {}", record.id);
                remove_if_exists(&path).await?;
            }
        }

        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    /// Delete a record and its binary
    pub async fn delete(&self, id: &str) -> Result<StoredFile> {
        let file = self.load(id).await?;

        match self.layout.binary_path(&file.name) {
            Ok(binary) => {
                if let Err(e) = tokio::fs::remove_file(&binary).await {
                    tracing::warn!("Could not delete file {}: {}", binary.display(), e);
                }
            }
            Err(e) => tracing::warn!("Sidecar {} names an invalid binary: {}", id, e),
        }

        remove_if_exists(&self.layout.meta_path(id)?).await?;
        tracing::info!("Deleted file {} ({})", file.id, file.original_name);
        Ok(file)
    }

    /// Remove every regular file in the upload root; returns how many went
    pub async fn clear_all(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!("Could not delete file {}: {}", path.display(), e),
            }
        }

        tracing::info!("Cleared {} files from {}", deleted, self.layout.root().display());
        Ok(deleted)
    }

    /// Replace the analysis on a record
    pub async fn attach_analysis(
        &self,
        id: &str,
        analysis: AnalysisResult,
        errors: Vec<FileError>,
    ) -> Result<StoredFile> {
        let mut file = self.load(id).await?;
        file.analysis = Some(analysis);
        file.errors = Some(errors);
        self.save(&file).await?;
        Ok(file)
    }
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Write via a temp file and rename, so readers never see a partial file
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::internal(format!("Bad target path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complexity;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> MetadataStore {
        MetadataStore::new(StorageLayout::new(dir.path()))
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let file = store.create("Pour Log.txt", "text/plain", b"day 1").await.unwrap();
        assert!(file.name.ends_with(".txt"));
        assert_eq!(file.size, 5);
        assert_eq!(file.category, FileCategory::Document);
        assert!(dir.path().join(&file.name).exists());

        let loaded = store.load(&file.id).await.unwrap();
        assert_eq!(loaded.original_name, "Pour Log.txt");
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).load("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_purges_orphans() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let kept = store.create("a.txt", "text/plain", b"a").await.unwrap();
        let orphan = store.create("b.txt", "text/plain", b"b").await.unwrap();
        std::fs::remove_file(dir.path().join(&orphan.name)).unwrap();
        std::fs::write(dir.path().join("junk.meta.json"), "{not json").unwrap();

        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, kept.id);
        assert!(!dir.path().join(format!("{}.meta.json", orphan.id)).exists());
        // corrupt sidecars are skipped, not deleted
        assert!(dir.path().join("junk.meta.json").exists());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut older = store.create("old.txt", "text/plain", b"o").await.unwrap();
        older.uploaded_at -= chrono::Duration::hours(1);
        store.save(&older).await.unwrap();
        let newer = store.create("new.txt", "text/plain", b"n").await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_binary() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let file = store.create("a.pdf", "application/pdf", b"%PDF").await.unwrap();
        std::fs::remove_file(dir.path().join(&file.name)).unwrap();
        store.delete(&file.id).await.unwrap();
        assert!(matches!(store.delete(&file.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_all_skips_directories() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("a.txt", "text/plain", b"a").await.unwrap();
        std::fs::create_dir(dir.path().join("split_x")).unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(dir.path().join("split_x").exists());
    }

    #[tokio::test]
    async fn test_attach_analysis() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let file = store.create("a.rs", "text/x-rust", b"fn main() {}").await.unwrap();

        let analysis = AnalysisResult {
            complexity: Complexity::Low,
            summary: "entry point".into(),
            ..AnalysisResult::unavailable()
        };
        store.attach_analysis(&file.id, analysis, Vec::new()).await.unwrap();

        let loaded = store.load(&file.id).await.unwrap();
        assert_eq!(loaded.analysis.unwrap().summary, "entry point");
        assert_eq!(loaded.errors.unwrap().len(), 0);
        // no temp file left behind
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}

//! On-disk naming scheme for uploads and derived outputs
//!
//! ```text
//! <root>/<id>.<ext>             binary
//! <root>/<id>.meta.json         sidecar
//! <root>/split_<id>/*.docx      split chunks
//! <root>/split_<id>.zip         aggregate of the chunks
//! <root>/modified/<name>        corrected spreadsheets
//! ```

use rand::Rng;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Suffix of metadata sidecar files
pub const META_SUFFIX: &str = ".meta.json";

/// Path builder rooted at the upload directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    modified_subdir: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modified_subdir: "modified".to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            root: config.upload_dir.clone(),
            modified_subdir: config.modified_subdir.clone(),
        }
    }

    /// Create the root and the modified-output directory
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.modified_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Binary for a storage name (`<id>.<ext>`)
    pub fn binary_path(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn meta_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("{}{}", id, META_SUFFIX)))
    }

    pub fn split_dir(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("split_{}", id)))
    }

    pub fn split_zip(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("split_{}.zip", id)))
    }

    /// One chunk inside a split output directory
    pub fn split_file(&self, id: &str, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.split_dir(id)?.join(file_name))
    }

    pub fn modified_dir(&self) -> PathBuf {
        self.root.join(&self.modified_subdir)
    }

    pub fn modified_file(&self, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.modified_dir().join(file_name))
    }

    /// Storage name for a new upload: `<id>.<ext>`, or just `<id>` without an extension
    pub fn storage_name(id: &str, original_name: &str) -> String {
        match crate::types::extension_of(original_name) {
            Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{}.{}", id, ext)
            }
            _ => id.to_string(),
        }
    }
}

/// Ids are restricted to `[A-Za-z0-9_-]+` so they cannot escape the root
pub fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::validation(format!("Invalid file id: {:?}", id)))
    }
}

/// A single path component: no separators, no `.`/`..`, no NUL
pub fn validate_file_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(Error::validation(format!("Invalid file name: {:?}", name)))
    } else {
        Ok(())
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// New file id: base36 unix millis followed by base36 random bits
pub fn generate_file_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let random: u64 = rand::thread_rng().gen();
    format!("{}{}", to_base36(millis), to_base36(random))
}

//! Stored file record and category detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::analysis::{AnalysisResult, FileError};

/// Broad file category, derived from the MIME type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Code,
    Image,
    Video,
    Audio,
    Data,
    Config,
    Test,
    Archive,
    #[default]
    #[serde(other)]
    Other,
}

const CODE_MIME_TYPES: &[&str] = &[
    "application/javascript",
    "application/typescript",
    "application/x-python-code",
];

const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    "application/x-tar",
];

const DATA_MIME_TYPES: &[&str] = &[
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/pdf",
];

impl FileCategory {
    /// Classify a MIME type.
    ///
    /// Any `text/*` type counts as a document, so `text/html` and friends
    /// never reach the code check.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            return Self::Image;
        }
        if mime.starts_with("video/") {
            return Self::Video;
        }
        if mime.starts_with("audio/") {
            return Self::Audio;
        }
        if mime.contains("text/")
            || mime.contains("application/json")
            || mime.contains("application/xml")
        {
            return Self::Document;
        }
        if CODE_MIME_TYPES.iter().any(|t| mime.contains(t)) {
            return Self::Code;
        }
        if ARCHIVE_MIME_TYPES.iter().any(|t| mime.contains(t)) {
            return Self::Archive;
        }
        if DATA_MIME_TYPES.iter().any(|t| mime.contains(t)) {
            return Self::Data;
        }
        Self::Other
    }
}

/// Extensions treated as source code when deciding whether to read content
const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "vue", "py", "java", "c", "cpp", "cc", "cxx", "h", "hpp", "css",
    "scss", "sass", "html", "htm", "xml", "json", "yaml", "yml", "php", "rb", "go", "rs", "sql",
    "sh",
];

/// Lowercased extension of a file name, if any
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Whether a file name looks like source code
pub fn is_code_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Language name for a source file, used in analysis prompts
pub fn language_from_filename(name: &str) -> Option<&'static str> {
    let lang = match extension_of(name)?.as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "html" | "htm" => "html",
        "xml" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "sql" => "sql",
        "sh" => "bash",
        "ps1" => "powershell",
        "bat" => "batch",
        _ => return None,
    };
    Some(lang)
}

/// MIME prefixes whose content can be returned as UTF-8 text
const TEXT_MIME_PREFIXES: &[&str] = &[
    "text/",
    "application/json",
    "application/xml",
    "application/javascript",
    "application/typescript",
];

/// Whether a MIME type holds readable text
pub fn is_text_mime(mime: &str) -> bool {
    TEXT_MIME_PREFIXES.iter().any(|p| mime.starts_with(p))
}

/// An uploaded file and its sidecar metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Generated id (timestamp + random)
    pub id: String,
    /// Storage file name: `<id>.<ext>`
    pub name: String,
    /// Name as uploaded
    pub original_name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type
    pub mime_type: String,
    /// Category derived from the MIME type
    pub category: FileCategory,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
    /// Path of the binary on disk
    pub storage_path: String,
    /// Latest analysis, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    /// Detected errors from the latest analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FileError>>,
}

impl StoredFile {
    /// Whether this file is a Word (OOXML) document
    pub fn is_docx(&self) -> bool {
        extension_of(&self.original_name).as_deref() == Some("docx")
            || extension_of(&self.name).as_deref() == Some("docx")
    }

    /// Original name without its extension
    pub fn original_stem(&self) -> String {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.id)
            .to_string()
    }
}

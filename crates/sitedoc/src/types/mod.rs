//! Core types for stored files and their analysis

pub mod analysis;
pub mod file;

pub use analysis::{AnalysisResult, Complexity, FileError, Priority, Severity, Suggestion, SuggestionKind};
pub use file::{
    extension_of, is_code_file, is_text_mime, language_from_filename, FileCategory, StoredFile,
};

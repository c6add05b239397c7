//! sitedoc: document service for construction-site paperwork
//!
//! Stores uploads with JSON sidecar metadata, splits long DOCX files into
//! page ranges (native or via an external script), sweeps expired uploads,
//! and routes file content through DeepSeek or a Coze workflow for review.
//! Spreadsheet corrections extracted from AI answers are applied by an
//! external script.

pub mod analysis;
pub mod config;
pub mod docx;
pub mod error;
pub mod external;
pub mod extract;
pub mod providers;
pub mod retention;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::SitedocServer;
pub use types::{AnalysisResult, FileError, StoredFile};

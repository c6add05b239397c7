//! AI analysis of stored files

mod orchestrator;

pub use orchestrator::{parse_analysis, parse_detected_errors, Analyzer};

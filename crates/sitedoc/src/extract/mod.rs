//! Recovering structured JSON from free-form AI answers

mod embedded_json;
mod modification;

pub use embedded_json::{normalize_punctuation, parse_embedded_json, strip_code_fences, EmbeddedJsonError, Shape};
pub use modification::{
    clean_markdown, extract_modifications, is_valid_record, modification_stats, ModificationRecord,
    ModificationStats,
};

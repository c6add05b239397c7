//! Spreadsheet correction records in AI answers
//!
//! Answers tend to wrap the correction array in markdown and prose, and
//! sometimes split it over several arrays. Every array-of-objects fragment
//! is parsed on its own; fragments that stay unparsable are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::embedded_json::{parse_embedded_json, Shape};

/// One correction: free-form field -> value mapping
pub type ModificationRecord = Map<String, Value>;

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("Invalid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("Invalid regex"));
static LINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*+#]+[ \t]+").expect("Invalid regex"));
static OBJECT_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*\{[\s\S]*?\}\s*\]").expect("Invalid regex"));

/// Drop link targets, bold markers and list/heading prefixes
pub fn clean_markdown(text: &str) -> String {
    let text = MARKDOWN_LINK.replace_all(text, "$1");
    let text = BOLD.replace_all(&text, "$1");
    LINE_MARKER.replace_all(&text, "").into_owned()
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// A record needs at least two non-blank fields
pub fn is_valid_record(record: &ModificationRecord) -> bool {
    record.values().filter(|v| has_content(v)).count() >= 2
}

/// All valid correction records in `text`, in encounter order.
///
/// An empty result means the answer carried no usable corrections.
pub fn extract_modifications(text: &str) -> Vec<ModificationRecord> {
    let cleaned = clean_markdown(text);
    let mut records = Vec::new();

    for fragment in OBJECT_ARRAY.find_iter(&cleaned) {
        match parse_embedded_json(fragment.as_str(), Shape::Array) {
            Ok(Value::Array(items)) => {
                records.extend(items.into_iter().filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                }));
            }
            Ok(_) => {}
            Err(e) => {
                let preview: String = fragment.as_str().chars().take(100).collect();
                tracing::warn!("Skipping unparsable correction fragment ({}): {}", e, preview);
            }
        }
    }

    let found = records.len();
    records.retain(is_valid_record);
    tracing::debug!("Extracted {} of {} correction records", records.len(), found);
    records
}

/// Record count plus how many records fill each field
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModificationStats {
    pub total_count: usize,
    pub field_stats: BTreeMap<String, usize>,
}

pub fn modification_stats(records: &[ModificationRecord]) -> ModificationStats {
    let mut field_stats = BTreeMap::new();
    for record in records {
        for (field, value) in record {
            if has_content(value) {
                *field_stats.entry(field.clone()).or_insert(0) += 1;
            }
        }
    }
    ModificationStats {
        total_count: records.len(),
        field_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_two_records_in_prose() {
        let text = r#"Here are the fixes: [{"row":1,"value":"A"},{"row":2,"value":"B"}] done."#;
        let records = extract_modifications(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["value"], "B");
    }

    #[test]
    fn test_single_field_records_rejected() {
        assert!(extract_modifications(r#"[{"row":1}]"#).is_empty());
        assert!(extract_modifications(r#"[{"row":1,"value":"  ","note":null}]"#).is_empty());
    }

    #[test]
    fn test_smart_punctuation_recovered() {
        let text = "修正如下：[{“序号”：“3”，“金额”：“1200”}]";
        let records = extract_modifications(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["金额"], "1200");
    }

    #[test]
    fn test_bad_fragment_does_not_stop_others() {
        let text = "first [{\"row\": 1, oops}] then [{\"row\": 2, \"value\": \"B\"}]";
        let records = extract_modifications(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["row"], 2);
    }

    #[test]
    fn test_fragments_merge_in_order() {
        let text = "**Sheet 1**\n- [{\"row\": 1, \"value\": \"A\"}]\n## Sheet 2\n[{\"row\": 9, \"value\": \"Z\"}]";
        let rows: Vec<_> = extract_modifications(text).iter().map(|r| r["row"].clone()).collect();
        assert_eq!(rows, vec![json!(1), json!(9)]);
    }

    #[test]
    fn test_clean_markdown() {
        let cleaned = clean_markdown("- see [the sheet](http://x/y) for **bold** text\n# Title");
        assert_eq!(cleaned, "see the sheet for bold text\nTitle");
    }

    #[test]
    fn test_no_array() {
        assert!(extract_modifications("Everything looks correct.").is_empty());
    }

    #[test]
    fn test_stats() {
        let records = extract_modifications(
            r#"[{"row":1,"value":"A"},{"row":2,"value":"B","note":""},{"row":3,"note":"x"}]"#,
        );
        let stats = modification_stats(&records);
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.field_stats["row"], 3);
        assert_eq!(stats.field_stats["value"], 2);
        assert_eq!(stats.field_stats["note"], 1);
    }
}

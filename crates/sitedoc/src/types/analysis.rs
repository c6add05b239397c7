//! Analysis results attached to stored files
//!
//! AI answers are loosely shaped, so each type has a lenient
//! `from_value` constructor that fills defaults instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::file::FileCategory;

/// Estimated complexity of a file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
    Expert,
}

/// Kind of improvement a suggestion targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Architecture,
    Performance,
    Security,
    #[default]
    Style,
    Documentation,
}

/// Suggestion priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Severity of a detected error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
}

/// Deserialize `value` as `T`, falling back to `T::default()` on anything unexpected
fn lenient<T: serde::de::DeserializeOwned + Default>(value: Option<&Value>) -> T {
    value
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Non-empty string field
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Number or numeric string
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Array of strings; other element types are dropped
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

/// One improvement suggestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl Suggestion {
    /// Accepts either a bare string or an object
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self {
                kind: SuggestionKind::default(),
                priority: Priority::default(),
                description: s.clone(),
                example: None,
            }),
            Value::Object(map) => Some(Self {
                kind: lenient(map.get("type")),
                priority: lenient(map.get("priority")),
                description: text(map.get("description")).unwrap_or_else(|| value.to_string()),
                example: text(map.get("example")),
            }),
            _ => None,
        }
    }
}

/// Result of one AI analysis pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub category: FileCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub summary: String,
    pub complexity: Complexity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainability: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl AnalysisResult {
    /// Placeholder used when the AI answer could not be read
    pub fn unavailable() -> Self {
        Self {
            category: FileCategory::Other,
            language: None,
            summary: "analysis unavailable".to_string(),
            complexity: Complexity::Medium,
            quality_score: None,
            security_risk: None,
            maintainability: None,
            suggestions: Vec::new(),
            insights: None,
            technologies: None,
            keywords: None,
        }
    }

    /// Build from a parsed JSON object, defaulting missing or odd fields
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::unavailable();
        };

        let suggestions = map
            .get("suggestions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Suggestion::from_value).collect())
            .unwrap_or_default();

        Self {
            category: lenient(map.get("category")),
            language: text(map.get("language")).filter(|l| l != "null"),
            summary: text(map.get("summary"))
                .unwrap_or_else(|| "analysis unavailable".to_string()),
            complexity: lenient(map.get("complexity")),
            quality_score: number(map.get("qualityScore")),
            security_risk: text(map.get("securityRisk")),
            maintainability: text(map.get("maintainability")),
            suggestions,
            insights: string_list(map.get("insights")),
            technologies: string_list(map.get("technologies")),
            keywords: string_list(map.get("keywords")),
        }
    }
}

/// One detected problem in a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

impl FileError {
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let line = number(map.get("line"))
            .filter(|n| *n >= 1.0)
            .map(|n| n as u32)
            .unwrap_or(1);

        Some(Self {
            line,
            column: number(map.get("column")).filter(|n| *n >= 0.0).map(|n| n as u32),
            message: text(map.get("message")).unwrap_or_else(|| "unknown error".to_string()),
            severity: lenient(map.get("severity")),
            category: text(map.get("category")),
            rule: text(map.get("rule")),
            suggestion: text(map.get("suggestion")),
            confidence: text(map.get("confidence")),
        })
    }

    /// Convert a parsed JSON array; anything else yields no errors
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_defaults() {
        let analysis = AnalysisResult::from_value(&json!({
            "category": "nonsense",
            "complexity": 7,
            "qualityScore": "82",
            "suggestions": ["Add a legend", {"description": "Split the table", "priority": "high"}, 3]
        }));

        assert_eq!(analysis.category, FileCategory::Other);
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert_eq!(analysis.summary, "analysis unavailable");
        assert_eq!(analysis.quality_score, Some(82.0));
        assert_eq!(analysis.suggestions.len(), 2);
        assert_eq!(analysis.suggestions[0].kind, SuggestionKind::Style);
        assert_eq!(analysis.suggestions[0].priority, Priority::Medium);
        assert_eq!(analysis.suggestions[1].priority, Priority::High);
    }

    #[test]
    fn test_analysis_from_non_object() {
        assert_eq!(AnalysisResult::from_value(&json!([1, 2])), AnalysisResult::unavailable());
    }

    #[test]
    fn test_error_defaults() {
        let errors = FileError::list_from_value(&json!([
            {"message": "Missing unit on row 4"},
            {"line": "12", "severity": "critical", "message": "Load exceeds limit"},
            "not an object"
        ]));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].severity, Severity::Info);
        assert_eq!(errors[1].line, 12);
        assert_eq!(errors[1].severity, Severity::Critical);
        assert!(FileError::list_from_value(&json!({"line": 3})).is_empty());
    }
}

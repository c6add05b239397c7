//! Prompt templates for file analysis and error detection

use crate::types::language_from_filename;

/// Characters of file content sent for analysis
pub const ANALYSIS_CONTENT_LIMIT: usize = 10_000;
/// Characters of numbered listing sent for error detection
pub const DETECTION_CONTENT_LIMIT: usize = 12_000;

/// First `limit` characters of `text`, and whether anything was cut
fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Prompt builder for DeepSeek requests
pub struct PromptBuilder;

impl PromptBuilder {
    /// Ask for a JSON analysis object describing the file
    pub fn build_analysis_prompt(content: &str, filename: &str, mime_type: &str) -> String {
        let language = language_from_filename(filename);
        let fence = language.map(str::to_lowercase).unwrap_or_default();

        let (body, truncated) = truncate_chars(content, ANALYSIS_CONTENT_LIMIT);
        let body = if truncated {
            format!(
                "{}\n...(content truncated, {} characters total)",
                body,
                content.chars().count()
            )
        } else {
            body.to_string()
        };

        let focus = if language.is_some() {
            r#"Code file focus:
- architecture and structure
- performance bottlenecks
- error handling and boundary conditions
- security weaknesses"#
        } else {
            r#"Document focus:
- structure and organization of the content
- completeness and accuracy of the information
- formatting and readability
- missing key information (dates, quantities, responsible parties)"#
        };

        format!(
            r#"You are a senior reviewer of construction-project documents and source code. Analyze the following file.

File name: {filename}
File type: {mime_type}
Detected language: {language}

File content:
```{fence}
{body}
```

Return a JSON object of this form:
{{
  "category": "code | document | data | config | test | other",
  "language": "{language_hint}",
  "summary": "what the file is and what it contains (at most 150 words)",
  "complexity": "low | medium | high | expert",
  "qualityScore": "1-10, code files only",
  "securityRisk": "low | medium | high",
  "maintainability": "excellent | good | fair | poor",
  "suggestions": [
    {{
      "type": "architecture | performance | security | style | documentation",
      "priority": "high | medium | low",
      "description": "a concrete improvement",
      "example": "optional example"
    }}
  ],
  "insights": ["key observations"],
  "technologies": ["detected technologies"],
  "keywords": ["keyword tags"]
}}

{focus}

Return ONLY the JSON object, with no other text."#,
            filename = filename,
            mime_type = mime_type,
            language = language.unwrap_or("not a code file"),
            fence = fence,
            body = body,
            language_hint = language.unwrap_or("null"),
            focus = focus,
        )
    }

    /// Ask for a JSON array of problems, referencing numbered lines
    pub fn build_detection_prompt(content: &str, filename: &str) -> String {
        let language = language_from_filename(filename);
        let fence = language.map(str::to_lowercase).unwrap_or_default();

        let lines: Vec<&str> = content.split('\n').collect();
        let numbered = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>3}│ {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");
        let (listing, _) = truncate_chars(&numbered, DETECTION_CONTENT_LIMIT);
        let marker = if content.chars().count() > DETECTION_CONTENT_LIMIT {
            "\n...(content truncated)"
        } else {
            ""
        };

        format!(
            r#"You are an expert reviewer. Review the following {language} file and report concrete problems.

File name: {filename}
Language: {language_name}
Total lines: {total}

Content (line numbers on the left):
```{fence}
{listing}{marker}
```

Look for security issues, logic errors, inconsistent figures or dates, performance problems and style issues.

Return a JSON array where each problem is:
[
  {{
    "line": "exact line number",
    "column": "column number (optional)",
    "message": "what is wrong and why it matters",
    "severity": "critical | error | warning | info",
    "category": "security | performance | logic | style | best-practice",
    "rule": "the rule or standard violated",
    "suggestion": "how to fix it",
    "confidence": "high | medium | low"
  }}
]

If there are no problems, return an empty array [].
Return ONLY the JSON array, with no other text."#,
            language = language.unwrap_or(""),
            filename = filename,
            language_name = language.unwrap_or("unknown"),
            total = lines.len(),
            fence = fence,
            listing = listing,
            marker = marker,
        )
    }
}

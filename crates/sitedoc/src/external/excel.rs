//! Spreadsheet correction through the external Excel script
//!
//! Contract: `<interpreter> <script> <original> <output_dir>`, corrections
//! as UTF-8 JSON on stdin, one JSON report object on stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::script::{ScriptOutput, ScriptRunner};
use crate::error::{Error, Result};

/// Report printed by the correction script
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScriptReport {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        serde_json::from_str(text).ok()
    }

    /// Read the report out of a finished run.
    ///
    /// A clean exit must print a report. A failed exit may still print one
    /// (on stdout, or on stderr); that report is returned as is.
    pub fn from_output(output: &ScriptOutput) -> Result<Self> {
        if output.success() {
            return Self::parse(&output.stdout).ok_or_else(|| {
                Error::external(format!(
                    "Could not parse script output: {}",
                    output.stdout.trim()
                ))
            });
        }

        Self::parse(&output.stdout)
            .or_else(|| Self::parse(&output.stderr))
            .ok_or_else(|| {
                let detail = if output.stderr.trim().is_empty() {
                    output.stdout.trim()
                } else {
                    output.stderr.trim()
                };
                Error::external(format!(
                    "Script failed (exit code {:?}): {}",
                    output.exit_code, detail
                ))
            })
    }
}

/// Runs the correction script against stored spreadsheets
#[derive(Debug, Clone)]
pub struct ExcelModifier {
    runner: ScriptRunner,
    script: PathBuf,
    output_dir: PathBuf,
}

impl ExcelModifier {
    pub fn new(runner: ScriptRunner, script: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            script: script.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Apply `corrections` (JSON text) to `original`
    pub async fn modify(&self, original: &Path, corrections: &str) -> Result<ScriptReport> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let args = vec![
            original.to_string_lossy().to_string(),
            self.output_dir.to_string_lossy().to_string(),
        ];
        tracing::info!(
            "Running spreadsheet correction on {} ({} bytes of corrections)",
            original.display(),
            corrections.len()
        );

        let output = self
            .runner
            .run(&self.script, &args, Some(corrections.as_bytes()))
            .await?;
        let report = ScriptReport::from_output(&output)?;

        if report.success {
            tracing::info!("Spreadsheet corrected: {:?}", report.filename);
        } else {
            tracing::warn!("Spreadsheet correction reported failure: {:?}", report.error);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(stdout: &str, stderr: &str, code: i32) -> ScriptOutput {
        ScriptOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_report_from_clean_exit() {
        let report = ScriptReport::from_output(&output(
            r#"{"success": true, "output_path": "/u/modified/a.xlsx", "filename": "a.xlsx", "statistics": {"matched_rows": 4}}"#,
            "",
            0,
        ))
        .unwrap();
        assert!(report.success);
        assert_eq!(report.filename.as_deref(), Some("a.xlsx"));
        assert_eq!(report.statistics.unwrap()["matched_rows"], 4);
    }

    #[test]
    fn test_unparsable_clean_exit_is_error() {
        let err = ScriptReport::from_output(&output("done!", "", 0)).unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
    }

    #[test]
    fn test_failed_exit_with_report() {
        let report = ScriptReport::from_output(&output(
            "",
            r#"{"success": false, "error": "no sequence column"}"#,
            1,
        ))
        .unwrap();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("no sequence column"));
    }

    #[test]
    fn test_failed_exit_without_report() {
        let err = ScriptReport::from_output(&output("", "Traceback ...", 1)).unwrap_err();
        assert!(err.to_string().contains("Traceback"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_modify_passes_args_and_stdin() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fix.sh");
        std::fs::write(
            &script,
            "data=$(cat)\nprintf '{\"success\": true, \"filename\": \"%s\", \"output_path\": \"%s\", \"message\": \"%s\"}' \"$(basename \"$1\")\" \"$2\" \"$data\"\n",
        )
        .unwrap();

        let runner = ScriptRunner::new("/bin/sh", Duration::from_secs(5), Duration::from_secs(1));
        let modifier = ExcelModifier::new(runner, &script, dir.path().join("modified"));
        let original = dir.path().join("sheet.xlsx");
        std::fs::write(&original, b"xlsx").unwrap();

        let report = modifier.modify(&original, "[{\\\"row\\\":1}]").await.unwrap();
        assert!(report.success);
        assert_eq!(report.filename.as_deref(), Some("sheet.xlsx"));
        assert!(dir.path().join("modified").is_dir());
        assert_eq!(report.message.as_deref(), Some("[{\"row\":1}]"));
    }
}

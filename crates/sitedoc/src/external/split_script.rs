//! External DOCX split backend
//!
//! The script is invoked as `<script> <input> <output_dir> <pages_per_file>`
//! and reports progress on stdout with lines such as:
//!
//! ```text
//! PROGRESS:TOTAL_FILES:4
//! PROGRESS:FILE_START:1
//! PROGRESS:FILE_STEP:1:saving:80
//! PROGRESS:FILE_COMPLETE:1
//! PROGRESS:FILE_ERROR:2:message text
//! PROGRESS:ALL_FILES_COMPLETE:4:4
//! ```

use std::path::{Path, PathBuf};

use super::script::ScriptRunner;
use crate::docx::{ProgressSink, SplitEvent, SplitPhase, StatusHandle};
use crate::error::{Error, Result};

/// Turns `PROGRESS:` lines into split events, remembering the total
#[derive(Debug, Default)]
pub struct ProgressTranslator {
    total: usize,
}

impl ProgressTranslator {
    pub fn translate(&mut self, line: &str) -> Option<SplitEvent> {
        let rest = line.trim().strip_prefix("PROGRESS:")?;
        let mut parts = rest.splitn(2, ':');
        let kind = parts.next()?;
        let args = parts.next().unwrap_or("");
        let num = |s: Option<&str>| s.and_then(|v| v.trim().parse::<usize>().ok());

        let event = match kind {
            "TOTAL_FILES" => {
                self.total = num(Some(args))?;
                SplitEvent::TotalFiles { total: self.total }
            }
            "FILE_START" => SplitEvent::FileStart {
                current: num(Some(args))?,
                total: self.total,
            },
            "FILE_STEP" => {
                let mut fields = args.splitn(3, ':');
                let file_index = num(fields.next())?;
                let step = fields.next()?.to_string();
                let percentage = num(fields.next()).unwrap_or(0).min(100) as u8;
                SplitEvent::FileStep {
                    file_index,
                    step,
                    percentage,
                }
            }
            "FILE_COMPLETE" => SplitEvent::FileComplete {
                completed: num(Some(args))?,
                total: self.total,
            },
            "FILE_ERROR" => {
                let (index, message) = args.split_once(':').unwrap_or((args, ""));
                SplitEvent::FileError {
                    file_index: num(Some(index))?,
                    message: message.to_string(),
                }
            }
            "ALL_FILES_COMPLETE" => {
                let (done, total) = args.split_once(':').unwrap_or((args, ""));
                let completed = num(Some(done))?;
                SplitEvent::AllComplete {
                    completed,
                    total: num(Some(total)).unwrap_or(self.total),
                }
            }
            _ => return None,
        };
        Some(event)
    }
}

/// Split backend that delegates to a script
#[derive(Debug, Clone)]
pub struct SplitScript {
    runner: ScriptRunner,
    script: PathBuf,
}

impl SplitScript {
    pub fn new(runner: ScriptRunner, script: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            script: script.into(),
        }
    }

    /// Run the script; chunk files land in `output_dir`
    pub async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        pages_per_file: u32,
        progress: &ProgressSink,
        status: &StatusHandle,
    ) -> Result<()> {
        let args = vec![
            input.to_string_lossy().to_string(),
            output_dir.to_string_lossy().to_string(),
            pages_per_file.to_string(),
        ];

        let mut translator = ProgressTranslator::default();
        let output = self
            .runner
            .run_lines(&self.script, &args, |line| match translator.translate(line) {
                Some(event) => {
                    if let SplitEvent::FileStart { current, total } = &event {
                        status.set(SplitPhase::Splitting, *current, *total);
                    }
                    progress.emit(event);
                }
                None if !line.trim().is_empty() => tracing::debug!("split script: {}", line),
                None => {}
            })
            .await?;

        if !output.success() {
            let detail = output.stderr.trim();
            return Err(Error::external(format!(
                "Split script exited with {:?}: {}",
                output.exit_code,
                if detail.is_empty() { "no error output" } else { detail }
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_sequence() {
        let mut t = ProgressTranslator::default();
        assert_eq!(t.translate("PROGRESS:TOTAL_FILES:3"), Some(SplitEvent::TotalFiles { total: 3 }));
        assert_eq!(
            t.translate("PROGRESS:FILE_START:1"),
            Some(SplitEvent::FileStart { current: 1, total: 3 })
        );
        assert_eq!(
            t.translate("PROGRESS:FILE_STEP:1:saving:80"),
            Some(SplitEvent::FileStep {
                file_index: 1,
                step: "saving".into(),
                percentage: 80
            })
        );
        assert_eq!(
            t.translate("PROGRESS:FILE_ERROR:2:bad: table"),
            Some(SplitEvent::FileError {
                file_index: 2,
                message: "bad: table".into()
            })
        );
        assert_eq!(
            t.translate("PROGRESS:ALL_FILES_COMPLETE:2:3"),
            Some(SplitEvent::AllComplete { completed: 2, total: 3 })
        );
    }

    #[test]
    fn test_ignores_noise() {
        let mut t = ProgressTranslator::default();
        assert_eq!(t.translate("Loading document..."), None);
        assert_eq!(t.translate("PROGRESS:UNKNOWN:1"), None);
        assert_eq!(t.translate("PROGRESS:FILE_START:x"), None);
    }
}

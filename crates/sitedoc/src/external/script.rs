//! Subprocess runner for helper scripts
//!
//! Scripts run as `<interpreter> <script> <args..>` with piped stdio. The
//! whole run (feeding stdin, draining stdout/stderr, waiting for exit) is
//! bounded by a timeout; on expiry the child gets SIGTERM, then SIGKILL
//! once the grace period has passed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::ScriptConfig;
use crate::error::{Error, Result};

/// Captured result of a finished script
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs scripts with a timeout and escalating kill
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    timeout: Duration,
    kill_grace: Duration,
    cwd: Option<PathBuf>,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
            kill_grace,
            cwd: None,
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new(config.interpreter.clone(), config.timeout(), config.kill_grace())
    }

    /// Same runner with a different time budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Run to completion, optionally feeding `stdin`
    pub async fn run(&self, script: &Path, args: &[String], stdin: Option<&[u8]>) -> Result<ScriptOutput> {
        self.execute(script, args, stdin, |_| {}).await
    }

    /// Run and hand each stdout line to `on_line` as it arrives
    pub async fn run_lines<F>(&self, script: &Path, args: &[String], on_line: F) -> Result<ScriptOutput>
    where
        F: FnMut(&str) + Send,
    {
        self.execute(script, args, None, on_line).await
    }

    async fn execute<F>(
        &self,
        script: &Path,
        args: &[String],
        stdin: Option<&[u8]>,
        mut on_line: F,
    ) -> Result<ScriptOutput>
    where
        F: FnMut(&str) + Send,
    {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            Error::external(format!(
                "Failed to start {} {}: {}",
                self.interpreter,
                script.display(),
                e
            ))
        })?;
        tracing::info!(
            "Started {} {} (pid {:?}, timeout {}s)",
            self.interpreter,
            script.display(),
            child.id(),
            self.timeout.as_secs()
        );

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let io = async {
            let feed = async {
                if let (Some(mut pipe), Some(data)) = (stdin_pipe, stdin) {
                    // a script that never reads stdin closes the pipe early
                    if let Err(e) = pipe.write_all(data).await {
                        tracing::debug!("stdin write stopped: {}", e);
                    }
                    let _ = pipe.shutdown().await;
                }
            };

            let drain_stdout = async {
                let mut collected = Vec::new();
                if let Some(pipe) = stdout_pipe {
                    let mut reader = BufReader::new(pipe);
                    let mut line = Vec::new();
                    loop {
                        line.clear();
                        if reader.read_until(b'\n', &mut line).await? == 0 {
                            break;
                        }
                        collected.extend_from_slice(&line);
                        let text = String::from_utf8_lossy(&line);
                        on_line(text.trim_end_matches(['\n', '\r']));
                    }
                }
                Ok::<_, std::io::Error>(collected)
            };

            let drain_stderr = async {
                let mut collected = Vec::new();
                if let Some(mut pipe) = stderr_pipe {
                    pipe.read_to_end(&mut collected).await?;
                }
                Ok::<_, std::io::Error>(collected)
            };

            let ((), stdout, stderr) = tokio::join!(feed, drain_stdout, drain_stderr);
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout?, stderr?))
        };

        let outcome = tokio::time::timeout(self.timeout, io).await;
        let (status, stdout, stderr) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "{} timed out after {}s, terminating",
                    script.display(),
                    self.timeout.as_secs()
                );
                self.terminate(&mut child).await;
                return Err(Error::Timeout(format!(
                    "{} exceeded {}s",
                    script.display(),
                    self.timeout.as_secs()
                )));
            }
        };

        let output = ScriptOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
            duration: started.elapsed(),
        };

        if output.success() {
            tracing::info!("{} finished in {:?}", script.display(), output.duration);
        } else {
            tracing::warn!(
                "{} exited with {:?} after {:?}",
                script.display(),
                output.exit_code,
                output.duration
            );
        }
        Ok(output)
    }

    /// SIGTERM, wait out the grace period, then SIGKILL
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            if let Err(e) = sigterm(pid) {
                tracing::warn!("Failed to send SIGTERM to {}: {}", pid, e);
            }
            if tokio::time::timeout(self.kill_grace, child.wait()).await.is_ok() {
                return;
            }
        }

        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to kill script process: {}", e);
        }
    }
}

/// Ask a child to exit; `pid` is only valid while the child is unreaped
#[cfg(unix)]
fn sigterm(pid: u32) -> nix::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| nix::errno::Errno::ESRCH)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("script.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn runner(timeout_ms: u64) -> ScriptRunner {
        ScriptRunner::new(
            "/bin/sh",
            Duration::from_millis(timeout_ms),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_stdin_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "cat\n");

        let output = runner(5_000)
            .run(&path, &[], Some("行 1\nrow 2".as_bytes()))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "行 1\nrow 2");
    }

    #[tokio::test]
    async fn test_args_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "echo \"$1-$2\"\necho oops >&2\nexit 3\n");

        let output = runner(5_000)
            .run(&path, &["a".to_string(), "b".to_string()], None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "a-b");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_lines_streamed() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "echo one\necho two\nprintf three\n");

        let mut seen = Vec::new();
        let output = runner(5_000)
            .run_lines(&path, &[], |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["one", "two", "three"]);
        assert_eq!(output.stdout, "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "exec sleep 30\n");

        let started = Instant::now();
        let err = runner(300).run(&path, &[], None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sigterm_reaches_child() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = tokio::process::Command::new("sleep").arg("30").spawn().unwrap();
        sigterm(child.id().unwrap()).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(15));
    }

    #[tokio::test]
    async fn test_ignored_sigterm_escalates() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "trap '' TERM\nwhile true; do sleep 0.1; done\n");

        let started = Instant::now();
        let err = runner(300).run(&path, &[], None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "true\n");
        let runner = ScriptRunner::new(
            "/nonexistent/python",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let err = runner.run(&path, &[], None).await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
    }
}

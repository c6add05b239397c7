//! Age-based retention for the upload directory
//!
//! A sweep deletes every regular file in the upload root whose mtime is
//! older than the configured age, plus the matching `.meta.json` sidecar.
//! Directories (split outputs) are left alone. Deletions are idempotent:
//! a file that vanished between listing and unlinking counts as gone.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time;

use crate::config::RetentionConfig;
use crate::error::Result;
use crate::storage::{remove_if_exists, META_SUFFIX};

/// Outcome of one sweep
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Regular files inspected
    pub scanned: u64,
    /// Expired files removed
    pub deleted: u64,
    /// Sidecars removed alongside an expired binary
    pub sidecars_deleted: u64,
    /// Files that could not be inspected or removed
    pub errors: u64,
}

/// Counters accumulated across sweeps since process start
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeCounters {
    pub sweeps: u64,
    pub scanned: u64,
    pub deleted: u64,
    pub errors: u64,
}

/// Snapshot of what is on disk right now
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStats {
    pub total_files: u64,
    pub old_files: u64,
    pub total_size: u64,
    pub old_files_size: u64,
}

#[derive(Debug, Default)]
struct SweepHistory {
    last: Option<(DateTime<Utc>, CleanupReport)>,
    cumulative: CumulativeCounters,
}

/// Retention sweeper for one upload root
#[derive(Debug, Clone)]
pub struct CleanupService {
    root: PathBuf,
    config: RetentionConfig,
    history: Arc<Mutex<SweepHistory>>,
}

impl CleanupService {
    pub fn new(root: impl Into<PathBuf>, config: RetentionConfig) -> Self {
        Self {
            root: root.into(),
            config,
            history: Arc::new(Mutex::new(SweepHistory::default())),
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run a sweep against the current clock
    pub async fn sweep(&self) -> Result<CleanupReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Run a sweep as if the clock read `now`
    pub async fn sweep_at(&self, now: SystemTime) -> Result<CleanupReport> {
        let cutoff = now.checked_sub(self.config.max_age()).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanupReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("Upload directory {} does not exist, nothing to clean", self.root.display());
                self.record(report.clone());
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();

            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                // removed earlier in this sweep (a sidecar) or by a concurrent delete
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Could not stat {}: {}", path.display(), e);
                    report.errors += 1;
                    continue;
                }
            };
            if meta.is_dir() {
                continue;
            }
            report.scanned += 1;

            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("No mtime for {}: {}", path.display(), e);
                    report.errors += 1;
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            match remove_if_exists(&path).await {
                Ok(_) => {
                    report.deleted += 1;
                    tracing::debug!("Deleted expired file {}", file_name);
                }
                Err(e) => {
                    tracing::warn!("Could not delete {}: {}", path.display(), e);
                    report.errors += 1;
                    continue;
                }
            }

            if let Some(sidecar) = sidecar_for(&file_name) {
                match remove_if_exists(&self.root.join(&sidecar)).await {
                    Ok(true) => {
                        report.sidecars_deleted += 1;
                        tracing::debug!("Deleted sidecar {}", sidecar);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!("Could not delete sidecar {}: {}", sidecar, e);
                        report.errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Cleanup completed: scanned {}, deleted {} (+{} sidecars), errors {}",
            report.scanned,
            report.deleted,
            report.sidecars_deleted,
            report.errors
        );
        self.record(report.clone());
        Ok(report)
    }

    fn record(&self, report: CleanupReport) {
        let mut history = self.history.lock();
        history.cumulative.sweeps += 1;
        history.cumulative.scanned += report.scanned;
        history.cumulative.deleted += report.deleted + report.sidecars_deleted;
        history.cumulative.errors += report.errors;
        history.last = Some((Utc::now(), report));
    }

    /// Last sweep time and report
    pub fn last_sweep(&self) -> Option<(DateTime<Utc>, CleanupReport)> {
        self.history.lock().last.clone()
    }

    pub fn cumulative(&self) -> CumulativeCounters {
        self.history.lock().cumulative.clone()
    }

    /// Count files and bytes, and how many would expire now
    pub async fn stats(&self) -> Result<CleanupStats> {
        self.stats_at(SystemTime::now()).await
    }

    pub async fn stats_at(&self, now: SystemTime) -> Result<CleanupStats> {
        let cutoff = now.checked_sub(self.config.max_age()).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut stats = CleanupStats::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            stats.total_files += 1;
            stats.total_size += meta.len();
            if meta.modified().map(|m| m < cutoff).unwrap_or(false) {
                stats.old_files += 1;
                stats.old_files_size += meta.len();
            }
        }

        Ok(stats)
    }

    /// Sweep once now, then on every interval tick
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tracing::info!(
            "Starting file cleanup scheduler (every {}s, max age {}s)",
            self.config.interval_secs,
            self.config.max_age_secs
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.config.interval().max(Duration::from_secs(1)));
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                // first tick completes immediately
                interval.tick().await;

                if let Err(e) = self.sweep().await {
                    tracing::error!("Cleanup sweep failed: {}", e);
                }
            }
        })
    }
}

/// Sidecar name for a binary: extension stripped, `.meta.json` appended
fn sidecar_for(file_name: &str) -> Option<String> {
    if file_name.ends_with(META_SUFFIX) {
        return None;
    }
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    Some(format!("{}{}", stem, META_SUFFIX))
}

/// Human readable size: `0 Bytes`, `1.5 KB`, `2.25 MB`, ...
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut index = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && index < UNITS.len() - 1 {
        value /= 1024.0;
        index += 1;
    }

    let mut number = format!("{:.2}", value);
    if number.contains('.') {
        number = number.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", number, UNITS[index])
}

/// Human readable duration for the stats endpoint, e.g. `24 hours`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        let hours = secs / 3600;
        format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn touch(dir: &Path, name: &str, age: Duration, now: SystemTime) {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(now - age)
            .unwrap();
    }

    fn service(dir: &TempDir) -> CleanupService {
        CleanupService::new(dir.path(), RetentionConfig::default())
    }

    #[tokio::test]
    async fn test_retains_recent_deletes_expired() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "fresh.docx", 23 * HOUR, now);
        touch(dir.path(), "stale.docx", 25 * HOUR, now);
        // the sidecar itself is recent; it goes because its binary expired
        touch(dir.path(), "stale.meta.json", HOUR, now);

        let report = service(&dir).sweep_at(now).await.unwrap();

        assert!(dir.path().join("fresh.docx").exists());
        assert!(!dir.path().join("stale.docx").exists());
        assert!(!dir.path().join("stale.meta.json").exists());
        assert_eq!(report.deleted, 1);
        assert_eq!(report.sidecars_deleted, 1);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_fine() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "split_abc.zip", 30 * HOUR, now);

        let report = service(&dir).sweep_at(now).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.sidecars_deleted, 0);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_second_sweep_is_noop() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "a.pdf", 48 * HOUR, now);
        touch(dir.path(), "a.meta.json", 48 * HOUR, now);
        std::fs::create_dir(dir.path().join("split_a")).unwrap();

        let svc = service(&dir);
        svc.sweep_at(now).await.unwrap();
        let again = svc.sweep_at(now).await.unwrap();

        assert_eq!(again.deleted, 0);
        assert_eq!(again.errors, 0);
        assert!(dir.path().join("split_a").exists());

        let totals = svc.cumulative();
        assert_eq!(totals.sweeps, 2);
        assert_eq!(totals.deleted, 2);
        assert!(svc.last_sweep().is_some());
    }

    async fn wait_for_sweeps(svc: &CleanupService, sweeps: u64) {
        for _ in 0..500 {
            if svc.cumulative().sweeps >= sweeps {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sweep {} never ran", sweeps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeps_at_start_then_every_interval() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "first.docx", 30 * HOUR, SystemTime::now());

        let config = RetentionConfig {
            interval_secs: 60,
            ..RetentionConfig::default()
        };
        let svc = CleanupService::new(dir.path(), config);
        let handle = svc.clone().start_background();

        wait_for_sweeps(&svc, 1).await;
        assert!(!dir.path().join("first.docx").exists());
        assert_eq!(svc.cumulative().sweeps, 1);

        touch(dir.path(), "second.docx", 30 * HOUR, SystemTime::now());
        time::advance(Duration::from_secs(60)).await;
        wait_for_sweeps(&svc, 2).await;

        assert!(!dir.path().join("second.docx").exists());
        let totals = svc.cumulative();
        assert_eq!(totals.sweeps, 2);
        assert_eq!(totals.deleted, 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let svc = CleanupService::new(dir.path().join("nope"), RetentionConfig::default());
        assert_eq!(svc.sweep().await.unwrap(), CleanupReport::default());
        assert_eq!(svc.stats().await.unwrap(), CleanupStats::default());
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "new.txt", HOUR, now);
        touch(dir.path(), "old.txt", 26 * HOUR, now);

        let stats = service(&dir).stats_at(now).await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.old_files, 1);
        assert_eq!(stats.total_size, 2);
        assert_eq!(stats.old_files_size, 1);
    }

    #[test]
    fn test_sidecar_for() {
        assert_eq!(sidecar_for("abc.docx").as_deref(), Some("abc.meta.json"));
        assert_eq!(sidecar_for("abc").as_deref(), Some("abc.meta.json"));
        assert_eq!(sidecar_for("abc.meta.json"), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "24 hours");
    }
}

//! DOCX splitting service
//!
//! Two modes share the same segmentation:
//!
//! - in memory: each chunk comes back as a standalone `document.xml`
//! - on disk: each chunk is written as a full DOCX package under
//!   `split_<id>/`, then all chunks are archived into `split_<id>.zip`
//!
//! On-disk splits for the same source id are serialized by a per-id lock,
//! since each run starts by clearing that id's output directory.

use dashmap::DashMap;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::package::DocxPackage;
use super::progress::{ProgressSink, SplitEvent, SplitOutcome, SplitPhase, SplitStatus, StatusHandle, StatusTracker};
use super::segment::{DocumentBody, XmlChunk};
use crate::config::SplitterConfig;
use crate::error::{Error, Result};
use crate::external::{ScriptRunner, SplitScript};
use crate::storage::StorageLayout;
use crate::types::StoredFile;

/// Accepted range for pages per output file
pub const PAGES_PER_FILE_RANGE: std::ops::RangeInclusive<i64> = 1..=1000;

/// Check a pages-per-file value
pub fn validate_pages_per_file(pages: i64) -> Result<u32> {
    if PAGES_PER_FILE_RANGE.contains(&pages) {
        Ok(pages as u32)
    } else {
        Err(Error::validation(format!(
            "Invalid pagesPerFile value {} (must be 1-1000)",
            pages
        )))
    }
}

/// Read pages-per-file from a request field that may be a number or a string
pub fn pages_from_value(raw: Option<&Value>, default: u32) -> Result<u32> {
    let pages = match raw {
        None | Some(Value::Null) => return validate_pages_per_file(default as i64),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match pages {
        Some(pages) => validate_pages_per_file(pages),
        None => Err(Error::validation("Invalid pagesPerFile value (must be 1-1000)")),
    }
}

/// File name of one chunk: `<stem>_part_<NNN>.docx`
pub fn chunk_file_name(stem: &str, index: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    format!("{}_part_{:0width$}.docx", stem, index, width = width)
}

fn chunk_stem(file: &StoredFile) -> String {
    let stem: String = file
        .original_stem()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        file.id.clone()
    } else {
        stem.to_string()
    }
}

/// Inputs of one on-disk split
#[derive(Debug, Clone)]
struct SplitJob {
    input: PathBuf,
    out_dir: PathBuf,
    zip_path: PathBuf,
    stem: String,
    pages_per_file: u32,
    paragraphs_per_page: usize,
}

/// Splits stored DOCX files
pub struct DocxSplitter {
    layout: StorageLayout,
    config: SplitterConfig,
    script: Option<SplitScript>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    status: StatusTracker,
}

impl DocxSplitter {
    /// `runner` is only used when an external split script is configured
    pub fn new(layout: StorageLayout, config: SplitterConfig, runner: &ScriptRunner) -> Self {
        let script = config.script.as_ref().map(|path| {
            tracing::info!("Using external split script {}", path.display());
            SplitScript::new(runner.clone().with_timeout(config.timeout()), path)
        });
        Self {
            layout,
            config,
            script,
            locks: DashMap::new(),
            status: StatusTracker::default(),
        }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Latest split status for a source id
    pub fn status(&self, id: &str) -> SplitStatus {
        self.status.get(id)
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn source_path(&self, file: &StoredFile) -> Result<PathBuf> {
        if !file.is_docx() {
            return Err(Error::validation("File must be a DOCX document"));
        }
        let path = self.layout.binary_path(&file.name)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::not_found(format!("Stored file missing for {}", file.id)));
        }
        Ok(path)
    }

    /// Split into standalone `document.xml` strings
    pub async fn split_xml(&self, file: &StoredFile, pages_per_file: u32) -> Result<Vec<XmlChunk>> {
        let pages_per_file = validate_pages_per_file(pages_per_file as i64)?;
        let input = self.source_path(file).await?;
        let paragraphs_per_page = self.config.paragraphs_per_page;

        let chunks = tokio::task::spawn_blocking(move || {
            let package = DocxPackage::open(&input)?;
            let body = DocumentBody::parse(package.document_xml()?)?;
            Ok::<_, Error>(body.chunks(pages_per_file as usize, paragraphs_per_page))
        })
        .await
        .map_err(|e| Error::internal(format!("Split task failed: {}", e)))??;

        tracing::info!("Split {} into {} XML chunks", file.id, chunks.len());
        Ok(chunks)
    }

    /// Split into DOCX files plus an aggregate archive, reporting progress
    pub async fn split_to_disk(
        &self,
        file: &StoredFile,
        pages_per_file: u32,
        progress: ProgressSink,
    ) -> Result<SplitOutcome> {
        let pages_per_file = validate_pages_per_file(pages_per_file as i64)?;
        let input = self.source_path(file).await?;
        let job = SplitJob {
            input,
            out_dir: self.layout.split_dir(&file.id)?,
            zip_path: self.layout.split_zip(&file.id)?,
            stem: chunk_stem(file),
            pages_per_file,
            paragraphs_per_page: self.config.paragraphs_per_page,
        };

        let guard = self.lock_for(&file.id).lock_owned().await;
        let status = self.status.handle(&file.id);
        status.begin();

        let started = Instant::now();
        let gate = Arc::new(JobGate::default());
        // the job owns the lock until its outputs are final or discarded
        let mut task = tokio::spawn(run_job(
            self.script.clone(),
            job,
            guard,
            progress.clone(),
            status.clone(),
            Arc::clone(&gate),
        ));

        let joined = match tokio::time::timeout(self.config.timeout(), &mut task).await {
            Ok(joined) => Some(joined),
            Err(_) if gate.cancel() => None,
            // finished right at the deadline
            Err(_) => Some(task.await),
        };
        let result = match joined {
            Some(joined) => {
                joined.map_err(|e| Error::internal(format!("Split task failed: {}", e))).and_then(|r| r)
            }
            None => Err(Error::Timeout(format!(
                "Split of {} exceeded {}s",
                file.id, self.config.timeout_secs
            ))),
        };

        let result = match result {
            Ok(files) => {
                let outcome = SplitOutcome {
                    success: true,
                    total_files: files.len(),
                    pages_per_file,
                    files,
                    download_url: format!("/api/files/download-split/{}", file.id),
                    file_id: file.id.clone(),
                };
                status.set(SplitPhase::Complete, outcome.total_files, outcome.total_files);
                progress.emit(SplitEvent::Complete(outcome.clone()));
                tracing::info!(
                    "Split {} into {} files in {:?}",
                    file.id,
                    outcome.total_files,
                    started.elapsed()
                );
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                status.fail(message.clone());
                progress.emit(SplitEvent::Error { message });
                tracing::warn!("Split of {} failed: {}", file.id, e);
                Err(e)
            }
        };
        // a cancelled job may still hold a sink clone
        progress.close();
        result
    }

    /// Chunk file names from the last split of `id`, sorted
    pub async fn list_outputs(&self, id: &str) -> Result<Vec<String>> {
        let dir = self.layout.split_dir(id)?;
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(Error::not_found(format!("No split output for {}; split the document first", id)));
        }
        let files = list_docx(&dir).await?;
        if files.is_empty() {
            return Err(Error::not_found(format!("No split files found for {}", id)));
        }
        Ok(files)
    }
}

async fn reset_outputs(job: &SplitJob) -> Result<()> {
    match tokio::fs::remove_dir_all(&job.out_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    crate::storage::remove_if_exists(&job.zip_path).await?;
    tokio::fs::create_dir_all(&job.out_dir).await?;
    Ok(())
}

fn reset_outputs_blocking(job: &SplitJob) -> Result<()> {
    match std::fs::remove_dir_all(&job.out_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    match std::fs::remove_file(&job.zip_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(&job.out_dir)?;
    Ok(())
}

/// Best effort removal after a failed split
async fn discard_outputs(job: &SplitJob) {
    if let Err(e) = tokio::fs::remove_dir_all(&job.out_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", job.out_dir.display(), e);
        }
    }
    for path in [job.zip_path.clone(), archive_tmp(&job.zip_path)] {
        if let Err(e) = crate::storage::remove_if_exists(&path).await {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn archive_tmp(zip_path: &Path) -> PathBuf {
    zip_path.with_extension("zip.tmp")
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;

/// Decides whether a job or its deadline got there first
#[derive(Debug, Default)]
struct JobGate(AtomicU8);

impl JobGate {
    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::Acquire) == CANCELLED {
            Err(Error::Timeout("Split cancelled after timeout".to_string()))
        } else {
            Ok(())
        }
    }

    /// Job side; false once the deadline has claimed the job
    fn finish(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Deadline side; false when the job already finished
    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

async fn run_job(
    script: Option<SplitScript>,
    job: SplitJob,
    guard: OwnedMutexGuard<()>,
    progress: ProgressSink,
    status: StatusHandle,
    gate: Arc<JobGate>,
) -> Result<Vec<String>> {
    let _guard = guard;

    let result = match &script {
        None => run_native(&job, &progress, &status, &gate).await,
        Some(script) => run_script(script, &job, &progress, &status, &gate).await,
    };
    let result = result.and_then(|files| {
        if gate.finish() {
            Ok(files)
        } else {
            Err(Error::Timeout("Split cancelled after timeout".to_string()))
        }
    });

    if let Err(e) = &result {
        tracing::debug!("Discarding split outputs in {}: {}", job.out_dir.display(), e);
        discard_outputs(&job).await;
    }
    result
}

async fn run_native(
    job: &SplitJob,
    progress: &ProgressSink,
    status: &StatusHandle,
    gate: &Arc<JobGate>,
) -> Result<Vec<String>> {
    let (job, progress, status, gate) = (job.clone(), progress.clone(), status.clone(), Arc::clone(gate));
    tokio::task::spawn_blocking(move || {
        let files = split_native(&job, &progress, &status, &gate)?;
        write_archive(&job, &files, &progress, &status, &gate)?;
        Ok(files)
    })
    .await
    .map_err(|e| Error::internal(format!("Split task failed: {}", e)))?
}

async fn run_script(
    script: &SplitScript,
    job: &SplitJob,
    progress: &ProgressSink,
    status: &StatusHandle,
    gate: &Arc<JobGate>,
) -> Result<Vec<String>> {
    reset_outputs(job).await?;
    script
        .run(&job.input, &job.out_dir, job.pages_per_file, progress, status)
        .await?;
    gate.check()?;

    let files = list_docx(&job.out_dir).await?;
    if files.is_empty() {
        return Err(Error::external("Split produced no DOCX files"));
    }

    let (job, progress, status, gate) = (job.clone(), progress.clone(), status.clone(), Arc::clone(gate));
    tokio::task::spawn_blocking(move || {
        write_archive(&job, &files, &progress, &status, &gate).map(|_| files)
    })
    .await
    .map_err(|e| Error::internal(format!("Archive task failed: {}", e)))?
}

async fn list_docx(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(".docx") && entry.file_type().await?.is_file() {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

fn split_native(
    job: &SplitJob,
    progress: &ProgressSink,
    status: &StatusHandle,
    gate: &JobGate,
) -> Result<Vec<String>> {
    reset_outputs_blocking(job)?;

    let package = DocxPackage::open(&job.input)?;
    let body = DocumentBody::parse(package.document_xml()?)?;
    if !body.has_page_markers() {
        tracing::info!(
            "No page breaks in {}, estimating {} blocks per page",
            job.input.display(),
            job.paragraphs_per_page
        );
    }
    let chunks = body.chunks(job.pages_per_file as usize, job.paragraphs_per_page);

    let total = chunks.len();
    progress.emit(SplitEvent::TotalFiles { total });

    let mut files = Vec::with_capacity(total);
    for chunk in &chunks {
        gate.check()?;
        let index = chunk.index;
        status.set(SplitPhase::Splitting, index, total);
        progress.emit(SplitEvent::FileStart { current: index, total });

        let name = chunk_file_name(&job.stem, index, total);
        progress.emit(SplitEvent::FileStep {
            file_index: index,
            step: "packaging".to_string(),
            percentage: 50,
        });
        if let Err(e) = package.save_with_document(&chunk.xml, &job.out_dir.join(&name)) {
            progress.emit(SplitEvent::FileError {
                file_index: index,
                message: e.to_string(),
            });
            return Err(e);
        }
        progress.emit(SplitEvent::FileStep {
            file_index: index,
            step: "saved".to_string(),
            percentage: 100,
        });
        progress.emit(SplitEvent::FileComplete { completed: index, total });
        files.push(name);
    }
    gate.check()?;

    progress.emit(SplitEvent::AllComplete {
        completed: files.len(),
        total,
    });
    Ok(files)
}

/// Archive the chunk files into the aggregate zip
fn write_archive(
    job: &SplitJob,
    files: &[String],
    progress: &ProgressSink,
    status: &StatusHandle,
    gate: &JobGate,
) -> Result<()> {
    let tmp = archive_tmp(&job.zip_path);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(&tmp)?));
    // chunk files are zip containers already
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    let total = files.len();
    for (i, name) in files.iter().enumerate() {
        gate.check()?;
        let current = i + 1;
        status.set(SplitPhase::Zipping, current, total);

        zip.start_file(name.as_str(), options)?;
        let mut source = File::open(job.out_dir.join(name))?;
        std::io::copy(&mut source, &mut zip)?;

        progress.emit(SplitEvent::ZipProgress {
            current,
            total,
            percentage: (current * 100 / total.max(1)) as u8,
            file_name: name.clone(),
        });
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);
    gate.check()?;
    std::fs::rename(&tmp, &job.zip_path)?;
    Ok(())
}

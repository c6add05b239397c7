//! Analysis orchestration
//!
//! Reads a stored file's text, runs the analysis and error-detection
//! prompts concurrently and writes both results back onto the sidecar.

use std::sync::Arc;

use crate::docx::{extract_docx_text, DocxPackage};
use crate::error::{Error, Result};
use crate::extract::{parse_embedded_json, Shape};
use crate::providers::{ChatProvider, PromptBuilder};
use crate::storage::MetadataStore;
use crate::types::{is_code_file, is_text_mime, AnalysisResult, FileError, StoredFile};

/// Analysis from an AI answer; unreadable answers give the placeholder
pub fn parse_analysis(answer: &str) -> AnalysisResult {
    match parse_embedded_json(answer, Shape::Object) {
        Ok(value) => AnalysisResult::from_value(&value),
        Err(e) => {
            tracing::warn!("Analysis answer was not usable JSON: {}", e);
            AnalysisResult::unavailable()
        }
    }
}

/// Detected errors from an AI answer; unreadable answers give none
pub fn parse_detected_errors(answer: &str) -> Vec<FileError> {
    match parse_embedded_json(answer, Shape::Array) {
        Ok(value) => FileError::list_from_value(&value),
        Err(e) => {
            tracing::warn!("Error-detection answer was not usable JSON: {}", e);
            Vec::new()
        }
    }
}

/// Runs analyses and stores the results
#[derive(Clone)]
pub struct Analyzer {
    store: MetadataStore,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl Analyzer {
    /// `provider` is `None` when no API key is configured
    pub fn new(store: MetadataStore, provider: Option<Arc<dyn ChatProvider>>) -> Self {
        Self { store, provider }
    }

    /// Text content of a stored file
    pub async fn read_content(&self, file: &StoredFile) -> Result<String> {
        let path = self.store.layout().binary_path(&file.name)?;

        if is_text_mime(&file.mime_type) || is_code_file(&file.original_name) {
            let bytes = tokio::fs::read(&path).await?;
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        if file.is_docx() {
            return tokio::task::spawn_blocking(move || {
                let package = DocxPackage::open(&path)?;
                extract_docx_text(&package)
            })
            .await
            .map_err(|e| Error::internal(format!("Text extraction failed: {}", e)))?;
        }

        Err(Error::validation(format!(
            "Unsupported file type for analysis: {}",
            file.mime_type
        )))
    }

    /// Analyze a stored file and persist the results on its record
    pub async fn analyze(&self, id: &str) -> Result<StoredFile> {
        let file = self.store.load(id).await?;
        let content = self.read_content(&file).await?;
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| Error::Config("DeepSeek API key is not configured".to_string()))?;

        tracing::info!(
            "Analyzing {} ({}, {} chars) with {}/{}",
            file.original_name,
            file.mime_type,
            content.chars().count(),
            provider.name(),
            provider.model()
        );

        let analysis_prompt =
            PromptBuilder::build_analysis_prompt(&content, &file.original_name, &file.mime_type);
        let detection_prompt = PromptBuilder::build_detection_prompt(&content, &file.original_name);

        let (analysis, detection) = tokio::join!(
            provider.complete(&analysis_prompt),
            provider.complete(&detection_prompt)
        );

        let analysis = match analysis {
            Ok(answer) => parse_analysis(&answer),
            Err(e @ Error::Timeout(_)) => return Err(e),
            Err(e) => return Err(Error::external(format!("File analysis failed: {}", e))),
        };
        let errors = match detection {
            Ok(answer) => parse_detected_errors(&answer),
            Err(e) => {
                tracing::warn!("Error detection failed for {}: {}", id, e);
                Vec::new()
            }
        };

        let updated = self.store.attach_analysis(id, analysis, errors).await?;
        tracing::info!(
            "Analysis stored for {} ({} issues)",
            id,
            updated.errors.as_ref().map_or(0, Vec::len)
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageLayout;
    use crate::types::{Complexity, FileCategory, Severity};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Answers analysis and detection prompts with canned text
    struct CannedProvider {
        analysis: Option<String>,
        detection: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedProvider {
        fn new(analysis: Option<&str>, detection: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                analysis: analysis.map(str::to_string),
                detection: detection.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for CannedProvider {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            let answer = if prompt.contains("Return ONLY the JSON array") {
                &self.detection
            } else {
                &self.analysis
            };
            answer.clone().ok_or_else(|| Error::external("service down"))
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    async fn store_with(dir: &TempDir, name: &str, mime: &str, data: &[u8]) -> (MetadataStore, StoredFile) {
        let store = MetadataStore::new(StorageLayout::new(dir.path()));
        let file = store.create(name, mime, data).await.unwrap();
        (store, file)
    }

    #[tokio::test]
    async fn test_analysis_stored() {
        let dir = TempDir::new().unwrap();
        let (store, file) = store_with(&dir, "schedule.txt", "text/plain", b"Pour slab on 3/4").await;
        let provider = CannedProvider::new(
            Some("Here you go:\n{\"category\": \"document\", \"summary\": \"A pour schedule\", \"complexity\": \"low\"}"),
            Some("[{\"line\": 1, \"message\": \"ambiguous date\", \"severity\": \"warning\"}]"),
        );
        let analyzer = Analyzer::new(store.clone(), Some(provider.clone()));

        let updated = analyzer.analyze(&file.id).await.unwrap();
        let analysis = updated.analysis.unwrap();
        assert_eq!(analysis.category, FileCategory::Document);
        assert_eq!(analysis.complexity, Complexity::Low);
        let errors = updated.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, Severity::Warning);

        let reloaded = store.load(&file.id).await.unwrap();
        assert_eq!(reloaded.analysis.unwrap().summary, "A pour schedule");
        assert_eq!(provider.prompts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_answers_default() {
        let dir = TempDir::new().unwrap();
        let (store, file) = store_with(&dir, "main.rs", "application/octet-stream", b"fn main() {}").await;
        let analyzer = Analyzer::new(
            store,
            Some(CannedProvider::new(Some("I cannot help with that."), Some("none found"))),
        );

        let updated = analyzer.analyze(&file.id).await.unwrap();
        assert_eq!(updated.analysis.unwrap().summary, "analysis unavailable");
        assert_eq!(updated.errors, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_detection_failure_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let (store, file) = store_with(&dir, "notes.md", "text/markdown", b"# Notes").await;
        let analyzer = Analyzer::new(
            store,
            Some(CannedProvider::new(Some("{\"summary\": \"notes\"}"), None)),
        );

        let updated = analyzer.analyze(&file.id).await.unwrap();
        assert_eq!(updated.analysis.unwrap().summary, "notes");
        assert_eq!(updated.errors, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_analysis_failure_is_external_error() {
        let dir = TempDir::new().unwrap();
        let (store, file) = store_with(&dir, "notes.txt", "text/plain", b"x").await;
        let analyzer = Analyzer::new(store.clone(), Some(CannedProvider::new(None, Some("[]"))));

        let err = analyzer.analyze(&file.id).await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
        assert!(store.load(&file.id).await.unwrap().analysis.is_none());
    }

    #[tokio::test]
    async fn test_rejections() {
        let dir = TempDir::new().unwrap();
        let (store, image) = store_with(&dir, "site.png", "image/png", b"\x89PNG").await;
        let (_, text) = store_with(&dir, "a.txt", "text/plain", b"x").await;

        let analyzer = Analyzer::new(store.clone(), Some(CannedProvider::new(Some("{}"), Some("[]"))));
        assert!(matches!(analyzer.analyze(&image.id).await, Err(Error::Validation(_))));
        assert!(matches!(analyzer.analyze("missing").await, Err(Error::NotFound(_))));

        let keyless = Analyzer::new(store, None);
        assert!(matches!(keyless.analyze(&text.id).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_docx_text_is_read() {
        let dir = TempDir::new().unwrap();
        let xml = "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>Rebar spacing 150mm</w:t></w:r></w:p></w:body></w:document>";
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut zip, xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        let (store, file) = store_with(
            &dir,
            "method_statement.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            buf.get_ref(),
        )
        .await;

        let analyzer = Analyzer::new(store, None);
        assert_eq!(analyzer.read_content(&file).await.unwrap(), "Rebar spacing 150mm");
    }
}

//! Application state for the document server

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::analysis::Analyzer;
use crate::config::AppConfig;
use crate::docx::DocxSplitter;
use crate::error::{Error, Result};
use crate::external::{ExcelModifier, ScriptRunner};
use crate::providers::{ChatProvider, CozeClient, DeepSeekClient};
use crate::retention::CleanupService;
use crate::storage::{MetadataStore, StorageLayout};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Upload paths
    layout: StorageLayout,
    /// Sidecar metadata
    store: MetadataStore,
    /// Retention sweeper
    cleanup: CleanupService,
    /// DOCX splitter
    splitter: DocxSplitter,
    /// Spreadsheet correction script
    excel: ExcelModifier,
    /// Analysis orchestrator
    analyzer: Analyzer,
    /// Coze workflow client, when configured
    coze: Option<CozeClient>,
}

/// Treat a missing credential as "feature off" instead of a startup failure
fn optional<T>(what: &str, built: Result<T>) -> Result<Option<T>> {
    match built {
        Ok(client) => Ok(Some(client)),
        Err(Error::Config(msg)) => {
            tracing::warn!("{} disabled: {}", what, msg);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl AppState {
    /// Create new application state
    pub fn new(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing document service state...");

        let layout = StorageLayout::from_config(&config.storage);
        layout.ensure_dirs()?;
        tracing::info!("Upload directory: {}", layout.root().display());

        let store = MetadataStore::new(layout.clone());
        let cleanup = CleanupService::new(layout.root(), config.retention.clone());

        let runner = ScriptRunner::from_config(&config.scripts);
        let splitter = DocxSplitter::new(layout.clone(), config.splitter.clone(), &runner);
        let excel = ExcelModifier::new(runner, &config.scripts.excel_script, layout.modified_dir());

        let deepseek = optional("DeepSeek analysis", DeepSeekClient::new(&config.deepseek))?
            .map(|client| Arc::new(client) as Arc<dyn ChatProvider>);
        let analyzer = Analyzer::new(store.clone(), deepseek);
        let coze = optional("Coze workflow", CozeClient::new(&config.coze))?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                layout,
                store,
                cleanup,
                splitter,
                excel,
                analyzer,
                coze,
            }),
        })
    }

    /// Start the retention sweeper if enabled
    pub fn start_background_tasks(&self) -> Option<JoinHandle<()>> {
        if self.inner.config.retention.enabled {
            Some(self.inner.cleanup.clone().start_background())
        } else {
            tracing::info!("Retention sweeps disabled");
            None
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.inner.layout
    }

    pub fn store(&self) -> &MetadataStore {
        &self.inner.store
    }

    pub fn cleanup(&self) -> &CleanupService {
        &self.inner.cleanup
    }

    pub fn splitter(&self) -> &DocxSplitter {
        &self.inner.splitter
    }

    pub fn excel(&self) -> &ExcelModifier {
        &self.inner.excel
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.inner.analyzer
    }

    /// Coze client, or a config error when no token/workflow is set
    pub fn coze(&self) -> Result<&CozeClient> {
        self.inner
            .coze
            .as_ref()
            .ok_or_else(|| Error::Config("Coze workflow is not configured".to_string()))
    }
}

//! The aggregated configuration of a project.

use crate::config::loader::CONFIG_DIR;
use crate::documents::InMemoryDocumentStore;
use pl_protocol::config_models::EngineSettings;
use pl_protocol::document_models::ContextDocument;
use pl_protocol::pipeline_models::PipelineDefinition;
use std::path::{Path, PathBuf};

/// Everything loaded from a project's `.promptline/` directory.
///
/// - `config.toml`: engine settings
/// - `pipelines/*.yaml`: pipeline definitions
/// - `documents/*.md`: context documents
///
/// # Example
///
/// ```rust,no_run
/// use pl_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} pipelines and {} documents",
///          config.pipelines.len(),
///          config.documents.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Settings from `config.toml`.
    pub settings: EngineSettings,

    /// Pipeline definitions sorted by file name.
    pub pipelines: Vec<PipelineDefinition>,

    /// Context documents sorted by file name.
    pub documents: Vec<ContextDocument>,
}

impl AppConfig {
    pub fn find_pipeline(&self, id: &str) -> Option<&PipelineDefinition> {
        self.pipelines.iter().find(|p| p.id == id)
    }

    /// A document store holding every loaded document.
    pub fn document_store(&self) -> InMemoryDocumentStore {
        InMemoryDocumentStore::new(self.documents.clone())
    }

    /// Directory where run records are written for a project rooted at `root`.
    ///
    /// A relative `runs-dir` is resolved inside `.promptline/`.
    pub fn runs_path(&self, root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(&self.settings.runs_dir)
    }
}

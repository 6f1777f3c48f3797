//! Configuration loader for the `.promptline/` directory structure.
//!
//! ```text
//! .promptline/
//! ├── config.toml          engine settings
//! ├── pipelines/*.yaml     pipeline definitions (.yml also accepted)
//! └── documents/*.md       context documents with optional front matter
//! ```

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::AppConfig;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use pl_protocol::config_models::EngineSettings;
use pl_protocol::document_models::ContextDocument;
use pl_protocol::pipeline_models::PipelineDefinition;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the configuration directory under a project root.
pub const CONFIG_DIR: &str = ".promptline";

/// Loads all configuration from the `.promptline/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.promptline/` folder
///
/// # Returns
///
/// An `AppConfig` with everything that was found. Missing directories or
/// files yield defaults rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid syntax (TOML, YAML, or Markdown front matter)
/// - Pipeline or document ids are empty or duplicated
///
/// # Example
///
/// ```rust,no_run
/// use pl_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} pipelines", config.pipelines.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let config_dir = root.join(CONFIG_DIR);

    if !config_dir.exists() {
        debug!(path = %config_dir.display(), "no config directory, using defaults");
        return Ok(AppConfig::default());
    }

    let settings = load_settings(&config_dir)?;
    let pipelines = load_pipelines(&config_dir)?;
    let documents = load_documents(&config_dir)?;

    debug!(
        pipelines = pipelines.len(),
        documents = documents.len(),
        "configuration loaded"
    );

    Ok(AppConfig {
        settings,
        pipelines,
        documents,
    })
}

/// Loads engine settings from `config.toml`.
fn load_settings(config_dir: &Path) -> ConfigResult<EngineSettings> {
    let config_path = config_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(EngineSettings::default());
    }

    let content = read_file(&config_path)?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

/// Loads all pipeline definitions from `pipelines/*.yaml` and `pipelines/*.yml`.
fn load_pipelines(config_dir: &Path) -> ConfigResult<Vec<PipelineDefinition>> {
    let mut pipelines = Vec::new();
    let mut seen = HashSet::new();

    for path in list_files(&config_dir.join("pipelines"), &["yaml", "yml"])? {
        let content = read_file(&path)?;
        let pipeline: PipelineDefinition =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.clone(),
                source,
            })?;

        validate_pipeline(&pipeline, &path)?;
        if !seen.insert(pipeline.id.clone()) {
            return Err(invalid(&path, format!("duplicate pipeline id '{}'", pipeline.id)));
        }

        pipelines.push(pipeline);
    }

    Ok(pipelines)
}

fn validate_pipeline(pipeline: &PipelineDefinition, path: &Path) -> ConfigResult<()> {
    if pipeline.id.trim().is_empty() {
        return Err(invalid(path, "pipeline id must not be empty".to_string()));
    }

    for (index, step) in pipeline.steps.iter().enumerate() {
        if step.framework_id.trim().is_empty() {
            return Err(invalid(
                path,
                format!("step {index} of pipeline '{}' has no framework-id", pipeline.id),
            ));
        }
    }

    Ok(())
}

/// Optional front matter of a context document.
#[derive(Debug, Default, Deserialize)]
struct DocumentFrontMatter {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Loads all context documents from `documents/*.md`.
///
/// The Markdown body is the document content. `id` defaults to the file
/// stem and `name` defaults to the id.
fn load_documents(config_dir: &Path) -> ConfigResult<Vec<ContextDocument>> {
    let mut documents = Vec::new();
    let mut seen = HashSet::new();
    let matter = Matter::<YAML>::new();

    for path in list_files(&config_dir.join("documents"), &["md"])? {
        let content = read_file(&path)?;
        let parsed = matter.parse(&content);

        let front: DocumentFrontMatter = match parsed.data {
            Some(data) => data.deserialize().map_err(|e| ConfigError::MarkdownParse {
                path: path.clone(),
                reason: format!("Failed to deserialize front matter: {e}"),
            })?,
            None => DocumentFrontMatter::default(),
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let id = front.id.filter(|id| !id.trim().is_empty()).unwrap_or(stem);
        if id.is_empty() {
            return Err(invalid(&path, "document id must not be empty".to_string()));
        }
        if !seen.insert(id.clone()) {
            return Err(invalid(&path, format!("duplicate document id '{id}'")));
        }
        let name = front.name.unwrap_or_else(|| id.clone());

        documents.push(ContextDocument {
            id,
            name,
            content: parsed.content,
        });
    }

    Ok(documents)
}

/// Files directly inside `dir` with one of `extensions`, sorted by name.
///
/// A missing directory yields an empty list.
fn list_files(dir: &Path, extensions: &[&str]) -> ConfigResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        let ext = path.extension().and_then(|s| s.to_str());
        if entry.file_type().is_file() && ext.is_some_and(|e| extensions.contains(&e)) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path, reason: String) -> ConfigError {
    ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    }
}

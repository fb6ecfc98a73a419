//! Template Parser
//!
//! Loads workflow templates from YAML or JSON and resolves template ids
//! through a [`TemplateLoader`].
//!
//! Two loaders are provided:
//! - [`DirectoryLoader`]: reads `<dir>/<id>.yaml`, `<id>.yml` or `<id>.json`
//! - [`TemplateCatalog`]: in-memory templates with an optional fallback loader

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use super::model::WorkflowTemplate;
use super::validator::validate_template;
use crate::error::TemplateError;

/// File extensions tried by [`DirectoryLoader`], in order.
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Source of templates, looked up by id.
pub trait TemplateLoader: Send + Sync {
    fn load(&self, template_id: &str) -> Result<WorkflowTemplate, TemplateError>;
}

/// Parses and validates a template from text.
///
/// JSON is used when `is_json` is set, YAML otherwise. A missing `id` field
/// is filled in with `template_id`.
pub fn parse_template(
    template_id: &str,
    content: &str,
    is_json: bool,
) -> Result<WorkflowTemplate, TemplateError> {
    let parsed: Result<WorkflowTemplate, String> = if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    };

    let mut template = parsed.map_err(|reason| TemplateError::Parse {
        id: template_id.to_string(),
        reason,
    })?;

    if template.id.trim().is_empty() {
        template.id = template_id.to_string();
    }

    validate_template(&template).map_err(|e| TemplateError::Invalid {
        id: template.id.clone(),
        reason: e.to_string(),
    })?;

    debug!("Parsed template '{}' ({} steps)", template.id, template.len());
    Ok(template)
}

/// Loads a template file, using the file stem as the default id.
///
/// # Example
///
/// ```rust,no_run
/// use civicflow::workflow::load_template;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("templates/eligibility_check.yaml")?;
///     println!("Loaded {} steps", template.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_template(path: impl AsRef<Path>) -> Result<WorkflowTemplate, TemplateError> {
    let path = path.as_ref();
    let template_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template")
        .to_string();

    info!("Loading template from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| TemplateError::Read {
        id: template_id.clone(),
        source,
    })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    parse_template(&template_id, &content, is_json)
}

/// Writes a template to a YAML file.
pub fn save_template(
    template: &WorkflowTemplate,
    path: impl AsRef<Path>,
) -> Result<(), TemplateError> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(template).map_err(|e| TemplateError::Parse {
        id: template.id.clone(),
        reason: e.to_string(),
    })?;

    fs::write(path, yaml).map_err(|source| TemplateError::Read {
        id: template.id.clone(),
        source,
    })?;

    info!("Template '{}' saved to: {}", template.id, path.display());
    Ok(())
}

/// Resolves template ids to files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, template_id: &str) -> Option<PathBuf> {
        // Ids are plain file stems, never paths
        if template_id.is_empty()
            || template_id.contains(['/', '\\'])
            || template_id.starts_with('.')
        {
            return None;
        }

        TEMPLATE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", template_id, ext)))
            .find(|path| path.is_file())
    }
}

impl TemplateLoader for DirectoryLoader {
    fn load(&self, template_id: &str) -> Result<WorkflowTemplate, TemplateError> {
        let path = self
            .resolve(template_id)
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;

        let mut template = load_template(&path)?;
        template.id = template_id.to_string();
        Ok(template)
    }
}

/// In-memory templates, consulted before an optional fallback loader.
#[derive(Default, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<String, WorkflowTemplate>,
    fallback: Option<Arc<dyn TemplateLoader>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template under its own id.
    pub fn with_template(mut self, template: WorkflowTemplate) -> Self {
        self.insert(template);
        self
    }

    /// Sets the loader used for ids not held in memory.
    pub fn with_fallback(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.fallback = Some(Arc::new(loader));
        self
    }

    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }
}

impl TemplateLoader for TemplateCatalog {
    fn load(&self, template_id: &str) -> Result<WorkflowTemplate, TemplateError> {
        if let Some(template) = self.templates.get(template_id) {
            return Ok(template.clone());
        }

        match &self.fallback {
            Some(loader) => loader.load(template_id),
            None => Err(TemplateError::NotFound(template_id.to_string())),
        }
    }
}

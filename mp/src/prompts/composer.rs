//! Prompt Composer
//!
//! Turns a `Context` and a raw prompt into the (system instruction, user
//! message) pair sent to the completion service. No I/O happens per call: the
//! template is loaded and compiled once when the composer is built.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::embedded;
use crate::scanner::Context;

const TEMPLATE_NAME: &str = "enrich";

/// Errors from template compilation or rendering
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to compile template {name}: {message}")]
    Template { name: String, message: String },

    #[error("Failed to render template: {0}")]
    Render(String),
}

/// The two messages of one enrichment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system_instruction: String,
    pub user_message: String,
}

/// Signatures of one file, grouped for the template
#[derive(Debug, Serialize)]
struct FileSignatures<'a> {
    path: &'a str,
    signatures: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct TemplateData<'a> {
    root_name: String,
    total_files: usize,
    analyzed_files: usize,
    truncated: bool,
    files: Vec<FileSignatures<'a>>,
}

impl<'a> TemplateData<'a> {
    fn from_context(context: &'a Context) -> Self {
        let mut files: Vec<FileSignatures<'a>> = Vec::new();
        for sig in context.signatures() {
            match files.last_mut() {
                Some(group) if group.path == sig.path => group.signatures.push(sig.text.as_str()),
                _ => files.push(FileSignatures {
                    path: sig.path.as_str(),
                    signatures: vec![sig.text.as_str()],
                }),
            }
        }

        let root_name = context
            .root_path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| context.root_path().display().to_string());

        Self {
            root_name,
            total_files: context.total_files(),
            analyzed_files: files.len(),
            truncated: context.truncated(),
            files,
        }
    }
}

/// Renders enrichment prompts from a compiled template
pub struct PromptComposer {
    hbs: Handlebars<'static>,
    source: Option<PathBuf>,
}

impl std::fmt::Debug for PromptComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptComposer").field("source", &self.source).finish()
    }
}

impl PromptComposer {
    /// Composer using the embedded template
    pub fn embedded() -> Result<Self, PromptError> {
        debug!("PromptComposer::embedded: called");
        Self::from_template(embedded::ENRICH, None)
    }

    /// Compile a template string
    pub fn from_template(template: &str, source: Option<PathBuf>) -> Result<Self, PromptError> {
        debug!(template_len = template.len(), ?source, "PromptComposer::from_template: called");
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| PromptError::Template {
                name: source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| TEMPLATE_NAME.to_string()),
                message: e.to_string(),
            })?;
        Ok(Self { hbs, source })
    }

    /// Load the first override found for this project, falling back to the
    /// embedded template when none exists or an override fails to compile
    pub fn load(project_root: &Path) -> Result<Self, PromptError> {
        debug!(?project_root, "PromptComposer::load: called");
        let candidates = [
            Some(project_root.join(".magic-prompt").join("prompts").join("enrich.pmt")),
            dirs::config_dir().map(|d| d.join("magic-prompt").join("prompts").join("enrich.pmt")),
        ];

        for path in candidates.into_iter().flatten() {
            if !path.is_file() {
                debug!(?path, "PromptComposer::load: no override here");
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(template) => match Self::from_template(&template, Some(path.clone())) {
                    Ok(composer) => {
                        info!("Using prompt template from {}", path.display());
                        return Ok(composer);
                    }
                    Err(e) => warn!(error = %e, "PromptComposer::load: override rejected"),
                },
                Err(e) => warn!(?path, error = %e, "PromptComposer::load: failed to read override"),
            }
        }

        Self::embedded()
    }

    /// Where the template came from (None for the embedded one)
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Render the system instruction and normalize the user message
    pub fn compose(&self, context: &Context, raw_prompt: &str) -> Result<ComposedPrompt, PromptError> {
        debug!(
            prompt_len = raw_prompt.len(),
            signatures = context.signatures().len(),
            "PromptComposer::compose: called"
        );
        let data = TemplateData::from_context(context);
        let system_instruction = self
            .hbs
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| PromptError::Render(e.to_string()))?;

        Ok(ComposedPrompt {
            system_instruction,
            user_message: raw_prompt.trim().to_string(),
        })
    }
}

//! Prompt composition
//!
//! Renders the system instruction from a project `Context` and pairs it with
//! the user's raw prompt.
//!
//! Template loading chain:
//! 1. `<project>/.magic-prompt/prompts/enrich.pmt` (project override)
//! 2. `<config_dir>/magic-prompt/prompts/enrich.pmt` (user override)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax, rendered without HTML escaping.

mod composer;
pub mod embedded;

pub use composer::{ComposedPrompt, PromptComposer, PromptError};

//! Embedded prompts
//!
//! Compiled into the binary from .pmt files at build time.

use tracing::debug;

/// System instruction template for prompt enrichment
pub const ENRICH: &str = include_str!("../../prompts/enrich.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "enrich" => Some(ENRICH),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

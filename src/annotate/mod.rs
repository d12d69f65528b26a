//! The external annotation tool behind a narrow async interface.

mod tool;

#[cfg(test)]
pub mod testing;

pub use tool::ExternalTool;

use anyhow::Result;
use async_trait::async_trait;

/// A line-oriented annotator: newline-delimited text in, annotated text out.
///
/// Output is opaque to the pipeline and never parsed. Implementations signal
/// failure by returning an error; empty output for non-empty input is judged
/// by the caller, not here.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Annotate one chunk of text.
    async fn annotate(&self, input: &[u8]) -> Result<Vec<u8>>;
}

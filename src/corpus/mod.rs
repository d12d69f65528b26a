//! Corpus layout and file discovery.

pub mod layout;
pub mod walker;

pub use layout::Layout;
pub use walker::{CorpusStatus, CorpusWalker, RunSummary, WalkerConfig, corpus_status};

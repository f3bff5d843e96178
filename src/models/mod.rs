//! Data models for marketcrawl.

mod extension;

pub use extension::{ArchiveState, Extension, ExtensionRecord};

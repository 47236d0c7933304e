//! Shared types, error model, and configuration for Atomizer.
//!
//! This crate is the foundation depended on by all other Atomizer crates.
//! It provides:
//! - [`AtomizerError`], the unified error type
//! - Domain types ([`Node`], [`Atom`], [`ContextRecord`], [`JobDescriptor`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EmbeddingConfig, QueueConfig, StorageConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{AtomizerError, Result};
pub use types::{
    Atom, ChildRef, ContextRecord, Embedding, EmbeddingTarget, FailedJob, JobDescriptor, Node,
    NodeType, RowId, new_node_id,
};

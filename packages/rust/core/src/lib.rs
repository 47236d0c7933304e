//! Core pipeline and domain logic for Atomizer.
//!
//! Forward direction: text is parsed, flattened into atoms, reduced into
//! contexts, and persisted (`decompose_document`). Backward direction:
//! persisted contexts are rehydrated into trees, enriched with content,
//! and aggregated into per-context embeddings. The drainer fills in atom
//! embeddings from a job queue.

pub mod aggregate;
pub mod decompose;
pub mod drain;
pub mod embedding;
pub mod enrich;
pub mod pipeline;
pub mod rehydrate;
pub mod store;

pub use aggregate::{AggregateOutcome, aggregate_batch, aggregate_context};
pub use decompose::{flatten_atoms, reduce_to_contexts};
pub use drain::{DrainReport, Drainer, ShutdownSignal, parse_job_batch};
pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use enrich::{ContentNode, enrich, expand};
pub use pipeline::{
    DecomposeOptions, DecomposeResult, Decomposition, ProgressReporter, SilentProgress,
    decompose_document,
};
pub use rehydrate::{StructureNode, rehydrate, retrieve_nested_context};
pub use store::{AtomStore, ContextStore, JobQueue, RowStore};

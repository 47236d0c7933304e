//! End-to-end `decompose` pipeline: text → parse → atoms + contexts → store.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument};

use atomizer_shared::{Atom, ContextRecord, EmbeddingTarget, Node, Result};

use crate::decompose::{flatten_atoms, reduce_to_contexts};
use crate::store::{AtomStore, ContextStore, JobQueue};

/// Options for [`decompose_document`].
#[derive(Debug, Clone, Default)]
pub struct DecomposeOptions {
    /// Passed through onto every context record.
    pub owner: Option<String>,
    /// Queue to receive one embedding job per atom, if any.
    pub enqueue_to: Option<String>,
}

/// In-memory result of decomposing a text, before anything is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Decomposition {
    pub forest: Vec<Node>,
    pub atoms: Vec<Atom>,
    pub contexts: Vec<ContextRecord>,
}

impl Decomposition {
    /// Parse `text` and project it into atoms and contexts.
    pub fn from_text(text: &str, owner: Option<&str>) -> Self {
        let forest = atomizer_markdown::parse(text);
        let atoms = flatten_atoms(&forest);
        let contexts = reduce_to_contexts(&forest, owner);
        Self {
            forest,
            atoms,
            contexts,
        }
    }

    pub fn root_ids(&self) -> Vec<String> {
        self.forest.iter().map(|n| n.id.clone()).collect()
    }
}

/// Result of the `decompose` pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DecomposeResult {
    pub root_ids: Vec<String>,
    pub atom_count: usize,
    pub context_count: usize,
    pub jobs_enqueued: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a batch of records has been written.
    fn persisted(&self, kind: &str, count: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &DecomposeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn persisted(&self, _kind: &str, _count: usize) {}
    fn done(&self, _result: &DecomposeResult) {}
}

/// Run the full `decompose` pipeline.
///
/// 1. Parse the text into a forest
/// 2. Flatten atoms and reduce contexts
/// 3. Persist atoms, then contexts
/// 4. Optionally enqueue one embedding job per atom
///
/// Each phase is its own write. A failure after the atoms phase leaves those
/// atoms stored with no context referring to them; nothing is rolled back.
/// A retry parses the text again under fresh ids, so it never collides with
/// the orphaned rows.
#[instrument(skip_all, fields(owner = ?options.owner))]
pub async fn decompose_document<S>(
    store: &S,
    text: &str,
    options: &DecomposeOptions,
    progress: &dyn ProgressReporter,
) -> Result<DecomposeResult>
where
    S: AtomStore + ContextStore + JobQueue + ?Sized,
{
    let start = Instant::now();

    // --- Phase 1: Parse ---
    progress.phase("Parsing");
    let decomposition = Decomposition::from_text(text, options.owner.as_deref());
    info!(
        roots = decomposition.forest.len(),
        atoms = decomposition.atoms.len(),
        contexts = decomposition.contexts.len(),
        "text decomposed"
    );

    // --- Phase 2: Persist ---
    progress.phase("Storing atoms");
    AtomStore::insert_atoms(store, &decomposition.atoms).await?;
    progress.persisted("atoms", decomposition.atoms.len());

    progress.phase("Storing contexts");
    ContextStore::insert_contexts(store, &decomposition.contexts).await?;
    progress.persisted("contexts", decomposition.contexts.len());

    // --- Phase 3: Enqueue embedding jobs ---
    let mut jobs_enqueued = 0;
    if let Some(queue_name) = &options.enqueue_to {
        progress.phase("Enqueueing embedding jobs");
        for atom in &decomposition.atoms {
            store
                .enqueue_job(queue_name, &EmbeddingTarget::atom(atom.id.as_str()))
                .await?;
            jobs_enqueued += 1;
        }
        progress.persisted("jobs", jobs_enqueued);
    }

    let result = DecomposeResult {
        root_ids: decomposition.root_ids(),
        atom_count: decomposition.atoms.len(),
        context_count: decomposition.contexts.len(),
        jobs_enqueued,
        elapsed: start.elapsed(),
    };

    progress.done(&result);
    info!(
        atoms = result.atom_count,
        contexts = result.context_count,
        jobs = result.jobs_enqueued,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "decompose pipeline complete"
    );

    Ok(result)
}

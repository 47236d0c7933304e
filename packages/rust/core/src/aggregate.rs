//! Bottom-up embedding aggregation over the context graph.
//!
//! A context's aggregate is the elementwise mean of its own atom embedding
//! and one vector per direct child: the child's aggregate when the child is
//! itself a context, its atom embedding otherwise. Each aggregate is
//! persisted as it is computed.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use atomizer_shared::{AtomizerError, Embedding, Result};

use crate::store::{AtomStore, ContextStore};

type AggregateFuture<'a> = Pin<Box<dyn Future<Output = Result<Embedding>> + Send + 'a>>;

/// Compute, persist, and return the aggregate embedding of context `id`.
///
/// Nothing is cached across calls; every invocation re-reads the graph.
/// A context reached again while it is still being aggregated fails with
/// [`AtomizerError::CycleDetected`].
#[instrument(skip_all, fields(context_id = %id))]
pub async fn aggregate_context(
    atoms: &dyn AtomStore,
    contexts: &dyn ContextStore,
    id: &str,
) -> Result<Embedding> {
    let mut visiting = HashSet::new();
    aggregate_node(atoms, contexts, id.to_string(), &mut visiting).await
}

fn aggregate_node<'a>(
    atoms: &'a dyn AtomStore,
    contexts: &'a dyn ContextStore,
    id: String,
    visiting: &'a mut HashSet<String>,
) -> AggregateFuture<'a> {
    Box::pin(async move {
        if !visiting.insert(id.clone()) {
            return Err(AtomizerError::CycleDetected { id });
        }

        let context = contexts
            .get_context(&id)
            .await
            .map_err(AtomizerError::lookup)?
            .ok_or_else(|| AtomizerError::not_found("context", id.as_str()))?;

        let mut sum = atom_embedding(atoms, &id).await?;
        let mut count = 1usize;

        for child in &context.children {
            let is_context = contexts
                .context_exists(&child.id)
                .await
                .map_err(AtomizerError::lookup)?;

            let vector = if is_context {
                aggregate_node(atoms, contexts, child.id.clone(), &mut *visiting).await?
            } else {
                atom_embedding(atoms, &child.id).await?
            };

            add_assign(&mut sum, &vector)?;
            count += 1;
        }

        let divisor = count as f32;
        for value in &mut sum {
            *value /= divisor;
        }

        contexts
            .set_context_embedding(&id, &sum)
            .await
            .map_err(AtomizerError::lookup)?;
        debug!(context_id = %id, children = count - 1, "aggregate persisted");

        visiting.remove(&id);
        Ok(sum)
    })
}

async fn atom_embedding(atoms: &dyn AtomStore, id: &str) -> Result<Embedding> {
    let atom = atoms
        .get_atom(id)
        .await
        .map_err(AtomizerError::lookup)?
        .ok_or_else(|| AtomizerError::not_found("atom", id))?;

    atom.embedding
        .ok_or_else(|| AtomizerError::not_found("atom embedding", id))
}

fn add_assign(sum: &mut [f32], other: &[f32]) -> Result<()> {
    if sum.len() != other.len() {
        return Err(AtomizerError::DimensionMismatch {
            expected: sum.len(),
            actual: other.len(),
        });
    }
    for (acc, value) in sum.iter_mut().zip(other) {
        *acc += value;
    }
    Ok(())
}

/// Per-context result of [`aggregate_batch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateOutcome {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregateOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate several contexts in order. A failure is recorded and the
/// remaining ids are still processed.
pub async fn aggregate_batch(
    atoms: &dyn AtomStore,
    contexts: &dyn ContextStore,
    ids: &[String],
) -> Vec<AggregateOutcome> {
    let mut outcomes = Vec::with_capacity(ids.len());

    for id in ids {
        let outcome = match aggregate_context(atoms, contexts, id).await {
            Ok(embedding) => AggregateOutcome {
                id: id.clone(),
                embedding: Some(embedding),
                error: None,
            },
            Err(e) => {
                warn!(context_id = %id, error = %e, "aggregation failed");
                AggregateOutcome {
                    id: id.clone(),
                    embedding: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(total = ids.len(), failed, "aggregation batch finished");
    outcomes
}

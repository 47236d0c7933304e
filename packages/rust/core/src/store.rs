//! Collaborator seams: the stores and queue the pipeline talks to.
//!
//! The libSQL [`Storage`] implements every trait; tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use atomizer_shared::{Atom, ContextRecord, EmbeddingTarget, Result, RowId};
use atomizer_storage::Storage;

/// Content records, one per parsed node.
#[async_trait]
pub trait AtomStore: Send + Sync {
    async fn insert_atoms(&self, atoms: &[Atom]) -> Result<()>;

    /// Batch lookup. Ids with no atom are simply absent from the result.
    async fn get_atoms_by_ids(&self, ids: &[String]) -> Result<Vec<Atom>>;

    async fn get_atom(&self, id: &str) -> Result<Option<Atom>>;
}

/// Structural records, one per node with children.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn insert_contexts(&self, contexts: &[ContextRecord]) -> Result<()>;

    async fn get_context(&self, id: &str) -> Result<Option<ContextRecord>>;

    async fn context_exists(&self, id: &str) -> Result<bool>;

    async fn set_context_embedding(&self, id: &str, embedding: &[f32]) -> Result<()>;

    /// Every context reachable from `root_id`, in one round trip.
    async fn get_subtree(&self, root_id: &str) -> Result<Vec<ContextRecord>>;
}

/// Arbitrary row access used by embedding jobs.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// `None` when the row does not exist.
    async fn fetch_row_content(
        &self,
        schema: &str,
        table: &str,
        accessor: &str,
        id: &RowId,
    ) -> Result<Option<serde_json::Value>>;

    async fn update_column(
        &self,
        schema: &str,
        table: &str,
        id: &RowId,
        column: &str,
        value: &str,
    ) -> Result<()>;
}

/// Named embedding-job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns the assigned job id.
    async fn enqueue_job(&self, queue_name: &str, target: &EmbeddingTarget) -> Result<i64>;

    /// Returns whether the job was still present.
    async fn delete_job(&self, queue_name: &str, job_id: i64) -> Result<bool>;
}

#[async_trait]
impl AtomStore for Storage {
    async fn insert_atoms(&self, atoms: &[Atom]) -> Result<()> {
        Storage::insert_atoms(self, atoms).await
    }

    async fn get_atoms_by_ids(&self, ids: &[String]) -> Result<Vec<Atom>> {
        Storage::get_atoms_by_ids(self, ids).await
    }

    async fn get_atom(&self, id: &str) -> Result<Option<Atom>> {
        Storage::get_atom(self, id).await
    }
}

#[async_trait]
impl ContextStore for Storage {
    async fn insert_contexts(&self, contexts: &[ContextRecord]) -> Result<()> {
        Storage::insert_contexts(self, contexts).await
    }

    async fn get_context(&self, id: &str) -> Result<Option<ContextRecord>> {
        Storage::get_context(self, id).await
    }

    async fn context_exists(&self, id: &str) -> Result<bool> {
        Storage::context_exists(self, id).await
    }

    async fn set_context_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        Storage::set_context_embedding(self, id, embedding).await
    }

    async fn get_subtree(&self, root_id: &str) -> Result<Vec<ContextRecord>> {
        Storage::get_subtree(self, root_id).await
    }
}

#[async_trait]
impl RowStore for Storage {
    async fn fetch_row_content(
        &self,
        schema: &str,
        table: &str,
        accessor: &str,
        id: &RowId,
    ) -> Result<Option<serde_json::Value>> {
        Storage::fetch_row_content(self, schema, table, accessor, id).await
    }

    async fn update_column(
        &self,
        schema: &str,
        table: &str,
        id: &RowId,
        column: &str,
        value: &str,
    ) -> Result<()> {
        Storage::update_column(self, schema, table, id, column, value).await
    }
}

#[async_trait]
impl JobQueue for Storage {
    async fn enqueue_job(&self, queue_name: &str, target: &EmbeddingTarget) -> Result<i64> {
        Storage::enqueue_job(self, queue_name, target).await
    }

    async fn delete_job(&self, queue_name: &str, job_id: i64) -> Result<bool> {
        Storage::delete_job(self, queue_name, job_id).await
    }
}

/// In-memory fakes shared by the unit tests of this crate.
#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use atomizer_shared::AtomizerError;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub atoms: Mutex<HashMap<String, Atom>>,
        pub contexts: Mutex<HashMap<String, ContextRecord>>,
        /// (schema.table, row id) -> column -> value
        pub rows: Mutex<HashMap<(String, String), HashMap<String, serde_json::Value>>>,
        pub enqueued: Mutex<Vec<(String, EmbeddingTarget)>>,
        pub deleted_jobs: Mutex<Vec<(String, i64)>>,
        pub fail_lookups: bool,
        pub fail_context_inserts: bool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            Self {
                fail_lookups: true,
                ..Self::default()
            }
        }

        pub fn put_atoms(&self, atoms: Vec<Atom>) {
            let mut map = self.atoms.lock().unwrap();
            for atom in atoms {
                map.insert(atom.id.clone(), atom);
            }
        }

        pub fn put_contexts(&self, contexts: Vec<ContextRecord>) {
            let mut map = self.contexts.lock().unwrap();
            for context in contexts {
                map.insert(context.id.clone(), context);
            }
        }

        pub fn put_row(&self, table: &str, id: &str, column: &str, value: serde_json::Value) {
            self.rows
                .lock()
                .unwrap()
                .entry((table.to_string(), id.to_string()))
                .or_default()
                .insert(column.to_string(), value);
        }

        pub fn row_value(&self, table: &str, id: &str, column: &str) -> Option<serde_json::Value> {
            self.rows
                .lock()
                .unwrap()
                .get(&(table.to_string(), id.to_string()))
                .and_then(|row| row.get(column).cloned())
        }

        pub fn context_embedding(&self, id: &str) -> Option<Vec<f32>> {
            self.contexts
                .lock()
                .unwrap()
                .get(id)
                .and_then(|c| c.embedding.clone())
        }

        fn check(&self) -> Result<()> {
            if self.fail_lookups {
                return Err(AtomizerError::Storage("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AtomStore for MemoryStore {
        async fn insert_atoms(&self, atoms: &[Atom]) -> Result<()> {
            self.check()?;
            let mut map = self.atoms.lock().unwrap();
            for atom in atoms {
                map.insert(atom.id.clone(), atom.clone());
            }
            Ok(())
        }

        async fn get_atoms_by_ids(&self, ids: &[String]) -> Result<Vec<Atom>> {
            self.check()?;
            let map = self.atoms.lock().unwrap();
            Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
        }

        async fn get_atom(&self, id: &str) -> Result<Option<Atom>> {
            self.check()?;
            Ok(self.atoms.lock().unwrap().get(id).cloned())
        }
    }

    #[async_trait]
    impl ContextStore for MemoryStore {
        async fn insert_contexts(&self, contexts: &[ContextRecord]) -> Result<()> {
            self.check()?;
            if self.fail_context_inserts {
                return Err(AtomizerError::Storage("disk full".into()));
            }
            let mut map = self.contexts.lock().unwrap();
            for context in contexts {
                map.insert(context.id.clone(), context.clone());
            }
            Ok(())
        }

        async fn get_context(&self, id: &str) -> Result<Option<ContextRecord>> {
            self.check()?;
            Ok(self.contexts.lock().unwrap().get(id).cloned())
        }

        async fn context_exists(&self, id: &str) -> Result<bool> {
            self.check()?;
            Ok(self.contexts.lock().unwrap().contains_key(id))
        }

        async fn set_context_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
            self.check()?;
            let mut map = self.contexts.lock().unwrap();
            let context = map
                .get_mut(id)
                .ok_or_else(|| AtomizerError::not_found("context", id))?;
            context.embedding = Some(embedding.to_vec());
            Ok(())
        }

        async fn get_subtree(&self, root_id: &str) -> Result<Vec<ContextRecord>> {
            self.check()?;
            let map = self.contexts.lock().unwrap();
            let mut seen = std::collections::HashSet::new();
            let mut pending = vec![root_id.to_string()];
            let mut out = Vec::new();
            while let Some(id) = pending.pop() {
                if !seen.insert(id.clone()) {
                    continue;
                }
                if let Some(context) = map.get(&id) {
                    pending.extend(context.children.iter().map(|c| c.id.clone()));
                    out.push(context.clone());
                }
            }
            Ok(out)
        }
    }

    #[async_trait]
    impl RowStore for MemoryStore {
        async fn fetch_row_content(
            &self,
            _schema: &str,
            table: &str,
            accessor: &str,
            id: &RowId,
        ) -> Result<Option<serde_json::Value>> {
            self.check()?;
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(&(table.to_string(), id.to_string()))
                .map(|row| row.get(accessor).cloned().unwrap_or(serde_json::Value::Null)))
        }

        async fn update_column(
            &self,
            schema: &str,
            table: &str,
            id: &RowId,
            column: &str,
            value: &str,
        ) -> Result<()> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(&(table.to_string(), id.to_string()))
                .ok_or_else(|| AtomizerError::not_found("row", format!("{schema}.{table}/{id}")))?;
            row.insert(column.to_string(), serde_json::Value::String(value.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl JobQueue for MemoryStore {
        async fn enqueue_job(&self, queue_name: &str, target: &EmbeddingTarget) -> Result<i64> {
            self.check()?;
            let mut enqueued = self.enqueued.lock().unwrap();
            enqueued.push((queue_name.to_string(), target.clone()));
            Ok(enqueued.len() as i64)
        }

        async fn delete_job(&self, queue_name: &str, job_id: i64) -> Result<bool> {
            self.check()?;
            self.deleted_jobs
                .lock()
                .unwrap()
                .push((queue_name.to_string(), job_id));
            Ok(true)
        }
    }
}

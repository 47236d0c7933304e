//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding atoms (content),
//! contexts (structure, children by id), and named job queues.
//!
//! **Access rules:**
//! - decompose / drain / aggregate: read-write via [`Storage::open`]
//! - inspection tools: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use tracing::debug;

use atomizer_shared::{
    Atom, AtomizerError, ChildRef, ContextRecord, Embedding, EmbeddingTarget, JobDescriptor,
    NodeType, Result, RowId,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AtomizerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    AtomizerError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AtomizerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Atom operations
    // -----------------------------------------------------------------------

    /// Bulk insert atoms in one transaction.
    pub async fn insert_atoms(&self, atoms: &[Atom]) -> Result<()> {
        self.check_writable()?;
        if atoms.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for atom in atoms {
            let embedding = atom.embedding.as_deref().map(embedding_to_json).transpose()?;
            let created_at = atom.created_at.unwrap_or_else(Utc::now).to_rfc3339();
            tx.execute(
                "INSERT INTO atoms (id, type, content, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    atom.id.as_str(),
                    atom.node_type.as_str(),
                    atom.content.as_str(),
                    embedding,
                    created_at.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;

        debug!(count = atoms.len(), "inserted atoms");
        Ok(())
    }

    /// Fetch atoms for a set of ids in a single query. Unknown ids are absent from the result.
    ///
    /// The ids travel as one JSON array parameter, so the lookup is not
    /// bounded by SQLite's host-parameter limit.
    pub async fn get_atoms_by_ids(&self, ids: &[String]) -> Result<Vec<Atom>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids_json = serde_json::to_string(ids)
            .map_err(|e| AtomizerError::Storage(format!("encode ids: {e}")))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id, type, content, embedding, created_at FROM atoms
                 WHERE id IN (SELECT value FROM json_each(?1))",
                params![ids_json],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_atom(&row)?);
        }
        debug!(requested = ids.len(), found = results.len(), "batch atom lookup");
        Ok(results)
    }

    /// Get a single atom by id.
    pub async fn get_atom(&self, id: &str) -> Result<Option<Atom>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, type, content, embedding, created_at FROM atoms WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_atom(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Context operations
    // -----------------------------------------------------------------------

    /// Bulk insert contexts in one transaction.
    pub async fn insert_contexts(&self, contexts: &[ContextRecord]) -> Result<()> {
        self.check_writable()?;
        if contexts.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for context in contexts {
            let children = serde_json::to_string(&context.children)
                .map_err(|e| AtomizerError::Storage(format!("encode children: {e}")))?;
            let embedding = context
                .embedding
                .as_deref()
                .map(embedding_to_json)
                .transpose()?;
            tx.execute(
                "INSERT INTO contexts (id, owner, children, embedding) VALUES (?1, ?2, ?3, ?4)",
                params![
                    context.id.as_str(),
                    context.owner.as_deref(),
                    children,
                    embedding,
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;

        debug!(count = contexts.len(), "inserted contexts");
        Ok(())
    }

    /// Get a single context by id.
    pub async fn get_context(&self, id: &str) -> Result<Option<ContextRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner, children, embedding FROM contexts WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_context(&row)?)),
            None => Ok(None),
        }
    }

    /// Whether a context row exists for `id`.
    pub async fn context_exists(&self, id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM contexts WHERE id = ?1 LIMIT 1", params![id])
            .await
            .map_err(storage_err)?;

        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    /// Overwrite the aggregate embedding of a context.
    pub async fn set_context_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        self.check_writable()?;
        let json = embedding_to_json(embedding)?;
        let changed = self
            .conn
            .execute(
                "UPDATE contexts SET embedding = ?1 WHERE id = ?2",
                params![json, id],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(AtomizerError::not_found("context", id));
        }
        Ok(())
    }

    /// Every context reachable from `root_id` (inclusive), in one round trip.
    ///
    /// Children without a context row (leaf atoms) are not returned. The
    /// recursive query deduplicates ids, so a cyclic graph still terminates.
    pub async fn get_subtree(&self, root_id: &str) -> Result<Vec<ContextRecord>> {
        let mut rows = self
            .conn
            .query(
                "WITH RECURSIVE subtree(id) AS (
                     SELECT id FROM contexts WHERE id = ?1
                     UNION
                     SELECT json_extract(child.value, '$.id')
                     FROM contexts c
                     JOIN subtree s ON c.id = s.id,
                     json_each(c.children) AS child
                 )
                 SELECT c.id, c.owner, c.children, c.embedding
                 FROM contexts c
                 JOIN subtree s ON c.id = s.id",
                params![root_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_context(&row)?);
        }
        debug!(root_id, count = results.len(), "fetched subtree");
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Generic row access (used by embedding jobs)
    // -----------------------------------------------------------------------

    /// Read `accessor` from the row `id` of `schema.table`.
    ///
    /// Returns `None` when the row does not exist. The value is returned
    /// as-is so the caller can decide whether it is usable text.
    pub async fn fetch_row_content(
        &self,
        schema: &str,
        table: &str,
        accessor: &str,
        id: &RowId,
    ) -> Result<Option<serde_json::Value>> {
        let sql = format!(
            "SELECT {} AS content FROM {}.{} WHERE id = ?1",
            quote_ident(accessor)?,
            quote_ident(schema)?,
            quote_ident(table)?,
        );

        let mut rows = self
            .conn
            .query(&sql, params![row_id_value(id)])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let value = row.get_value(0).map_err(storage_err)?;
                Ok(Some(value_to_json(value)))
            }
            None => Ok(None),
        }
    }

    /// Set `column` of row `id` in `schema.table`. Fails if the row is absent.
    pub async fn update_column(
        &self,
        schema: &str,
        table: &str,
        id: &RowId,
        column: &str,
        value: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let sql = format!(
            "UPDATE {}.{} SET {} = ?1 WHERE id = ?2",
            quote_ident(schema)?,
            quote_ident(table)?,
            quote_ident(column)?,
        );

        let changed = self
            .conn
            .execute(&sql, params![value, row_id_value(id)])
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(AtomizerError::not_found(
                "row",
                format!("{schema}.{table}/{id}"),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job queue operations
    // -----------------------------------------------------------------------

    /// Append a job to `queue_name`. Returns the assigned job id.
    pub async fn enqueue_job(&self, queue_name: &str, target: &EmbeddingTarget) -> Result<i64> {
        self.check_writable()?;
        let message = serde_json::to_string(target)
            .map_err(|e| AtomizerError::Storage(format!("encode job: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let mut rows = self
            .conn
            .query(
                "INSERT INTO job_queue (queue_name, message, enqueued_at)
                 VALUES (?1, ?2, ?3)
                 RETURNING job_id",
                params![queue_name, message, now.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err),
            None => Err(AtomizerError::Storage("enqueue returned no job id".into())),
        }
    }

    /// Claim up to `limit` visible jobs from `queue_name`, oldest first.
    ///
    /// Claimed jobs stay in the queue but are hidden from other readers for
    /// `visibility_timeout`; a job not deleted by then becomes claimable
    /// again. The claim is a single `UPDATE`, so concurrent readers never
    /// receive the same job while it is hidden.
    pub async fn read_jobs(
        &self,
        queue_name: &str,
        limit: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<JobDescriptor>> {
        self.check_writable()?;
        let now = Utc::now().timestamp_millis();
        let hidden_until = now.saturating_add(visibility_timeout.as_millis() as i64);

        let mut rows = self
            .conn
            .query(
                "UPDATE job_queue
                 SET read_ct = read_ct + 1, visible_at = ?3
                 WHERE job_id IN (
                     SELECT job_id FROM job_queue
                     WHERE queue_name = ?1 AND visible_at <= ?4
                     ORDER BY job_id
                     LIMIT ?2
                 )
                 RETURNING job_id, message",
                params![queue_name, limit, hidden_until, now],
            )
            .await
            .map_err(storage_err)?;

        let mut claimed = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let job_id: i64 = row.get(0).map_err(storage_err)?;
            let message: String = row.get(1).map_err(storage_err)?;
            claimed.push((job_id, message));
        }
        // RETURNING order is unspecified
        claimed.sort_by_key(|(job_id, _)| *job_id);

        let mut jobs = Vec::with_capacity(claimed.len());
        for (job_id, message) in claimed {
            let target: EmbeddingTarget = serde_json::from_str(&message).map_err(|e| {
                AtomizerError::Storage(format!("job {job_id} has an invalid message: {e}"))
            })?;
            jobs.push(JobDescriptor::from_target(job_id, target));
        }

        debug!(queue = queue_name, claimed = jobs.len(), "claimed jobs");
        Ok(jobs)
    }

    /// Remove a job. Returns whether a row was deleted.
    pub async fn delete_job(&self, queue_name: &str, job_id: i64) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "DELETE FROM job_queue WHERE queue_name = ?1 AND job_id = ?2",
                params![queue_name, job_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Number of jobs waiting in `queue_name`.
    pub async fn queue_len(&self, queue_name: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM job_queue WHERE queue_name = ?1",
                params![queue_name],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> AtomizerError {
    AtomizerError::Storage(e.to_string())
}

/// Quote an SQL identifier supplied by a caller (schema, table, column).
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(AtomizerError::validation("empty SQL identifier"));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn row_id_value(id: &RowId) -> Value {
    match id {
        RowId::Int(n) => Value::Integer(*n),
        RowId::Text(s) => Value::Text(s.clone()),
    }
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => serde_json::Value::from(n),
        Value::Real(f) => serde_json::Value::from(f),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Blob(bytes) => serde_json::Value::from(bytes),
    }
}

fn embedding_to_json(embedding: &[f32]) -> Result<String> {
    serde_json::to_string(embedding)
        .map_err(|e| AtomizerError::Storage(format!("encode embedding: {e}")))
}

/// Read a nullable TEXT column.
fn optional_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx).map_err(storage_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(AtomizerError::Storage(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

fn parse_embedding(raw: Option<String>) -> Result<Option<Embedding>> {
    raw.map(|s| {
        serde_json::from_str::<Embedding>(&s)
            .map_err(|e| AtomizerError::Storage(format!("invalid embedding: {e}")))
    })
    .transpose()
}

/// Convert a database row to an [`Atom`].
fn row_to_atom(row: &libsql::Row) -> Result<Atom> {
    let node_type: String = row.get(1).map_err(storage_err)?;
    let node_type: NodeType = node_type
        .parse()
        .map_err(|e: AtomizerError| AtomizerError::Storage(e.to_string()))?;

    let created_at = optional_text(row, 4)?
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AtomizerError::Storage(format!("invalid date: {e}")))
        })
        .transpose()?;

    Ok(Atom {
        id: row.get::<String>(0).map_err(storage_err)?,
        node_type,
        content: row.get::<String>(2).map_err(storage_err)?,
        embedding: parse_embedding(optional_text(row, 3)?)?,
        created_at,
    })
}

/// Convert a database row to a [`ContextRecord`].
fn row_to_context(row: &libsql::Row) -> Result<ContextRecord> {
    let children: String = row.get(2).map_err(storage_err)?;
    let children: Vec<ChildRef> = serde_json::from_str(&children)
        .map_err(|e| AtomizerError::Storage(format!("invalid children: {e}")))?;

    Ok(ContextRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        owner: optional_text(row, 1)?,
        children,
        embedding: parse_embedding(optional_text(row, 3)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const VT: Duration = Duration::from_secs(30);

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("atomizer_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn atom(id: &str, node_type: NodeType, content: &str) -> Atom {
        Atom {
            id: id.into(),
            node_type,
            content: content.into(),
            embedding: None,
            created_at: None,
        }
    }

    fn context(id: &str, children: &[&str]) -> ContextRecord {
        ContextRecord {
            id: id.into(),
            owner: None,
            children: children.iter().map(|c| ChildRef::from(*c)).collect(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("atomizer_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn atoms_insert_and_batch_lookup() {
        let storage = test_storage().await;
        storage
            .insert_atoms(&[
                atom("a", NodeType::H1, "Title"),
                atom("b", NodeType::P, "Body"),
                atom("c", NodeType::Ul, ""),
            ])
            .await
            .expect("insert atoms");

        let mut found = storage
            .get_atoms_by_ids(&["a".into(), "c".into(), "missing".into()])
            .await
            .expect("batch lookup");
        found.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].node_type, NodeType::H1);
        assert_eq!(found[0].content, "Title");
        assert!(found[0].created_at.is_some());
        assert_eq!(found[1].node_type, NodeType::Ul);

        let none = storage.get_atoms_by_ids(&[]).await.expect("empty lookup");
        assert!(none.is_empty());

        let single = storage.get_atom("b").await.unwrap().unwrap();
        assert_eq!(single.content, "Body");
        assert!(single.embedding.is_none());
        assert!(storage.get_atom("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_atom_ids_are_rejected() {
        let storage = test_storage().await;
        storage
            .insert_atoms(&[atom("a", NodeType::P, "one")])
            .await
            .unwrap();
        let result = storage.insert_atoms(&[atom("a", NodeType::P, "two")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn contexts_insert_get_and_probe() {
        let storage = test_storage().await;
        let mut root = context("a", &["b", "c"]);
        root.owner = Some("user-1".into());
        storage
            .insert_contexts(&[root.clone(), context("b", &["d"])])
            .await
            .expect("insert contexts");

        let found = storage.get_context("a").await.unwrap().unwrap();
        assert_eq!(found, root);
        assert!(storage.context_exists("b").await.unwrap());
        assert!(!storage.context_exists("d").await.unwrap());
        assert!(storage.get_context("d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn context_embedding_update() {
        let storage = test_storage().await;
        storage.insert_contexts(&[context("a", &["b"])]).await.unwrap();

        storage
            .set_context_embedding("a", &[0.5, 1.5])
            .await
            .expect("set embedding");
        let found = storage.get_context("a").await.unwrap().unwrap();
        assert_eq!(found.embedding, Some(vec![0.5, 1.5]));

        let err = storage.set_context_embedding("nope", &[1.0]).await.unwrap_err();
        assert!(err.to_string().contains("context not found"));
    }

    #[tokio::test]
    async fn subtree_returns_reachable_contexts_only() {
        let storage = test_storage().await;
        storage
            .insert_contexts(&[
                context("a", &["b", "c"]),
                context("b", &["d", "e"]),
                context("e", &["f"]),
                context("x", &["y"]),
            ])
            .await
            .unwrap();

        let mut ids: Vec<String> = storage
            .get_subtree("a")
            .await
            .expect("subtree")
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "e"]);

        let from_b = storage.get_subtree("b").await.unwrap();
        assert_eq!(from_b.len(), 2);

        assert!(storage.get_subtree("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subtree_terminates_on_cycles() {
        let storage = test_storage().await;
        storage
            .insert_contexts(&[context("a", &["b"]), context("b", &["a"])])
            .await
            .unwrap();
        let subtree = storage.get_subtree("a").await.expect("cyclic subtree");
        assert_eq!(subtree.len(), 2);
    }

    #[tokio::test]
    async fn row_content_and_column_update() {
        let storage = test_storage().await;
        storage
            .insert_atoms(&[atom("a", NodeType::P, "hello world")])
            .await
            .unwrap();
        let id = RowId::from("a");

        let content = storage
            .fetch_row_content("main", "atoms", "content", &id)
            .await
            .expect("fetch content");
        assert_eq!(content, Some(serde_json::Value::String("hello world".into())));

        let embedding = storage
            .fetch_row_content("main", "atoms", "embedding", &id)
            .await
            .unwrap();
        assert_eq!(embedding, Some(serde_json::Value::Null));

        let missing = storage
            .fetch_row_content("main", "atoms", "content", &RowId::from("zzz"))
            .await
            .unwrap();
        assert!(missing.is_none());

        storage
            .update_column("main", "atoms", &id, "embedding", "[0.25,0.75]")
            .await
            .expect("update column");
        let updated = storage.get_atom("a").await.unwrap().unwrap();
        assert_eq!(updated.embedding, Some(vec![0.25, 0.75]));

        let err = storage
            .update_column("main", "atoms", &RowId::from("zzz"), "embedding", "[]")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("main.atoms/zzz"));
    }

    #[tokio::test]
    async fn unknown_accessor_is_a_storage_error() {
        let storage = test_storage().await;
        let result = storage
            .fetch_row_content("main", "atoms", "no_such_column", &RowId::from("a"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn queue_lifecycle() {
        let storage = test_storage().await;
        let first = storage
            .enqueue_job("jobs", &EmbeddingTarget::atom("a"))
            .await
            .expect("enqueue");
        let second = storage
            .enqueue_job("jobs", &EmbeddingTarget::atom("b"))
            .await
            .unwrap();
        storage
            .enqueue_job("other", &EmbeddingTarget::atom("c"))
            .await
            .unwrap();
        assert!(second > first);
        assert_eq!(storage.queue_len("jobs").await.unwrap(), 2);

        let jobs = storage
            .read_jobs("jobs", 10, VT)
            .await
            .expect("read jobs");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_id, first);
        assert_eq!(jobs[0].id, RowId::from("a"));
        assert_eq!(jobs[0].table, "atoms");

        assert!(storage.delete_job("jobs", first).await.unwrap());
        assert!(!storage.delete_job("jobs", first).await.unwrap());
        assert!(!storage.delete_job("other", second).await.unwrap());
        assert_eq!(storage.queue_len("jobs").await.unwrap(), 1);
        assert_eq!(storage.queue_len("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claimed_jobs_are_hidden_from_other_readers() {
        let storage = test_storage().await;
        for id in ["a", "b", "c"] {
            storage
                .enqueue_job("q", &EmbeddingTarget::atom(id))
                .await
                .unwrap();
        }

        let first: Vec<i64> = storage
            .read_jobs("q", 2, VT)
            .await
            .unwrap()
            .iter()
            .map(|j| j.job_id)
            .collect();
        let second: Vec<i64> = storage
            .read_jobs("q", 10, VT)
            .await
            .unwrap()
            .iter()
            .map(|j| j.job_id)
            .collect();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(first.iter().all(|id| !second.contains(id)));
        assert!(storage.read_jobs("q", 10, VT).await.unwrap().is_empty());
        // Still queued until deleted.
        assert_eq!(storage.queue_len("q").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn expired_claims_become_visible_again() {
        let storage = test_storage().await;
        let job_id = storage
            .enqueue_job("q", &EmbeddingTarget::atom("a"))
            .await
            .unwrap();

        let claimed = storage.read_jobs("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let reclaimed = storage.read_jobs("q", 10, VT).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].job_id, job_id);
    }

    #[tokio::test]
    async fn batch_lookup_beyond_parameter_limit() {
        let storage = test_storage().await;
        storage
            .insert_atoms(&[
                atom("a", NodeType::P, "first"),
                atom("b", NodeType::P, "second"),
            ])
            .await
            .unwrap();

        let mut ids: Vec<String> = (0..40_000).map(|i| format!("missing-{i}")).collect();
        ids.push("a".into());
        ids.insert(0, "b".into());

        let mut found = storage
            .get_atoms_by_ids(&ids)
            .await
            .expect("large batch lookup");
        found.sort_by(|x, y| x.id.cmp(&y.id));
        let found_ids: Vec<&str> = found.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(found_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("atomizer_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_atoms(&[atom("a", NodeType::P, "x")]).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.get_atom("a").await.unwrap().is_some());
        let result = ro.insert_atoms(&[atom("b", NodeType::P, "y")]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("atoms").unwrap(), "\"atoms\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(quote_ident("").is_err());
    }
}

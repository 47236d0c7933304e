//! Core domain types: parsed nodes, persisted atoms and contexts, queue jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AtomizerError, Result};

/// An embedding vector as stored on atoms and contexts.
pub type Embedding = Vec<f32>;

/// Generate a fresh node identifier (UUID v7, time-sortable).
pub fn new_node_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// Closed set of structural tags produced by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    P,
    Ul,
    Li,
}

impl NodeType {
    /// Heading tag for a `#` count, if it is within `1..=6`.
    pub fn heading(level: usize) -> Option<Self> {
        match level {
            1 => Some(Self::H1),
            2 => Some(Self::H2),
            3 => Some(Self::H3),
            4 => Some(Self::H4),
            5 => Some(Self::H5),
            6 => Some(Self::H6),
            _ => None,
        }
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "h1",
            Self::H2 => "h2",
            Self::H3 => "h3",
            Self::H4 => "h4",
            Self::H5 => "h5",
            Self::H6 => "h6",
            Self::P => "p",
            Self::Ul => "ul",
            Self::Li => "li",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = AtomizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "h1" => Ok(Self::H1),
            "h2" => Ok(Self::H2),
            "h3" => Ok(Self::H3),
            "h4" => Ok(Self::H4),
            "h5" => Ok(Self::H5),
            "h6" => Ok(Self::H6),
            "p" => Ok(Self::P),
            "ul" => Ok(Self::Ul),
            "li" => Ok(Self::Li),
            other => Err(AtomizerError::validation(format!(
                "unknown node type: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Node (parser output)
// ---------------------------------------------------------------------------

/// A parsed node. Children are owned exclusively and kept in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub content: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Atom / Context (persisted records)
// ---------------------------------------------------------------------------

/// Persisted content record, one per parsed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Id-only reference to a child node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildRef {
    pub id: String,
}

impl From<&str> for ChildRef {
    fn from(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

/// Persisted structural record. Only nodes with at least one child get one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub children: Vec<ChildRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

// ---------------------------------------------------------------------------
// Embedding jobs
// ---------------------------------------------------------------------------

/// Row identifier carried by a job: either numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// What a job embeds: which row, read through which accessor, written to which column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingTarget {
    pub id: RowId,
    pub schema: String,
    pub table: String,
    pub content_function: String,
    pub embedding_column: String,
}

impl EmbeddingTarget {
    /// Target the `content` of an atom row, writing into its `embedding` column.
    pub fn atom(id: impl Into<String>) -> Self {
        Self {
            id: RowId::Text(id.into()),
            schema: "main".into(),
            table: "atoms".into(),
            content_function: "content".into(),
            embedding_column: "embedding".into(),
        }
    }
}

/// A queued unit of embedding work, as claimed by the drainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub job_id: i64,
    pub id: RowId,
    pub schema: String,
    pub table: String,
    pub content_function: String,
    pub embedding_column: String,
}

impl JobDescriptor {
    /// Attach a queue-assigned job id to a target.
    pub fn from_target(job_id: i64, target: EmbeddingTarget) -> Self {
        Self {
            job_id,
            id: target.id,
            schema: target.schema,
            table: target.table,
            content_function: target.content_function,
            embedding_column: target.embedding_column,
        }
    }

    /// `schema.table/id`, used in error messages and logs.
    pub fn row_label(&self) -> String {
        format!("{}.{}/{}", self.schema, self.table, self.id)
    }
}

/// A job that ended in failure, with the captured error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    #[serde(flatten)]
    pub job: JobDescriptor,
    pub error: String,
}

//! Flat context records → nested structure tree.
//!
//! Records are indexed by id, then the tree is built fresh from the root.
//! Children without a record become terminal stubs, so leaf atoms and
//! references to rows that were never persisted both rehydrate cleanly.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use atomizer_shared::{AtomizerError, ContextRecord, Node, Result};

use crate::store::ContextStore;

/// Structure-only node: ids and child order, no content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNode {
    pub id: String,
    pub owner: Option<String>,
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    /// Terminal node for an id with no context record.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: None,
            children: Vec::new(),
        }
    }

    /// Every id in this subtree, preorder.
    pub fn ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

impl From<&Node> for StructureNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            owner: None,
            children: node.children.iter().map(StructureNode::from).collect(),
        }
    }
}

struct Entry<'a> {
    owner: Option<&'a str>,
    children: Vec<&'a str>,
}

/// Rebuild the tree rooted at `root_id`.
///
/// Returns `Ok(None)` when there are no records or none for the root.
/// Repeated records for one id contribute their children in order; the
/// last owner wins. A child that refers back to one of its ancestors is
/// reported as [`AtomizerError::CycleDetected`].
pub fn rehydrate(records: &[ContextRecord], root_id: &str) -> Result<Option<StructureNode>> {
    let mut index: HashMap<&str, Entry<'_>> = HashMap::with_capacity(records.len());
    for record in records {
        let entry = index.entry(record.id.as_str()).or_insert(Entry {
            owner: None,
            children: Vec::new(),
        });
        entry.owner = record.owner.as_deref();
        entry
            .children
            .extend(record.children.iter().map(|c| c.id.as_str()));
    }

    if !index.contains_key(root_id) {
        return Ok(None);
    }

    let mut path = HashSet::new();
    build(&index, root_id, &mut path).map(Some)
}

fn build<'a>(
    index: &HashMap<&'a str, Entry<'a>>,
    id: &'a str,
    path: &mut HashSet<&'a str>,
) -> Result<StructureNode> {
    let Some(entry) = index.get(id) else {
        return Ok(StructureNode::stub(id));
    };

    if !path.insert(id) {
        return Err(AtomizerError::CycleDetected { id: id.to_string() });
    }

    let mut children = Vec::with_capacity(entry.children.len());
    for &child in &entry.children {
        children.push(build(index, child, path)?);
    }

    path.remove(id);
    Ok(StructureNode {
        id: id.to_string(),
        owner: entry.owner.map(str::to_string),
        children,
    })
}

/// Fetch the subtree under `root_id` in one round trip and rehydrate it.
#[instrument(skip_all, fields(root_id = %root_id))]
pub async fn retrieve_nested_context(
    store: &dyn ContextStore,
    root_id: &str,
) -> Result<Option<StructureNode>> {
    let records = store
        .get_subtree(root_id)
        .await
        .map_err(AtomizerError::lookup)?;
    debug!(records = records.len(), "subtree fetched");
    rehydrate(&records, root_id)
}

#[cfg(test)]
mod tests {
    use atomizer_markdown::parse;
    use atomizer_shared::ChildRef;

    use super::*;
    use crate::decompose::reduce_to_contexts;
    use crate::store::memory::MemoryStore;

    fn record(id: &str, children: &[&str]) -> ContextRecord {
        ContextRecord {
            id: id.into(),
            owner: None,
            children: children.iter().map(|c| ChildRef::from(*c)).collect(),
            embedding: None,
        }
    }

    #[test]
    fn round_trip_restores_ids_and_order() {
        let forest = parse("# A\n## B\ntext\n- x\n- y\n  - z\n## C\nmore");
        let root = &forest[0];
        let mut records = reduce_to_contexts(&forest, None);
        // Leaf stubs as a store would return them alongside the contexts.
        for id in StructureNode::from(root).ids() {
            if !records.iter().any(|r| r.id == id) {
                records.push(record(&id, &[]));
            }
        }

        let rebuilt = rehydrate(&records, &root.id).unwrap().unwrap();
        assert_eq!(rebuilt, StructureNode::from(root));
    }

    #[test]
    fn dangling_children_become_stubs() {
        let records = vec![record("a", &["b", "ghost"]), record("b", &["c"])];
        let tree = rehydrate(&records, "a").unwrap().unwrap();
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].children, vec![StructureNode::stub("c")]);
        assert_eq!(tree.children[1], StructureNode::stub("ghost"));
    }

    #[test]
    fn empty_or_missing_root_is_none() {
        assert_eq!(rehydrate(&[], "a").unwrap(), None);
        assert_eq!(rehydrate(&[record("b", &["c"])], "a").unwrap(), None);
    }

    #[test]
    fn owner_is_carried() {
        let mut root = record("a", &["b"]);
        root.owner = Some("u1".into());
        let tree = rehydrate(&[root], "a").unwrap().unwrap();
        assert_eq!(tree.owner.as_deref(), Some("u1"));
        assert_eq!(tree.children[0].owner, None);
    }

    #[test]
    fn duplicate_records_merge_children() {
        let records = vec![record("a", &["b"]), record("a", &["c"])];
        let tree = rehydrate(&records, "a").unwrap().unwrap();
        assert_eq!(tree.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn shared_child_is_expanded_under_each_parent() {
        let records = vec![record("a", &["b", "c"]), record("b", &["d"]), record("c", &["d"])];
        let tree = rehydrate(&records, "a").unwrap().unwrap();
        assert_eq!(tree.ids(), vec!["a", "b", "d", "c", "d"]);
    }

    #[test]
    fn cycle_is_an_error() {
        let records = vec![record("a", &["b"]), record("b", &["a"])];
        let err = rehydrate(&records, "a").unwrap_err();
        assert!(matches!(err, AtomizerError::CycleDetected { ref id } if id == "a"));
    }

    #[tokio::test]
    async fn retrieve_from_store() {
        let store = MemoryStore::default();
        store.put_contexts(vec![record("a", &["b", "c"]), record("b", &["d"])]);
        let tree = retrieve_nested_context(&store, "a").await.unwrap().unwrap();
        assert_eq!(tree.ids(), vec!["a", "b", "d", "c"]);

        assert!(retrieve_nested_context(&store, "zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retrieve_failure_is_a_lookup_error() {
        let store = MemoryStore::failing();
        let err = retrieve_nested_context(&store, "a").await.unwrap_err();
        assert!(matches!(err, AtomizerError::Lookup(_)));
    }
}

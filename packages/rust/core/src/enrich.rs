//! Structure tree + batch atom lookup → content-bearing tree.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use atomizer_shared::{AtomizerError, NodeType, Result};

use crate::rehydrate::{StructureNode, retrieve_nested_context};
use crate::store::{AtomStore, ContextStore};

/// Structure node with the matching atom's type and content merged in.
///
/// `node_type` and `content` stay `None` when no atom exists for the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    pub owner: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub children: Vec<ContentNode>,
}

impl From<&ContentNode> for StructureNode {
    fn from(node: &ContentNode) -> Self {
        Self {
            id: node.id.clone(),
            owner: node.owner.clone(),
            children: node.children.iter().map(StructureNode::from).collect(),
        }
    }
}

/// Merge atom content into every node of `tree`.
///
/// All ids are fetched in one batch. A failed lookup fails the whole call;
/// nothing partially enriched is returned.
#[instrument(skip_all, fields(root_id = %tree.id))]
pub async fn enrich(store: &dyn AtomStore, tree: &StructureNode) -> Result<ContentNode> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    collect_unique_ids(tree, &mut seen, &mut ids);

    let atoms = store
        .get_atoms_by_ids(&ids)
        .await
        .map_err(AtomizerError::lookup)?;
    debug!(requested = ids.len(), found = atoms.len(), "atoms fetched");

    let by_id: HashMap<String, (NodeType, String)> = atoms
        .into_iter()
        .map(|atom| (atom.id, (atom.node_type, atom.content)))
        .collect();

    Ok(attach_content(tree, &by_id))
}

fn collect_unique_ids<'a>(
    node: &'a StructureNode,
    seen: &mut HashSet<&'a str>,
    out: &mut Vec<String>,
) {
    if seen.insert(node.id.as_str()) {
        out.push(node.id.clone());
    }
    for child in &node.children {
        collect_unique_ids(child, seen, out);
    }
}

fn attach_content(
    node: &StructureNode,
    by_id: &HashMap<String, (NodeType, String)>,
) -> ContentNode {
    let found = by_id.get(&node.id);
    ContentNode {
        id: node.id.clone(),
        owner: node.owner.clone(),
        node_type: found.map(|(node_type, _)| *node_type),
        content: found.map(|(_, content)| content.clone()),
        children: node
            .children
            .iter()
            .map(|child| attach_content(child, by_id))
            .collect(),
    }
}

/// Retrieve the nested context under `root_id` and enrich it with content.
pub async fn expand(
    atoms: &dyn AtomStore,
    contexts: &dyn ContextStore,
    root_id: &str,
) -> Result<Option<ContentNode>> {
    match retrieve_nested_context(contexts, root_id).await? {
        Some(tree) => enrich(atoms, &tree).await.map(Some),
        None => Ok(None),
    }
}

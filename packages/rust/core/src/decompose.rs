//! Forest → flat projections: atoms (content) and contexts (structure).
//!
//! Both walks are preorder and never mutate the forest.

use atomizer_shared::{Atom, ChildRef, ContextRecord, Node};

/// One atom per node, in strict preorder.
pub fn flatten_atoms(forest: &[Node]) -> Vec<Atom> {
    let mut atoms = Vec::with_capacity(forest.iter().map(Node::subtree_len).sum());
    for root in forest {
        push_atoms(root, &mut atoms);
    }
    atoms
}

fn push_atoms(node: &Node, out: &mut Vec<Atom>) {
    out.push(Atom {
        id: node.id.clone(),
        node_type: node.node_type,
        content: node.content.clone(),
        embedding: None,
        created_at: None,
    });
    for child in &node.children {
        push_atoms(child, out);
    }
}

/// One context per node that has children, in preorder. Leaves get none.
pub fn reduce_to_contexts(forest: &[Node], owner: Option<&str>) -> Vec<ContextRecord> {
    let mut contexts = Vec::new();
    for root in forest {
        push_contexts(root, owner, &mut contexts);
    }
    contexts
}

fn push_contexts(node: &Node, owner: Option<&str>, out: &mut Vec<ContextRecord>) {
    if !node.children.is_empty() {
        out.push(ContextRecord {
            id: node.id.clone(),
            owner: owner.map(str::to_string),
            children: node
                .children
                .iter()
                .map(|c| ChildRef::from(c.id.as_str()))
                .collect(),
            embedding: None,
        });
    }
    for child in &node.children {
        push_contexts(child, owner, out);
    }
}

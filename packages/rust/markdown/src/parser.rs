//! Outline parser: headings, paragraphs, and indented `-`/`*` lists.
//!
//! Headings nest by level, lists nest by indentation width. The two are
//! tracked on separate stacks; a heading or paragraph closes any open list.
//! Nodes live in an index arena while parsing so both stacks can point into
//! the tree, and are moved into an owned [`Node`] forest at the end.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use atomizer_shared::{Node, NodeType, new_node_id};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#+) (.*)$").expect("valid regex"));

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*] (.*)$").expect("valid regex"));

/// Parse outline text into an ordered forest of root nodes.
///
/// Parsing is total: blank lines are skipped and every other line becomes a
/// heading, a list item, or a paragraph.
pub fn parse(text: &str) -> Vec<Node> {
    parse_lines(text.lines())
}

/// Parse a sequence of lines into an ordered forest of root nodes.
pub fn parse_lines<'a, I>(lines: I) -> Vec<Node>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = TreeBuilder::default();
    for line in lines {
        builder.push_line(line);
    }
    let forest = builder.finish();
    debug!(roots = forest.len(), "outline parsed");
    forest
}

// ---------------------------------------------------------------------------
// Arena builder
// ---------------------------------------------------------------------------

struct Slot {
    id: String,
    node_type: NodeType,
    content: String,
    children: Vec<usize>,
}

#[derive(Default)]
struct TreeBuilder {
    slots: Vec<Slot>,
    roots: Vec<usize>,
    /// (slot, heading level)
    headings: Vec<(usize, usize)>,
    /// (slot of a `ul`, indentation width)
    lists: Vec<(usize, usize)>,
}

impl TreeBuilder {
    fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            // Seven or more `#` is not a heading; it falls through to a paragraph.
            if let Some(node_type) = NodeType::heading(caps[1].len()) {
                self.push_heading(node_type, caps[1].len(), caps[2].trim());
                return;
            }
        }

        if let Some(caps) = LIST_ITEM_RE.captures(line) {
            let indent = caps[1].chars().count();
            self.push_list_item(indent, caps[2].trim());
            return;
        }

        self.lists.clear();
        let paragraph = self.alloc(NodeType::P, line.trim());
        self.attach(self.current_heading(), paragraph);
    }

    fn push_heading(&mut self, node_type: NodeType, level: usize, content: &str) {
        self.lists.clear();
        let heading = self.alloc(node_type, content);

        while self
            .headings
            .last()
            .is_some_and(|&(_, top_level)| top_level >= level)
        {
            self.headings.pop();
        }

        self.attach(self.current_heading(), heading);
        self.headings.push((heading, level));
    }

    fn push_list_item(&mut self, indent: usize, content: &str) {
        let item = self.alloc(NodeType::Li, content);

        while self
            .lists
            .last()
            .is_some_and(|&(_, top_indent)| indent < top_indent)
        {
            self.lists.pop();
        }

        match self.lists.last().copied() {
            None => {
                let list = self.open_list(item, indent);
                self.attach(self.current_heading(), list);
            }
            Some((list, top_indent)) if indent == top_indent => {
                self.slots[list].children.push(item);
            }
            Some((list, _)) => {
                // Deeper indentation nests under the last item of the current list.
                let parent = self.slots[list].children.last().copied().unwrap_or(list);
                let nested = self.open_list(item, indent);
                self.slots[parent].children.push(nested);
            }
        }
    }

    /// Create a `ul` holding `item` and make it the innermost open list.
    fn open_list(&mut self, item: usize, indent: usize) -> usize {
        let list = self.alloc(NodeType::Ul, "");
        self.slots[list].children.push(item);
        self.lists.push((list, indent));
        list
    }

    fn current_heading(&self) -> Option<usize> {
        self.headings.last().map(|&(slot, _)| slot)
    }

    fn alloc(&mut self, node_type: NodeType, content: &str) -> usize {
        self.slots.push(Slot {
            id: new_node_id(),
            node_type,
            content: content.to_string(),
            children: Vec::new(),
        });
        self.slots.len() - 1
    }

    fn attach(&mut self, parent: Option<usize>, child: usize) {
        match parent {
            Some(parent) => self.slots[parent].children.push(child),
            None => self.roots.push(child),
        }
    }

    fn finish(mut self) -> Vec<Node> {
        let roots = std::mem::take(&mut self.roots);
        roots.into_iter().map(|root| self.build(root)).collect()
    }

    fn build(&mut self, slot: usize) -> Node {
        let children = std::mem::take(&mut self.slots[slot].children);
        let children = children.into_iter().map(|c| self.build(c)).collect();
        let slot = &mut self.slots[slot];
        Node {
            id: std::mem::take(&mut slot.id),
            node_type: slot.node_type,
            content: std::mem::take(&mut slot.content),
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn shape(node: &Node) -> String {
        if node.children.is_empty() {
            format!("{}:{}", node.node_type, node.content)
        } else {
            let kids: Vec<String> = node.children.iter().map(shape).collect();
            format!("{}:{}[{}]", node.node_type, node.content, kids.join(","))
        }
    }

    fn forest_shape(forest: &[Node]) -> Vec<String> {
        forest.iter().map(shape).collect()
    }

    fn collect_ids(node: &Node, out: &mut Vec<String>) {
        out.push(node.id.clone());
        for child in &node.children {
            collect_ids(child, out);
        }
    }

    #[test]
    fn nested_headings_with_paragraph() {
        let forest = parse("# Heading 1\n## Heading 2\nSome text");
        assert_eq!(forest.len(), 1);
        let h1 = &forest[0];
        assert_eq!(h1.node_type, NodeType::H1);
        assert_eq!(h1.content, "Heading 1");
        assert_eq!(h1.children.len(), 1);
        let h2 = &h1.children[0];
        assert_eq!(h2.node_type, NodeType::H2);
        assert_eq!(h2.content, "Heading 2");
        assert_eq!(h2.children.len(), 1);
        assert_eq!(h2.children[0].node_type, NodeType::P);
        assert_eq!(h2.children[0].content, "Some text");
    }

    #[test]
    fn nested_list_attaches_to_previous_item() {
        let forest = parse("- Item 1\n- Item 2\n  - Item 2.1\n  - Item 2.2\n- Item 3");
        assert_eq!(
            forest_shape(&forest),
            vec!["ul:[li:Item 1,li:Item 2[ul:[li:Item 2.1,li:Item 2.2]],li:Item 3]"]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let forest = parse("\n\n# Title\n\n   \nBody\n\n");
        assert_eq!(forest_shape(&forest), vec!["h1:Title[p:Body]"]);
    }

    #[test]
    fn paragraphs_without_heading_are_roots() {
        let forest = parse("first\nsecond\n# H\nthird");
        assert_eq!(
            forest_shape(&forest),
            vec!["p:first", "p:second", "h1:H[p:third]"]
        );
    }

    #[test]
    fn same_or_shallower_heading_closes_deeper_ones() {
        let forest = parse("# A\n## B\n### C\n## D\n# E");
        assert_eq!(
            forest_shape(&forest),
            vec!["h1:A[h2:B[h3:C],h2:D]", "h1:E"]
        );
    }

    #[test]
    fn skipped_heading_levels_still_nest() {
        let forest = parse("# A\n### C\n## B");
        assert_eq!(forest_shape(&forest), vec!["h1:A[h3:C,h2:B]"]);
    }

    #[test]
    fn list_under_heading_and_paragraph_ends_list() {
        let forest = parse("# Shopping\n- milk\n- eggs\nDone.\n- bread");
        assert_eq!(
            forest_shape(&forest),
            vec!["h1:Shopping[ul:[li:milk,li:eggs],p:Done.,ul:[li:bread]]"]
        );
    }

    #[test]
    fn heading_ends_list() {
        let forest = parse("- a\n  - b\n# H\n  - c");
        // After the heading, indentation tracking restarts: `c` opens a fresh list.
        assert_eq!(
            forest_shape(&forest),
            vec!["ul:[li:a[ul:[li:b]]]", "h1:H[ul:[li:c]]"]
        );
    }

    #[test]
    fn dedent_pops_to_matching_level() {
        let forest = parse("- a\n  - b\n    - c\n  - d\n- e");
        assert_eq!(
            forest_shape(&forest),
            vec!["ul:[li:a[ul:[li:b[ul:[li:c]],li:d]],li:e]"]
        );
    }

    #[test]
    fn dedent_between_levels_nests_under_shallower_list() {
        // `x` at indent 2 sits between 0 and 4: it pops the indent-4 list
        // and nests under the last item of the indent-0 list.
        let forest = parse("- a\n    - b\n  - x");
        assert_eq!(
            forest_shape(&forest),
            vec!["ul:[li:a[ul:[li:b],ul:[li:x]]]"]
        );
    }

    #[test]
    fn dedent_below_every_open_list_starts_a_new_list() {
        let forest = parse("# H\n  - a\n- b");
        assert_eq!(forest_shape(&forest), vec!["h1:H[ul:[li:a],ul:[li:b]]"]);
    }

    #[test]
    fn star_markers_and_tabs() {
        let forest = parse("* one\n\t* two");
        assert_eq!(forest_shape(&forest), vec!["ul:[li:one[ul:[li:two]]]"]);
    }

    #[test]
    fn too_many_hashes_is_a_paragraph() {
        let forest = parse("####### deep");
        assert_eq!(forest_shape(&forest), vec!["p:####### deep"]);
    }

    #[test]
    fn marker_without_space_is_a_paragraph() {
        let forest = parse("#tag\n-dash");
        assert_eq!(forest_shape(&forest), vec!["p:#tag", "p:-dash"]);
    }

    #[test]
    fn windows_line_endings_are_trimmed() {
        let forest = parse("# Title\r\nBody\r\n");
        assert_eq!(forest_shape(&forest), vec!["h1:Title[p:Body]"]);
    }

    #[test]
    fn ids_are_unique_across_the_forest() {
        let forest = parse("# A\n- x\n- y\n  - z\n## B\ntext\n# C");
        let mut ids = Vec::new();
        for root in &forest {
            collect_ids(root, &mut ids);
        }
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.len(), forest.iter().map(Node::subtree_len).sum::<usize>());
    }

    #[test]
    fn list_containers_have_empty_content() {
        let forest = parse("- a");
        assert_eq!(forest[0].node_type, NodeType::Ul);
        assert!(forest[0].content.is_empty());
    }

    #[test]
    fn parse_lines_matches_parse() {
        let text = "# A\n- b\nc";
        let a = forest_shape(&parse(text));
        let b = forest_shape(&parse_lines(["# A", "- b", "c"]));
        assert_eq!(a, b);
    }
}

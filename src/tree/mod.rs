//! Tree Model
//!
//! Rebuilds the StackEdit folder/file hierarchy from an unordered item set.
//! Nodes live in an arena indexed by item id; a node is only attached once
//! its parent is present, so ancestor walks always terminate.

pub mod node;

pub use node::{NodeAttributes, NodeIndex, TreeNode};

use crate::error::TreeError;
use crate::frontmatter::FrontMatterDoc;
use crate::index::ContentIndex;
use crate::path::StackEditPath;
use crate::types::Item;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do with items whose parent never appears
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Fail the build with [`TreeError::DanglingParents`]
    #[default]
    Reject,
    /// Log and leave the orphans out of the tree
    Drop,
}

/// Result of a lookup that may race structural completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Resolved(T),
    /// The id is not on the tree yet
    Unresolved(String),
}

impl<T> Lookup<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Lookup::Resolved(value) => Some(value),
            Lookup::Unresolved(_) => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Lookup::Unresolved(_))
    }
}

/// Arena-backed tree of StackEdit items
#[derive(Debug, Default)]
pub struct TreeModel {
    nodes: Vec<TreeNode>,
    by_id: HashMap<String, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl TreeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from folder and file items in any order.
    ///
    /// Repeats insertion passes until every item is attached. A pass that
    /// attaches nothing means the remaining items reference missing parents.
    pub fn build<I>(items: I, policy: OrphanPolicy) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = Item>,
    {
        let mut tree = Self::new();
        let mut pending: Vec<Item> = items
            .into_iter()
            .filter(|item| item.item_type.is_structural())
            .collect();
        let mut passes = 0usize;

        while !pending.is_empty() {
            passes += 1;
            let before = pending.len();
            let mut deferred = Vec::new();
            for item in pending {
                let ready = match parent_of(&item) {
                    None => true,
                    Some(parent_id) => tree.contains(parent_id),
                };
                if ready {
                    tree.attach_node(&item)?;
                } else {
                    deferred.push(item);
                }
            }

            if deferred.len() == before {
                let mut ids: Vec<String> = deferred.into_iter().map(|item| item.id).collect();
                ids.sort();
                match policy {
                    OrphanPolicy::Reject => return Err(TreeError::DanglingParents(ids)),
                    OrphanPolicy::Drop => {
                        warn!(orphans = ?ids, "Dropping items with dangling parents");
                        break;
                    }
                }
            }
            pending = deferred;
        }

        debug!(nodes = tree.len(), passes, "Built tree");
        Ok(tree)
    }

    /// Insert a node under its parent, or under the root when it has none.
    ///
    /// Attaching an id twice returns the existing node.
    pub fn attach_node(&mut self, item: &Item) -> Result<NodeIndex, TreeError> {
        if let Some(&existing) = self.by_id.get(&item.id) {
            return Ok(existing);
        }
        let parent = match parent_of(item) {
            None => None,
            Some(parent_id) => Some(self.select(parent_id)?),
        };

        let index = self.nodes.len();
        self.nodes.push(TreeNode::new(
            item.id.clone(),
            item.item_type,
            item.name.clone(),
            parent,
        ));
        match parent {
            Some(parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.by_id.insert(item.id.clone(), index);
        Ok(index)
    }

    /// Index of an attached node.
    pub fn select(&self, item_id: &str) -> Result<NodeIndex, TreeError> {
        self.by_id
            .get(item_id)
            .copied()
            .ok_or_else(|| TreeError::MissingNode(item_id.to_string()))
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.by_id.contains_key(item_id)
    }

    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index]
    }

    pub fn get(&self, item_id: &str) -> Option<&TreeNode> {
        self.by_id.get(item_id).map(|&index| &self.nodes[index])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Record the owning document id of an item.
    pub fn assign_doc_id(&mut self, doc_id: &str, item_id: &str) {
        match self.select(item_id) {
            Ok(index) => self.nodes[index].attributes.doc_id = Some(doc_id.to_string()),
            Err(e) => warn!(doc_id, error = %e, "Cannot assign document id"),
        }
    }

    /// Copy hashes, etags and content ids from the content index onto file nodes.
    pub fn assign_attributes(&mut self, index: &ContentIndex) {
        for (id, etag) in index.etags() {
            let Ok(node) = self.select(id) else {
                warn!(item_id = id, "Content for an item missing from the tree");
                continue;
            };
            let attributes = &mut self.nodes[node].attributes;
            attributes.etag = Some(etag.to_string());
            attributes.hash = index.hash_for(id);
            attributes.content_id = index.content_doc_for(id).map(str::to_string);
        }
    }

    /// Refresh a single file node after a live content change.
    pub fn update_content(
        &mut self,
        file_id: &str,
        hash: Option<i64>,
        etag: &str,
        content_id: &str,
    ) -> Lookup<()> {
        match self.by_id.get(file_id) {
            Some(&index) => {
                let attributes = &mut self.nodes[index].attributes;
                attributes.hash = hash;
                attributes.etag = Some(etag.to_string());
                attributes.content_id = Some(content_id.to_string());
                Lookup::Resolved(())
            }
            None => Lookup::Unresolved(file_id.to_string()),
        }
    }

    /// Nodes whose content hash equals `hash`.
    pub fn select_by_hash(&self, hash: i64) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.attributes.hash == Some(hash))
            .map(|(index, _)| index)
            .collect()
    }

    /// Attach a frontmatter document to every node carrying its hash.
    pub fn append_frontmatter_note(&mut self, doc: &FrontMatterDoc) -> Result<usize, TreeError> {
        let targets = self.select_by_hash(doc.hash);
        if targets.is_empty() {
            return Err(TreeError::StaleFrontmatter {
                hash: doc.hash,
                content_ids: doc.content_ids(),
            });
        }

        let note = serde_json::to_value(doc).unwrap_or(serde_json::Value::Null);
        for &index in &targets {
            let attributes = &mut self.nodes[index].attributes;
            let keeps_current = attributes
                .content_id
                .as_ref()
                .map(|id| doc.attachments.contains_key(id))
                .unwrap_or(false);
            if !keeps_current {
                attributes.content_id = doc.attachments.keys().next().cloned();
            }
            attributes.frontmatter.push(note.clone());
        }
        Ok(targets.len())
    }

    /// Names from the root down to the node, empty for unnamed nodes.
    pub fn names_from_id(&self, item_id: &str) -> Lookup<Vec<String>> {
        let Some(&index) = self.by_id.get(item_id) else {
            return Lookup::Unresolved(item_id.to_string());
        };
        let mut names = Vec::new();
        let mut current = Some(index);
        while let Some(index) = current {
            let node = &self.nodes[index];
            names.push(node.attributes.name.clone());
            current = node.parent;
        }
        names.reverse();
        Lookup::Resolved(names)
    }

    /// Attributes of an attached node.
    pub fn attributes(&self, item_id: &str) -> Lookup<&NodeAttributes> {
        match self.by_id.get(item_id) {
            Some(&index) => Lookup::Resolved(&self.nodes[index].attributes),
            None => Lookup::Unresolved(item_id.to_string()),
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|node| node.is_file())
    }

    /// One path per file node that has content.
    pub fn stackedit_paths(&self) -> Vec<StackEditPath> {
        let mut paths = Vec::new();
        for node in self.files() {
            let Some(etag) = node.attributes.etag.clone() else {
                debug!(item_id = %node.item_id, "File without content");
                continue;
            };
            let Lookup::Resolved(names) = self.names_from_id(&node.item_id) else {
                continue;
            };
            match StackEditPath::new(names, etag, node.attributes.content_id.clone()) {
                Ok(path) => paths.push(path),
                Err(e) => warn!(item_id = %node.item_id, error = %e, "Skipping file"),
            }
        }
        paths
    }
}

fn parent_of(item: &Item) -> Option<&str> {
    item.parent_id.as_deref().filter(|parent| !parent.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemType;
    use proptest::prelude::*;

    fn item(id: &str, parent: Option<&str>, name: &str, item_type: ItemType) -> Item {
        Item {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            name: name.to_string(),
            item_type,
            hash: None,
        }
    }

    #[test]
    fn test_build_out_of_order() {
        let tree = TreeModel::build(
            vec![
                item("c", Some("b"), "c.md", ItemType::File),
                item("b", Some("a"), "B", ItemType::Folder),
                item("a", None, "A", ItemType::Folder),
            ],
            OrphanPolicy::Reject,
        )
        .unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(
            tree.names_from_id("c"),
            Lookup::Resolved(vec!["A".to_string(), "B".to_string(), "c.md".to_string()])
        );
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn test_dangling_parent_fails() {
        let result = TreeModel::build(
            vec![
                item("a", None, "A", ItemType::Folder),
                item("x", Some("gone"), "x", ItemType::File),
            ],
            OrphanPolicy::Reject,
        );
        assert_eq!(result.unwrap_err(), TreeError::DanglingParents(vec!["x".to_string()]));
    }

    #[test]
    fn test_cycle_is_reported_as_dangling() {
        let result = TreeModel::build(
            vec![
                item("a", Some("b"), "A", ItemType::Folder),
                item("b", Some("a"), "B", ItemType::Folder),
            ],
            OrphanPolicy::Reject,
        );
        assert!(matches!(result, Err(TreeError::DanglingParents(ids)) if ids.len() == 2));
    }

    #[test]
    fn test_drop_policy_keeps_connected_items() {
        let tree = TreeModel::build(
            vec![
                item("a", None, "A", ItemType::Folder),
                item("x", Some("trashed"), "x", ItemType::File),
            ],
            OrphanPolicy::Drop,
        )
        .unwrap();
        assert!(tree.contains("a"));
        assert!(!tree.contains("x"));
    }

    #[test]
    fn test_attach_node_requires_parent() {
        let mut tree = TreeModel::new();
        let err = tree
            .attach_node(&item("b", Some("a"), "b", ItemType::File))
            .unwrap_err();
        assert_eq!(err, TreeError::MissingNode("a".to_string()));

        let a = tree.attach_node(&item("a", None, "A", ItemType::Folder)).unwrap();
        let again = tree.attach_node(&item("a", None, "A", ItemType::Folder)).unwrap();
        assert_eq!(a, again);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_unresolved_lookup() {
        let tree = TreeModel::new();
        assert_eq!(tree.names_from_id("nope"), Lookup::Unresolved("nope".to_string()));
        assert!(tree.attributes("nope").is_unresolved());
    }

    #[test]
    fn test_assign_doc_id_tolerates_missing_node() {
        let mut tree =
            TreeModel::build(vec![item("a", None, "A", ItemType::File)], OrphanPolicy::Reject)
                .unwrap();
        tree.assign_doc_id("doc-a", "a");
        tree.assign_doc_id("doc-z", "z");
        assert_eq!(tree.get("a").unwrap().attributes.doc_id.as_deref(), Some("doc-a"));
    }

    #[test]
    fn test_stale_frontmatter_note() {
        let mut tree =
            TreeModel::build(vec![item("a", None, "A", ItemType::File)], OrphanPolicy::Reject)
                .unwrap();
        let doc = FrontMatterDoc::from_body(7, "no header", ["d7".to_string()]);
        assert!(matches!(
            tree.append_frontmatter_note(&doc),
            Err(TreeError::StaleFrontmatter { hash: 7, .. })
        ));

        tree.update_content("a", Some(7), "Zg==", "d-a");
        assert_eq!(tree.append_frontmatter_note(&doc), Ok(1));
        let attributes = &tree.get("a").unwrap().attributes;
        assert_eq!(attributes.content_id.as_deref(), Some("d7"));
        assert_eq!(attributes.frontmatter.len(), 1);
    }

    fn forest() -> impl Strategy<Value = Vec<(Option<usize>, String)>> {
        prop::collection::vec((any::<prop::sample::Index>(), "[a-z]{1,6}"), 1..40).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(position, (parent, name))| {
                        let parent = if position == 0 || parent.index(3) == 0 {
                            None
                        } else {
                            Some(parent.index(position))
                        };
                        (parent, name)
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_build_terminates_with_expected_paths(
            nodes in forest(),
            seed in any::<u64>(),
        ) {
            let items: Vec<Item> = nodes
                .iter()
                .enumerate()
                .map(|(i, (parent, name))| Item {
                    id: format!("n{}", i),
                    parent_id: parent.map(|p| format!("n{}", p)),
                    name: name.clone(),
                    item_type: ItemType::Folder,
                    hash: None,
                })
                .collect();

            let mut shuffled = items.clone();
            let len = shuffled.len();
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                shuffled.swap(i, (state >> 33) as usize % (i + 1));
            }

            let tree = TreeModel::build(shuffled, OrphanPolicy::Reject).unwrap();
            prop_assert_eq!(tree.len(), len);

            for (i, _) in nodes.iter().enumerate() {
                let mut expected = Vec::new();
                let mut current = Some(i);
                while let Some(position) = current {
                    expected.push(nodes[position].1.clone());
                    current = nodes[position].0;
                }
                expected.reverse();
                prop_assert_eq!(
                    tree.names_from_id(&format!("n{}", i)),
                    Lookup::Resolved(expected)
                );
            }
        }

        #[test]
        fn prop_dangling_parent_never_loops(
            nodes in forest(),
            victim in any::<prop::sample::Index>(),
        ) {
            let victim = victim.index(nodes.len());
            let items: Vec<Item> = nodes
                .iter()
                .enumerate()
                .map(|(i, (parent, name))| Item {
                    id: format!("n{}", i),
                    parent_id: if i == victim {
                        Some("missing".to_string())
                    } else {
                        parent.map(|p| format!("n{}", p))
                    },
                    name: name.clone(),
                    item_type: ItemType::File,
                    hash: None,
                })
                .collect();

            let result = TreeModel::build(items, OrphanPolicy::Reject);
            prop_assert!(matches!(result, Err(TreeError::DanglingParents(_))));
        }
    }
}

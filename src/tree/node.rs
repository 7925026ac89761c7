//! Tree node types

use crate::types::ItemType;

/// Position of a node in the tree arena
pub type NodeIndex = usize;

/// Mutable per-node attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttributes {
    pub name: String,
    pub hash: Option<i64>,
    pub etag: Option<String>,
    /// `_id` of the document owning the item
    pub doc_id: Option<String>,
    /// `_id` of the content document supplying the current body
    pub content_id: Option<String>,
    /// Frontmatter documents attached by content hash
    pub frontmatter: Vec<serde_json::Value>,
}

/// Arena node
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub item_id: String,
    pub kind: ItemType,
    /// `None` means the node hangs off the root
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub attributes: NodeAttributes,
}

impl TreeNode {
    pub(crate) fn new(item_id: String, kind: ItemType, name: String, parent: Option<NodeIndex>) -> Self {
        Self {
            item_id,
            kind,
            parent,
            children: Vec::new(),
            attributes: NodeAttributes {
                name,
                ..NodeAttributes::default()
            },
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ItemType::File
    }
}

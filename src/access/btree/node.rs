//! Tree nodes. Each node owns exactly one page; the tree keeps them in an arena indexed by
//! page number and links them by page number only.

use crate::access::record::RowId;
use crate::catalog::Schema;
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType};
use std::sync::Arc;

pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    /// Rebuild a node from a page already on disk.
    pub fn load(disk: &PageManager, page_id: PageId, schema: Arc<Schema>) -> StorageResult<Self> {
        let page = Page::load(disk, page_id, schema)?;
        match page.page_type() {
            PageType::Leaf => Ok(Node::Leaf(LeafNode { page })),
            PageType::Interior => Ok(Node::Internal(InternalNode::from_page(disk, page)?)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        match self {
            Node::Leaf(_) => true,
            Node::Internal(_) => false,
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Node::Leaf(_) => PageType::Leaf,
            Node::Internal(_) => PageType::Interior,
        }
    }

    pub fn page(&self) -> &Page {
        match self {
            Node::Leaf(leaf) => &leaf.page,
            Node::Internal(internal) => &internal.page,
        }
    }

    pub fn page_mut(&mut self) -> &mut Page {
        match self {
            Node::Leaf(leaf) => &mut leaf.page,
            Node::Internal(internal) => &mut internal.page,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page().page_id()
    }

    pub fn parent(&self) -> Option<PageId> {
        self.page().parent()
    }

    /// Point this node at a new parent. The header is only rewritten when the value changes.
    pub fn set_parent(&mut self, disk: &mut PageManager, parent: Option<PageId>) -> StorageResult<()> {
        if self.parent() == parent {
            return Ok(());
        }
        self.page_mut().set_parent(disk, parent)
    }
}

pub struct LeafNode {
    page: Page,
}

impl LeafNode {
    pub fn create(
        disk: &mut PageManager,
        page_id: PageId,
        schema: Arc<Schema>,
        root: Option<PageId>,
    ) -> StorageResult<Self> {
        let page = Page::create(disk, page_id, PageType::Leaf, schema, root)?;
        Ok(Self { page })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn right_sibling(&self) -> Option<PageId> {
        self.page.right_sibling()
    }
}

pub struct InternalNode {
    page: Page,
    keys: Vec<RowId>,
    /// Always `keys.len() + 1` entries. `children[i]` holds keys below `keys[i]`.
    children: Vec<PageId>,
}

impl InternalNode {
    pub fn create(
        disk: &mut PageManager,
        page_id: PageId,
        schema: Arc<Schema>,
        root: Option<PageId>,
        keys: Vec<RowId>,
        children: Vec<PageId>,
    ) -> StorageResult<Self> {
        let page = Page::create(disk, page_id, PageType::Interior, schema, root)?;
        let mut node = Self {
            page,
            keys,
            children,
        };
        node.persist(disk)?;
        Ok(node)
    }

    fn from_page(disk: &PageManager, page: Page) -> StorageResult<Self> {
        let cells = page.interior_cells(disk)?;
        let right_child = page.right_child().ok_or_else(|| StorageError::Corrupted {
            page_id: page.page_id(),
            reason: "interior page without a right child".to_string(),
        })?;

        let mut keys = Vec::with_capacity(cells.len());
        let mut children = Vec::with_capacity(cells.len() + 1);
        for (child, key) in cells {
            children.push(child);
            keys.push(key);
        }
        children.push(right_child);

        Ok(Self {
            page,
            keys,
            children,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn keys(&self) -> &[RowId] {
        &self.keys
    }

    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Index of the child to descend into: the one left of the smallest key strictly
    /// greater than `row_id`. A row id equal to a key goes right of it.
    pub fn child_index(&self, row_id: RowId) -> usize {
        self.keys.partition_point(|&key| key <= row_id)
    }

    pub fn child_for(&self, row_id: RowId) -> PageId {
        self.children[self.child_index(row_id)]
    }

    /// Insert `key` directly after the existing child `left`, with `right` as the child to
    /// its right. Children stay in sibling-chain order even when `key` equals a stored key.
    pub fn insert_entry(&mut self, left: PageId, key: RowId, right: PageId) -> StorageResult<()> {
        let page_id = self.page.page_id();
        splice_entry(&mut self.keys, &mut self.children, left, key, right).ok_or_else(|| {
            StorageError::MalformedTree(format!("page {} is not a child of {}", left, page_id))
        })
    }

    pub fn set_entries(&mut self, keys: Vec<RowId>, children: Vec<PageId>) {
        self.keys = keys;
        self.children = children;
    }

    /// Rewrite every interior cell and the right-child pointer.
    pub fn persist(&mut self, disk: &mut PageManager) -> StorageResult<()> {
        self.page.rewrite_interior(disk, &self.keys, &self.children)
    }
}

/// Put `(key, right)` right after `left` in a keys/children pair. `None` if `left` is not
/// one of the children.
pub(crate) fn splice_entry(
    keys: &mut Vec<RowId>,
    children: &mut Vec<PageId>,
    left: PageId,
    key: RowId,
    right: PageId,
) -> Option<()> {
    let position = children.iter().position(|&child| child == left)?;
    keys.insert(position, key);
    children.insert(position + 1, right);
    Some(())
}

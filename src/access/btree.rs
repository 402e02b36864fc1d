//! On-disk B+Tree keyed by row id.
//!
//! Every node owns one page of the table file. Nodes live in an arena indexed by page
//! number; children, siblings and parents are page numbers into that arena. Leaves hold the
//! records and form an ascending singly linked chain; internal nodes hold separator keys.
//! All structural changes are written through to disk as they happen.

pub mod iterator;
pub mod node;
pub mod options;

use self::iterator::LeafScan;
use self::node::{splice_entry, InternalNode, LeafNode, Node};
use self::options::{DuplicatePolicy, TreeOptions};
use crate::access::record::{Record, RowId};
use crate::catalog::Schema;
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType, MAX_PAGE_ID};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const FIRST_LEAF: PageId = PageId(0);

pub struct BPlusTree {
    disk: PageManager,
    schema: Arc<Schema>,
    options: TreeOptions,
    nodes: Vec<Node>,
    root: Option<PageId>,
    next_page_id: u16,
}

/// Shape summary of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStatistics {
    pub height: usize,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    pub records: usize,
    pub order: usize,
    pub max_records_per_leaf: usize,
    pub root: Option<PageId>,
}

impl fmt::Display for TreeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:          {}", self.records)?;
        writeln!(f, "height:           {}", self.height)?;
        writeln!(f, "leaf pages:       {}", self.leaf_pages)?;
        writeln!(f, "internal pages:   {}", self.internal_pages)?;
        writeln!(f, "order:            {}", self.order)?;
        writeln!(f, "records per leaf: {}", self.max_records_per_leaf)?;
        match self.root {
            Some(root) => write!(f, "root page:        {}", root),
            None => write!(f, "root page:        -"),
        }
    }
}

impl BPlusTree {
    /// Create an empty tree over a new (truncated) table file. The first page is only
    /// written by the first insert.
    pub fn create(path: &Path, schema: Schema, options: TreeOptions) -> StorageResult<Self> {
        options.validate()?;

        let mut disk = PageManager::create(path)?;
        disk.set_sync_on_write(options.sync_on_write);

        Ok(Self {
            disk,
            schema: Arc::new(schema),
            options,
            nodes: Vec::new(),
            root: None,
            next_page_id: 0,
        })
    }

    /// Rebuild the tree from a table file written earlier. Every page is read back; the root
    /// is taken from the first page's header.
    pub fn open(path: &Path, schema: Schema, options: TreeOptions) -> StorageResult<Self> {
        options.validate()?;

        let mut disk = PageManager::open(path)?;
        disk.set_sync_on_write(options.sync_on_write);
        let schema = Arc::new(schema);

        let num_pages = disk.num_pages()?;
        if num_pages > MAX_PAGE_ID as u32 + 1 {
            return Err(StorageError::PageLimitExceeded(MAX_PAGE_ID));
        }

        let mut nodes = Vec::with_capacity(num_pages as usize);
        for page_number in 0..num_pages as u16 {
            nodes.push(Node::load(&disk, PageId(page_number), schema.clone())?);
        }

        let root = match nodes.first() {
            None => None,
            Some(first) => {
                let root = first.page().root_page().ok_or_else(|| {
                    StorageError::MalformedTree("first page does not name a root".to_string())
                })?;
                Some(root)
            }
        };

        let tree = Self {
            disk,
            schema,
            options,
            nodes,
            root,
            next_page_id: num_pages as u16,
        };
        tree.check_structure()?;

        log::debug!(
            "opened tree: {} pages, root {:?}, height {}",
            tree.nodes.len(),
            tree.root,
            tree.height()
        );

        Ok(tree)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root
    }

    pub fn node(&self, page_id: PageId) -> Option<&Node> {
        self.nodes.get(page_id.index())
    }

    pub fn num_pages(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn disk(&self) -> &PageManager {
        &self.disk
    }

    pub fn max_records_per_leaf(&self) -> usize {
        Page::max_records_for(&self.schema, PageType::Leaf)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.disk.sync()
    }

    pub fn insert(&mut self, record: &Record) -> StorageResult<()> {
        let row_id = record.row_id();
        // Encode first so a bad record fails before any page is touched
        record.serialize(&self.schema)?;

        if self.root.is_none() {
            self.create_first_leaf()?;
        }

        let leaf_id = self.find_leaf(row_id)?;

        if self.options.duplicates == DuplicatePolicy::Reject {
            let leaf = Self::leaf_mut(&mut self.nodes, leaf_id)?;
            if leaf.page().find_record(&self.disk, row_id)?.is_some() {
                return Err(StorageError::DuplicateRowId(row_id));
            }
        }

        let leaf = Self::leaf_mut(&mut self.nodes, leaf_id)?;
        if leaf.page_mut().add_record(&mut self.disk, record)? {
            return Ok(());
        }

        self.split_leaf(leaf_id, record)
    }

    /// Point lookup. With duplicate row ids, the first stored record in the target leaf wins.
    pub fn get(&self, row_id: RowId) -> StorageResult<Option<Record>> {
        if self.root.is_none() {
            return Ok(None);
        }

        let leaf_id = self.find_leaf(row_id)?;
        match self.node(leaf_id) {
            Some(Node::Leaf(leaf)) => leaf.page().find_record(&self.disk, row_id),
            _ => Err(StorageError::MalformedTree(format!(
                "descent for row {} ended on page {}, which is not a leaf",
                row_id, leaf_id
            ))),
        }
    }

    /// Every record in ascending row-id order.
    pub fn scan(&self) -> StorageResult<LeafScan<'_>> {
        let start = match self.root {
            Some(root) => Some(self.edge_leaf(root, |children| children[0])?),
            None => None,
        };
        Ok(LeafScan::new(self, start, None))
    }

    /// Records with a row id of at least `row_id`, ascending.
    pub fn scan_from(&self, row_id: RowId) -> StorageResult<LeafScan<'_>> {
        let start = match self.root {
            Some(_) => Some(self.find_leaf(row_id)?),
            None => None,
        };
        Ok(LeafScan::new(self, start, Some(row_id)))
    }

    pub fn records(&self) -> StorageResult<Vec<Record>> {
        self.scan()?.collect()
    }

    /// Leaf page numbers in sibling-chain order.
    pub fn leaf_chain(&self) -> StorageResult<Vec<PageId>> {
        let mut chain = Vec::new();
        let mut current = match self.root {
            Some(root) => Some(self.edge_leaf(root, |children| children[0])?),
            None => None,
        };

        while let Some(page_id) = current {
            if chain.len() >= self.nodes.len() {
                return Err(StorageError::MalformedTree(
                    "leaf sibling chain contains a cycle".to_string(),
                ));
            }
            chain.push(page_id);
            current = Self::leaf_ref(&self.nodes, page_id)?.right_sibling();
        }

        Ok(chain)
    }

    /// Number of internal levels above the leaves. A lone leaf has height 0.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(Node::Internal(internal)) = current.and_then(|id| self.node(id)) {
            height += 1;
            if height > self.nodes.len() {
                break;
            }
            current = internal.children().first().copied();
        }
        height
    }

    /// Largest row id stored, read from the end of the rightmost leaf.
    pub fn max_row_id(&self) -> StorageResult<Option<RowId>> {
        let root = match self.root {
            Some(root) => root,
            None => return Ok(None),
        };

        let leaf_id = self.edge_leaf(root, |children| children[children.len() - 1])?;
        let keys = Self::leaf_ref(&self.nodes, leaf_id)?.page().keys(&self.disk)?;
        Ok(keys.last().copied())
    }

    pub fn statistics(&self) -> TreeStatistics {
        let (leaves, internals): (Vec<&Node>, Vec<&Node>) =
            self.nodes.iter().partition(|node| node.is_leaf());

        TreeStatistics {
            height: self.height(),
            leaf_pages: leaves.len(),
            internal_pages: internals.len(),
            records: leaves.iter().map(|leaf| leaf.page().record_count()).sum(),
            order: self.options.order,
            max_records_per_leaf: self.max_records_per_leaf(),
            root: self.root,
        }
    }

    /// Parent of a non-root node, as recorded in the arena.
    pub fn find_parent(&self, page_id: PageId) -> StorageResult<PageId> {
        if Some(page_id) == self.root {
            return Err(StorageError::MalformedTree(format!(
                "page {} is the root and has no parent",
                page_id
            )));
        }

        self.node(page_id)
            .ok_or(StorageError::PageNotFound(page_id))?
            .parent()
            .ok_or_else(|| {
                StorageError::MalformedTree(format!("page {} has no recorded parent", page_id))
            })
    }

    fn create_first_leaf(&mut self) -> StorageResult<()> {
        let page_id = self.allocate_page_id()?;
        let leaf = LeafNode::create(&mut self.disk, page_id, self.schema.clone(), Some(page_id))?;
        self.push_node(Node::Leaf(leaf))?;
        self.root = Some(page_id);
        log::debug!("created root leaf on page {}", page_id);
        Ok(())
    }

    /// Walk from the root to the leaf whose key range covers `row_id`.
    fn find_leaf(&self, row_id: RowId) -> StorageResult<PageId> {
        let mut current = self
            .root
            .ok_or_else(|| StorageError::MalformedTree("tree has no root".to_string()))?;

        for _ in 0..=self.nodes.len() {
            match self.node(current) {
                Some(Node::Leaf(_)) => return Ok(current),
                Some(Node::Internal(internal)) => current = internal.child_for(row_id),
                None => return Err(StorageError::PageNotFound(current)),
            }
        }

        Err(StorageError::MalformedTree(
            "descent does not reach a leaf".to_string(),
        ))
    }

    /// Leftmost or rightmost leaf below `from`, depending on which child `pick` selects.
    fn edge_leaf<F>(&self, from: PageId, pick: F) -> StorageResult<PageId>
    where
        F: Fn(&[PageId]) -> PageId,
    {
        let mut current = from;
        for _ in 0..=self.nodes.len() {
            match self.node(current) {
                Some(Node::Leaf(_)) => return Ok(current),
                Some(Node::Internal(internal)) => current = pick(internal.children()),
                None => return Err(StorageError::PageNotFound(current)),
            }
        }

        Err(StorageError::MalformedTree(
            "descent does not reach a leaf".to_string(),
        ))
    }

    fn split_leaf(&mut self, leaf_id: PageId, record: &Record) -> StorageResult<()> {
        let root_hint = self.root;
        let new_id = self.allocate_page_id()?;

        let leaf = Self::leaf_mut(&mut self.nodes, leaf_id)?;
        let mut records = leaf.page().get_all_records(&self.disk)?;
        records.push(record.clone());
        // Stable, so equal row ids keep their insertion order
        records.sort_by_key(Record::row_id);

        let upper = records.split_off(records.len() / 2);
        let lower = records;
        let split_key = upper[0].row_id();

        let old_sibling = leaf.right_sibling();
        leaf.page_mut().clear(&mut self.disk)?;
        for r in &lower {
            if !leaf.page_mut().add_record(&mut self.disk, r)? {
                return Err(StorageError::MalformedTree(format!(
                    "lower half of split does not fit back into page {}",
                    leaf_id
                )));
            }
        }
        leaf.page_mut()
            .set_right_sibling(&mut self.disk, Some(new_id))?;

        let mut new_leaf = LeafNode::create(&mut self.disk, new_id, self.schema.clone(), root_hint)?;
        for r in &upper {
            if !new_leaf.page_mut().add_record(&mut self.disk, r)? {
                return Err(StorageError::MalformedTree(format!(
                    "upper half of split does not fit into page {}",
                    new_id
                )));
            }
        }
        new_leaf.page_mut().set_right_sibling(&mut self.disk, old_sibling)?;
        self.push_node(Node::Leaf(new_leaf))?;

        log::debug!(
            "split leaf {} into {} ({} records) and {} ({} records), promoting {}",
            leaf_id,
            leaf_id,
            lower.len(),
            new_id,
            upper.len(),
            split_key
        );

        self.insert_into_parent(leaf_id, split_key, new_id)
    }

    fn insert_into_parent(&mut self, left: PageId, key: RowId, right: PageId) -> StorageResult<()> {
        if Some(left) == self.root {
            return self.grow_root(left, key, right);
        }

        let parent_id = self.find_parent(left)?;
        let max_keys = self.options.max_keys();

        let parent = Self::internal_mut(&mut self.nodes, parent_id)?;
        if parent.num_keys() < max_keys {
            parent.insert_entry(left, key, right)?;
            parent.persist(&mut self.disk)?;
            return self.reparent(right, parent_id);
        }

        self.split_internal(parent_id, left, key, right)
    }

    fn grow_root(&mut self, left: PageId, key: RowId, right: PageId) -> StorageResult<()> {
        let root_id = self.allocate_page_id()?;
        let root = InternalNode::create(
            &mut self.disk,
            root_id,
            self.schema.clone(),
            Some(root_id),
            vec![key],
            vec![left, right],
        )?;
        self.push_node(Node::Internal(root))?;

        self.reparent(left, root_id)?;
        self.reparent(right, root_id)?;
        self.root = Some(root_id);

        let first = Self::node_mut(&mut self.nodes, FIRST_LEAF)?;
        first.page_mut().set_root_page(&mut self.disk, Some(root_id))?;

        log::debug!(
            "new root {} with key {}, tree height is now {}",
            root_id,
            key,
            self.height()
        );
        Ok(())
    }

    /// Split a full internal node while adding `(key, right)` next to its child `left`.
    fn split_internal(
        &mut self,
        node_id: PageId,
        left: PageId,
        key: RowId,
        right: PageId,
    ) -> StorageResult<()> {
        let root_hint = self.root;
        let new_id = self.allocate_page_id()?;

        let node = Self::internal_mut(&mut self.nodes, node_id)?;
        let mut keys = node.keys().to_vec();
        let mut children = node.children().to_vec();
        splice_entry(&mut keys, &mut children, left, key, right).ok_or_else(|| {
            StorageError::MalformedTree(format!("page {} is not a child of {}", left, node_id))
        })?;

        let mid = (self.options.order - 1) / 2;
        let promoted = keys[mid];
        let right_keys = keys.split_off(mid + 1);
        keys.truncate(mid);
        let right_children = children.split_off(mid + 1);

        node.set_entries(keys, children);
        node.persist(&mut self.disk)?;
        let left_children = node.children().to_vec();

        let sibling = InternalNode::create(
            &mut self.disk,
            new_id,
            self.schema.clone(),
            root_hint,
            right_keys,
            right_children.clone(),
        )?;
        self.push_node(Node::Internal(sibling))?;

        for child in left_children {
            self.reparent(child, node_id)?;
        }
        for child in right_children {
            self.reparent(child, new_id)?;
        }

        log::debug!(
            "split internal {} into {} and {}, promoting {}",
            node_id,
            node_id,
            new_id,
            promoted
        );

        self.insert_into_parent(node_id, promoted, new_id)
    }

    fn reparent(&mut self, child: PageId, parent: PageId) -> StorageResult<()> {
        Self::node_mut(&mut self.nodes, child)?.set_parent(&mut self.disk, Some(parent))
    }

    fn allocate_page_id(&mut self) -> StorageResult<PageId> {
        if self.next_page_id > MAX_PAGE_ID {
            return Err(StorageError::PageLimitExceeded(MAX_PAGE_ID));
        }
        let page_id = PageId(self.next_page_id);
        self.next_page_id += 1;
        Ok(page_id)
    }

    fn push_node(&mut self, node: Node) -> StorageResult<()> {
        if node.page_id().index() != self.nodes.len() {
            return Err(StorageError::MalformedTree(format!(
                "page {} allocated out of order, expected {}",
                node.page_id(),
                self.nodes.len()
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Cross-check a freshly loaded arena: every child and sibling exists, parent links
    /// agree with the children lists, and no internal node exceeds the configured order.
    fn check_structure(&self) -> StorageResult<()> {
        let root = match self.root {
            Some(root) => root,
            None => return Ok(()),
        };
        let root_node = self.node(root).ok_or(StorageError::PageNotFound(root))?;
        if root_node.parent().is_some() {
            return Err(StorageError::MalformedTree(format!(
                "root page {} has a parent",
                root
            )));
        }

        for node in &self.nodes {
            match node {
                Node::Leaf(leaf) => {
                    if let Some(sibling) = leaf.right_sibling() {
                        Self::leaf_ref(&self.nodes, sibling)?;
                    }
                }
                Node::Internal(internal) => {
                    if internal.num_keys() > self.options.max_keys() {
                        return Err(StorageError::MalformedTree(format!(
                            "page {} holds {} keys, more than order {} allows",
                            internal.page().page_id(),
                            internal.num_keys(),
                            self.options.order
                        )));
                    }
                    for &child in internal.children() {
                        let child_node = self.node(child).ok_or(StorageError::PageNotFound(child))?;
                        if child_node.parent() != Some(internal.page().page_id()) {
                            return Err(StorageError::MalformedTree(format!(
                                "page {} is a child of {} but records parent {:?}",
                                child,
                                internal.page().page_id(),
                                child_node.parent()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn node_mut(nodes: &mut [Node], page_id: PageId) -> StorageResult<&mut Node> {
        nodes
            .get_mut(page_id.index())
            .ok_or(StorageError::PageNotFound(page_id))
    }

    fn leaf_ref(nodes: &[Node], page_id: PageId) -> StorageResult<&LeafNode> {
        match nodes.get(page_id.index()) {
            Some(Node::Leaf(leaf)) => Ok(leaf),
            Some(Node::Internal(_)) => Err(StorageError::MalformedTree(format!(
                "page {} is not a leaf",
                page_id
            ))),
            None => Err(StorageError::PageNotFound(page_id)),
        }
    }

    fn leaf_mut(nodes: &mut [Node], page_id: PageId) -> StorageResult<&mut LeafNode> {
        match nodes.get_mut(page_id.index()) {
            Some(Node::Leaf(leaf)) => Ok(leaf),
            Some(Node::Internal(_)) => Err(StorageError::MalformedTree(format!(
                "page {} is not a leaf",
                page_id
            ))),
            None => Err(StorageError::PageNotFound(page_id)),
        }
    }

    fn internal_mut(nodes: &mut [Node], page_id: PageId) -> StorageResult<&mut InternalNode> {
        match nodes.get_mut(page_id.index()) {
            Some(Node::Internal(internal)) => Ok(internal),
            Some(Node::Leaf(_)) => Err(StorageError::MalformedTree(format!(
                "page {} is not an internal node",
                page_id
            ))),
            None => Err(StorageError::PageNotFound(page_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::Value;
    use crate::catalog::{Field, FieldType};
    use anyhow::Result;
    use rand::seq::SliceRandom;
    use rand::thread_rng;
    use tempfile::{tempdir, TempDir};

    /// 125 byte records: three per leaf
    fn wide_schema() -> Schema {
        Schema::new(vec![Field::new("name", FieldType::Text(120))]).unwrap()
    }

    fn employee_schema() -> Schema {
        Schema::new(vec![
            Field::new("name", FieldType::Text(20)),
            Field::new("age", FieldType::Int),
            Field::new("dept", FieldType::Short),
        ])
        .unwrap()
    }

    fn named(row_id: RowId) -> Record {
        Record::from_values(row_id, [("name", Value::Text(format!("row{}", row_id)))])
    }

    fn employee(row_id: RowId) -> Record {
        Record::from_values(
            row_id,
            [
                ("name", Value::Text(format!("emp{}", row_id))),
                ("age", Value::Int(20 + (row_id % 40) as i32)),
                ("dept", Value::Short((row_id % 7) as i16)),
            ],
        )
    }

    fn setup(schema: Schema, options: TreeOptions) -> Result<(BPlusTree, TempDir)> {
        let dir = tempdir()?;
        let tree = BPlusTree::create(&dir.path().join("test.tbl"), schema, options)?;
        Ok((tree, dir))
    }

    fn row_ids(tree: &BPlusTree) -> Result<Vec<RowId>> {
        Ok(tree.records()?.iter().map(Record::row_id).collect())
    }

    fn internal(tree: &BPlusTree, page_id: PageId) -> &InternalNode {
        match tree.node(page_id) {
            Some(Node::Internal(internal)) => internal,
            _ => panic!("page {} is not internal", page_id),
        }
    }

    fn leaf_keys(tree: &BPlusTree, page_id: PageId) -> Result<Vec<RowId>> {
        Ok(tree.node(page_id).unwrap().page().keys(tree.disk())?)
    }

    #[test]
    fn test_empty_tree() -> Result<()> {
        let (tree, _dir) = setup(wide_schema(), TreeOptions::default())?;

        assert!(tree.is_empty());
        assert_eq!(tree.num_pages(), 0);
        assert_eq!(tree.height(), 0);
        assert!(tree.get(1)?.is_none());
        assert!(tree.records()?.is_empty());
        assert_eq!(tree.max_row_id()?, None);
        Ok(())
    }

    #[test]
    fn test_invalid_order_rejected() {
        let dir = tempdir().unwrap();
        let result = BPlusTree::create(
            &dir.path().join("t.tbl"),
            wide_schema(),
            TreeOptions::default().with_order(2),
        );
        assert!(matches!(result, Err(StorageError::InvalidOrder { .. })));
    }

    #[test]
    fn test_single_leaf_until_full() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        assert_eq!(tree.max_records_per_leaf(), 3);

        for row_id in 1..=3 {
            tree.insert(&named(row_id))?;
        }

        assert_eq!(tree.num_pages(), 1);
        assert_eq!(tree.root_page_id(), Some(PageId(0)));
        assert_eq!(tree.height(), 0);
        assert_eq!(row_ids(&tree)?, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_first_split_scenario() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in 1..=4 {
            tree.insert(&named(row_id))?;
        }

        assert_eq!(leaf_keys(&tree, PageId(0))?, vec![1, 2]);
        assert_eq!(leaf_keys(&tree, PageId(1))?, vec![3, 4]);
        assert_eq!(tree.leaf_chain()?, vec![PageId(0), PageId(1)]);

        let root = tree.root_page_id().unwrap();
        assert_eq!(root, PageId(2));
        let root_node = internal(&tree, root);
        assert_eq!(root_node.keys(), &[3]);
        assert_eq!(root_node.children(), &[PageId(0), PageId(1)]);

        assert_eq!(tree.find_parent(PageId(0))?, root);
        assert_eq!(tree.find_parent(PageId(1))?, root);
        assert_eq!(tree.node(PageId(0)).unwrap().page().root_page(), Some(root));
        assert_eq!(tree.height(), 1);
        Ok(())
    }

    #[test]
    fn test_one_split_after_capacity() -> Result<()> {
        let (mut tree, _dir) = setup(employee_schema(), TreeOptions::default())?;
        let max = tree.max_records_per_leaf();

        for row_id in 0..=max as RowId {
            tree.insert(&employee(row_id * 10))?;
        }

        let chain = tree.leaf_chain()?;
        assert_eq!(chain.len(), 2);
        let left = leaf_keys(&tree, chain[0])?;
        let right = leaf_keys(&tree, chain[1])?;
        assert_eq!(left.len() + right.len(), max + 1);

        let root = internal(&tree, tree.root_page_id().unwrap());
        assert_eq!(root.keys(), &[right[0]]);
        Ok(())
    }

    #[test]
    fn test_find_parent_of_root_is_malformed() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        tree.insert(&named(1))?;

        let result = tree.find_parent(PageId(0));
        assert!(matches!(result, Err(StorageError::MalformedTree(_))));
        Ok(())
    }

    #[test]
    fn test_sequential_inserts_grow_to_height_two() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in 1..=10 {
            tree.insert(&named(row_id))?;
        }

        assert_eq!(tree.height(), 2);
        let root = internal(&tree, tree.root_page_id().unwrap());
        assert_eq!(root.keys(), &[5]);
        assert_eq!(root.children(), &[PageId(2), PageId(6)]);
        assert_eq!(internal(&tree, PageId(2)).keys(), &[3]);
        assert_eq!(internal(&tree, PageId(6)).keys(), &[7, 9]);

        assert_eq!(
            tree.leaf_chain()?,
            vec![PageId(0), PageId(1), PageId(3), PageId(4), PageId(5)]
        );
        assert_eq!(row_ids(&tree)?, (1..=10).collect::<Vec<_>>());

        // leaves moved into the new internal node point at it
        assert_eq!(tree.find_parent(PageId(3))?, PageId(6));
        assert_eq!(tree.find_parent(PageId(5))?, PageId(6));
        assert_eq!(tree.find_parent(PageId(1))?, PageId(2));
        Ok(())
    }

    #[test]
    fn test_random_order_scans_sorted() -> Result<()> {
        let (mut tree, _dir) = setup(employee_schema(), TreeOptions::default())?;

        let mut ids: Vec<RowId> = (1..=500).collect();
        ids.shuffle(&mut thread_rng());
        for &row_id in &ids {
            tree.insert(&employee(row_id))?;
        }

        assert_eq!(row_ids(&tree)?, (1..=500).collect::<Vec<_>>());
        assert_eq!(tree.statistics().records, 500);
        assert!(tree.height() >= 2);

        for row_id in [1, 250, 500] {
            let record = tree.get(row_id)?.expect("stored row");
            assert_eq!(record, employee(row_id));
        }
        assert!(tree.get(501)?.is_none());
        Ok(())
    }

    #[test]
    fn test_larger_order() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default().with_order(5))?;
        for row_id in (1..=60).rev() {
            tree.insert(&named(row_id))?;
        }

        assert_eq!(row_ids(&tree)?, (1..=60).collect::<Vec<_>>());
        for node in &tree.nodes {
            if let Node::Internal(internal) = node {
                assert!(internal.num_keys() <= 4);
                assert_eq!(internal.children().len(), internal.num_keys() + 1);
            }
        }
        Ok(())
    }

    #[test]
    fn test_duplicates_allowed_by_default() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in [1, 2, 2, 2, 3, 2] {
            tree.insert(&named(row_id))?;
        }

        assert_eq!(row_ids(&tree)?, vec![1, 2, 2, 2, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_duplicate_split_next_to_equal_separator() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        // The 1s split the left leaf while the root already separates at 2
        for row_id in [2, 2, 2, 2, 1, 1, 3] {
            tree.insert(&named(row_id))?;
        }

        let root = internal(&tree, tree.root_page_id().unwrap());
        assert_eq!(root.keys(), &[2, 2]);
        assert_eq!(root.children(), &[PageId(0), PageId(3), PageId(1)]);
        assert_eq!(tree.leaf_chain()?, root.children().to_vec());
        assert_eq!(row_ids(&tree)?, vec![1, 1, 2, 2, 2, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_duplicate_heavy_inserts_stay_sorted() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        let mut ids: Vec<RowId> = (0..120).map(|i| i % 7).collect();
        ids.shuffle(&mut thread_rng());
        for &row_id in &ids {
            tree.insert(&named(row_id))?;
        }

        let scanned = row_ids(&tree)?;
        ids.sort_unstable();
        assert_eq!(scanned, ids);

        // every internal node lists its children in leaf-chain order
        let chain = tree.leaf_chain()?;
        let mut leaves_in_key_order = Vec::new();
        collect_leaves(&tree, tree.root_page_id().unwrap(), &mut leaves_in_key_order);
        assert_eq!(leaves_in_key_order, chain);
        Ok(())
    }

    fn collect_leaves(tree: &BPlusTree, page_id: PageId, out: &mut Vec<PageId>) {
        match tree.node(page_id) {
            Some(Node::Leaf(_)) => out.push(page_id),
            Some(Node::Internal(internal)) => {
                for &child in internal.children() {
                    collect_leaves(tree, child, out);
                }
            }
            None => panic!("missing page {}", page_id),
        }
    }

    #[test]
    fn test_duplicates_rejected() -> Result<()> {
        let options = TreeOptions::default().with_duplicates(DuplicatePolicy::Reject);
        let (mut tree, _dir) = setup(wide_schema(), options)?;
        for row_id in 1..=5 {
            tree.insert(&named(row_id))?;
        }
        let pages_before = tree.num_pages();

        let result = tree.insert(&named(4));
        assert!(matches!(result, Err(StorageError::DuplicateRowId(4))));
        assert_eq!(tree.num_pages(), pages_before);
        assert_eq!(row_ids(&tree)?, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_invalid_record_writes_nothing() -> Result<()> {
        let (mut tree, _dir) = setup(employee_schema(), TreeOptions::default())?;
        let bad = Record::from_values(1, [("name", Value::from("x"))]);

        assert!(matches!(tree.insert(&bad), Err(StorageError::InvalidRecord(_))));
        assert_eq!(tree.num_pages(), 0);
        Ok(())
    }

    #[test]
    fn test_scan_from() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in (2..=40).step_by(2) {
            tree.insert(&named(row_id))?;
        }

        let ids: Vec<RowId> = tree
            .scan_from(25)?
            .map(|r| r.map(|r| r.row_id()))
            .collect::<StorageResult<_>>()?;
        assert_eq!(ids, vec![26, 28, 30, 32, 34, 36, 38, 40]);

        let mut scan = tree.scan_from(41)?;
        assert!(scan.next().is_none());
        Ok(())
    }

    #[test]
    fn test_scan_visits_every_leaf() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in 1..=10 {
            tree.insert(&named(row_id))?;
        }

        let mut scan = tree.scan()?;
        let count = scan.by_ref().count();
        assert_eq!(count, 10);
        assert_eq!(scan.leaves_visited(), 5);
        Ok(())
    }

    #[test]
    fn test_statistics_and_max_row_id() -> Result<()> {
        let (mut tree, _dir) = setup(wide_schema(), TreeOptions::default())?;
        for row_id in [7, 3, 9, 1, 5] {
            tree.insert(&named(row_id))?;
        }

        let stats = tree.statistics();
        assert_eq!(stats.records, 5);
        assert_eq!(stats.leaf_pages, 2);
        assert_eq!(stats.internal_pages, 1);
        assert_eq!(stats.height, 1);
        assert_eq!(stats.order, 4);
        assert_eq!(stats.max_records_per_leaf, 3);
        assert_eq!(tree.max_row_id()?, Some(9));
        Ok(())
    }

    #[test]
    fn test_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.tbl");

        let (root, height) = {
            let mut tree = BPlusTree::create(&path, employee_schema(), TreeOptions::default())?;
            for row_id in 1..=200 {
                tree.insert(&employee(row_id))?;
            }
            tree.sync()?;
            (tree.root_page_id(), tree.height())
        };

        let mut tree = BPlusTree::open(&path, employee_schema(), TreeOptions::default())?;
        assert_eq!(tree.root_page_id(), root);
        assert_eq!(tree.height(), height);
        assert_eq!(row_ids(&tree)?, (1..=200).collect::<Vec<_>>());
        assert_eq!(tree.max_row_id()?, Some(200));

        for row_id in 201..=260 {
            tree.insert(&employee(row_id))?;
        }
        assert_eq!(row_ids(&tree)?, (1..=260).collect::<Vec<_>>());
        assert_eq!(tree.get(230)?, Some(employee(230)));
        Ok(())
    }

    #[test]
    fn test_reopen_with_smaller_order_is_malformed() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.tbl");
        {
            let mut tree = BPlusTree::create(&path, wide_schema(), TreeOptions::default().with_order(8))?;
            for row_id in 1..=30 {
                tree.insert(&named(row_id))?;
            }
        }

        let result = BPlusTree::open(&path, wide_schema(), TreeOptions::default().with_order(3));
        assert!(matches!(result, Err(StorageError::MalformedTree(_))));
        Ok(())
    }
}

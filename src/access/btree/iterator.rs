use crate::access::btree::node::Node;
use crate::access::btree::BPlusTree;
use crate::access::record::{Record, RowId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::collections::VecDeque;

/// Ascending scan over the leaf sibling chain.
///
/// One leaf is read at a time; the next leaf is found through the right-sibling pointer, so
/// no internal node is touched after the starting leaf has been located.
pub struct LeafScan<'a> {
    tree: &'a BPlusTree,
    next_leaf: Option<PageId>,
    buffered: VecDeque<Record>,
    /// Records below this row id are skipped
    lower_bound: Option<RowId>,
    /// Statistics
    leaves_visited: usize,
}

impl<'a> LeafScan<'a> {
    pub(crate) fn new(tree: &'a BPlusTree, start: Option<PageId>, lower_bound: Option<RowId>) -> Self {
        Self {
            tree,
            next_leaf: start,
            buffered: VecDeque::new(),
            lower_bound,
            leaves_visited: 0,
        }
    }

    pub fn leaves_visited(&self) -> usize {
        self.leaves_visited
    }

    fn fill(&mut self, page_id: PageId) -> StorageResult<()> {
        let leaf = match self.tree.node(page_id) {
            Some(Node::Leaf(leaf)) => leaf,
            Some(Node::Internal(_)) => {
                return Err(StorageError::MalformedTree(format!(
                    "sibling chain reaches internal page {}",
                    page_id
                )))
            }
            None => return Err(StorageError::PageNotFound(page_id)),
        };

        self.leaves_visited += 1;
        // A cycle in the chain would otherwise never terminate
        if self.leaves_visited > self.tree.num_nodes() {
            return Err(StorageError::MalformedTree(
                "leaf sibling chain contains a cycle".to_string(),
            ));
        }

        let records = leaf.page().get_all_records(self.tree.disk())?;
        let lower_bound = self.lower_bound;
        self.buffered.extend(
            records
                .into_iter()
                .filter(|r| lower_bound.map_or(true, |bound| r.row_id() >= bound)),
        );
        self.next_leaf = leaf.right_sibling();
        Ok(())
    }
}

impl Iterator for LeafScan<'_> {
    type Item = StorageResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(Ok(record));
            }

            let page_id = self.next_leaf.take()?;
            if let Err(e) = self.fill(page_id) {
                self.next_leaf = None;
                return Some(Err(e));
            }
        }
    }
}

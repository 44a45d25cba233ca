//! Cumulative call-path trees
//!
//! Each completed call is folded into its region's tree along the full
//! stack path that was active when it exited. Every node on that path
//! accumulates the call's duration, so a node's `length` is inclusive: it
//! covers its own completions and everything completed beneath it.
//!
//! Nodes own their children directly; descent borrows one level at a time,
//! so there is no aliasing into a container that might reallocate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One call path element with its inclusive time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTreeNode {
    /// Inclusive elapsed time of every completed call through this node
    pub length: i64,
    /// Child label -> child node
    pub children: BTreeMap<String, CallTreeNode>,
}

impl CallTreeNode {
    pub fn child(&self, label: &str) -> Option<&CallTreeNode> {
        self.children.get(label)
    }

    /// Follow `path` from this node's children
    pub fn descendant<S: AsRef<str>>(&self, path: &[S]) -> Option<&CallTreeNode> {
        path.iter()
            .try_fold(self, |node, label| node.child(label.as_ref()))
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .values()
            .map(CallTreeNode::node_count)
            .sum::<usize>()
    }
}

/// Root set of one region's tree, keyed by outermost call label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallTree {
    roots: BTreeMap<String, CallTreeNode>,
}

impl CallTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed call into the tree
    ///
    /// `path` runs from the outermost label to the label that just exited.
    /// Every node on it gains `duration`; missing nodes are created with
    /// zero length first. Totals saturate at the `i64` bounds. An empty
    /// path is ignored.
    pub fn record<S: AsRef<str>>(&mut self, path: &[S], duration: i64) {
        let Some((root, rest)) = path.split_first() else {
            return;
        };

        let mut node = self.roots.entry(root.as_ref().to_string()).or_default();
        node.length = node.length.saturating_add(duration);

        for label in rest {
            node = node.children.entry(label.as_ref().to_string()).or_default();
            node.length = node.length.saturating_add(duration);
        }
    }

    pub fn root(&self, label: &str) -> Option<&CallTreeNode> {
        self.roots.get(label)
    }

    /// Look up a node by its full path from the root label
    pub fn node<S: AsRef<str>>(&self, path: &[S]) -> Option<&CallTreeNode> {
        let (root, rest) = path.split_first()?;
        self.root(root.as_ref())?.descendant(rest)
    }

    pub fn roots(&self) -> &BTreeMap<String, CallTreeNode> {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.roots.values().map(CallTreeNode::node_count).sum()
    }
}

/// Per-region trees owned by the ingestion thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTrees {
    trees: BTreeMap<String, CallTree>,
}

impl RegionTrees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a completed call into `region`'s tree, creating it if needed
    pub fn record<S: AsRef<str>>(&mut self, region: &str, path: &[S], duration: i64) {
        self.trees
            .entry(region.to_string())
            .or_default()
            .record(path, duration);
    }

    pub fn get(&self, region: &str) -> Option<&CallTree> {
        self.trees.get(region)
    }

    /// Remove and return `region`'s tree
    pub fn take(&mut self, region: &str) -> Option<CallTree> {
        self.trees.remove(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

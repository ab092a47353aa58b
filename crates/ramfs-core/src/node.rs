// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem nodes
//!
//! A [`Node`] is a directory, regular file or symbolic link. Directories own
//! a name → `Arc<Node>` mapping; a node named by several directories (hard
//! links) is shared and is released once the last entry or open handle
//! referencing it goes away. Nodes never point back at their parents.
//!
//! Each node guards its attributes and body with its own lock. Operations
//! never hold more than one node lock at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::error::{FsError, FsResult};
use crate::handle::OpenFile;
use crate::types::{Attributes, NodeId, NodeKind, PERMISSION_MASK};

/// Bookkeeping shared by every node of one filesystem instance
#[derive(Debug)]
pub(crate) struct TreeIndex {
    next_id: AtomicU64,
    live_nodes: AtomicU64,
}

impl TreeIndex {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            live_nodes: AtomicU64::new(0),
        })
    }

    fn register(&self) -> NodeId {
        self.live_nodes.fetch_add(1, Ordering::Relaxed);
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn release(&self) {
        self.live_nodes.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn live_nodes(&self) -> u64 {
        self.live_nodes.load(Ordering::Relaxed)
    }
}

/// Per-kind node payload
#[derive(Debug)]
pub(crate) enum NodeBody {
    Directory { children: HashMap<String, Arc<Node>> },
    File { data: Vec<u8> },
    Symlink { target: Vec<u8> },
}

impl NodeBody {
    fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Directory => NodeBody::Directory {
                children: HashMap::new(),
            },
            NodeKind::RegularFile => NodeBody::File { data: Vec::new() },
            NodeKind::Symlink => NodeBody::Symlink { target: Vec::new() },
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Directory { .. } => NodeKind::Directory,
            NodeBody::File { .. } => NodeKind::RegularFile,
            NodeBody::Symlink { .. } => NodeKind::Symlink,
        }
    }

    /// Content bytes; directories have none
    pub(crate) fn content(&self) -> &[u8] {
        match self {
            NodeBody::Directory { .. } => &[],
            NodeBody::File { data } => data,
            NodeBody::Symlink { target } => target,
        }
    }

    pub(crate) fn content_mut(&mut self) -> FsResult<&mut Vec<u8>> {
        match self {
            NodeBody::Directory { .. } => Err(FsError::IsADirectory),
            NodeBody::File { data } => Ok(data),
            NodeBody::Symlink { target } => Ok(target),
        }
    }

    pub(crate) fn children(&self) -> FsResult<&HashMap<String, Arc<Node>>> {
        match self {
            NodeBody::Directory { children } => Ok(children),
            _ => Err(FsError::NotADirectory),
        }
    }

    pub(crate) fn children_mut(&mut self) -> FsResult<&mut HashMap<String, Arc<Node>>> {
        match self {
            NodeBody::Directory { children } => Ok(children),
            _ => Err(FsError::NotADirectory),
        }
    }

    /// Detach every child, leaving an empty directory
    fn take_children(&mut self) -> Vec<Arc<Node>> {
        match self {
            NodeBody::Directory { children } => std::mem::take(children).into_values().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeState {
    pub(crate) attr: Attributes,
    pub(crate) body: NodeBody,
}

/// A directory, regular file or symbolic link held in memory
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    index: Arc<TreeIndex>,
    pub(crate) state: RwLock<NodeState>,
}

impl Node {
    /// Allocate a node of `kind` with permission bits taken from `mode`.
    ///
    /// All three timestamps are stamped with the same instant. A child
    /// inherits its parent's owner and registers with the parent's tree
    /// index; a parentless node starts a new tree owned by uid/gid 0.
    pub(crate) fn new(parent: Option<&Node>, kind: NodeKind, mode: u32) -> Arc<Node> {
        let now = SystemTime::now();
        let mut attr = Attributes::new(kind.type_bits() | (mode & PERMISSION_MASK), now);
        if kind == NodeKind::Directory {
            attr.nlink = 1;
        }

        let index = match parent {
            Some(parent) => {
                let parent_attr = parent.state.read();
                attr.uid = parent_attr.attr.uid;
                attr.gid = parent_attr.attr.gid;
                Arc::clone(&parent.index)
            }
            None => TreeIndex::new(),
        };
        let id = index.register();

        Arc::new(Node {
            id,
            index,
            state: RwLock::new(NodeState {
                attr,
                body: NodeBody::empty(kind),
            }),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.state.read().body.kind()
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    /// Whether the transport may discard this node when the kernel evicts it
    /// from its cache. Always false: the tree holds the only copy of the data,
    /// and removal from the tree is never refused on the node's behalf.
    pub fn deletable(&self) -> bool {
        false
    }

    pub(crate) fn live_nodes(&self) -> u64 {
        self.index.live_nodes()
    }

    /// Snapshot of the node's attributes
    pub fn getattr(&self) -> Attributes {
        self.state.read().attr.clone()
    }

    /// Look up a child entry by name
    pub fn lookup(&self, name: &str) -> FsResult<Arc<Node>> {
        let state = self.state.read();
        state.body.children()?.get(name).cloned().ok_or(FsError::NotFound)
    }

    /// Snapshot of the directory's entries, sorted by name
    pub fn entries(&self) -> FsResult<Vec<(String, Arc<Node>)>> {
        let state = self.state.read();
        let mut entries: Vec<_> = state
            .body
            .children()?
            .iter()
            .map(|(name, child)| (name.clone(), Arc::clone(child)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Target text of a symbolic link
    pub fn readlink(&self) -> FsResult<Vec<u8>> {
        match &self.state.read().body {
            NodeBody::Symlink { target } => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument),
        }
    }

    /// Open the node for content access
    pub fn open(self: &Arc<Self>, flags: i32) -> FsResult<OpenFile> {
        if self.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(OpenFile::new(Arc::clone(self), flags))
    }

    pub(crate) fn adjust_nlink(&self, delta: i32, now: SystemTime) {
        let mut state = self.state.write();
        state.attr.nlink = state.attr.nlink.saturating_add_signed(delta);
        state.attr.ctime = now;
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.index.release();

        // Release the subtree iteratively; nested drops would recurse once
        // per directory level.
        let mut pending = self.state.get_mut().body.take_children();
        while let Some(child) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(child) {
                pending.extend(node.state.get_mut().body.take_children());
            }
        }
    }
}

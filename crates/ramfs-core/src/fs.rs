// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The filesystem instance

use std::collections::HashSet;
use std::sync::Arc;

use nix::unistd::{getgid, getuid};
use tracing::info;

use crate::config::FsConfig;
use crate::node::Node;
use crate::types::{FsStats, NodeId, NodeKind};

/// An in-memory filesystem: a root directory and everything reachable from
/// it. Dropping the instance releases every node not held by an open handle.
#[derive(Debug)]
pub struct RamFs {
    root: Arc<Node>,
}

impl RamFs {
    /// Create an empty filesystem whose root is owned by `uid`/`gid`, or by
    /// the current process identity where `None`.
    pub fn new(uid: Option<u32>, gid: Option<u32>) -> Self {
        let uid = uid.unwrap_or_else(|| getuid().as_raw());
        let gid = gid.unwrap_or_else(|| getgid().as_raw());

        let root = Node::new(None, NodeKind::Directory, 0o700);
        {
            let mut state = root.state.write();
            state.attr.uid = uid;
            state.attr.gid = gid;
            state.attr.nlink = 2;
        }
        info!(uid, gid, root = %root.id(), "created filesystem");
        Self { root }
    }

    pub fn from_config(config: &FsConfig) -> Self {
        Self::new(config.default_uid, config.default_gid)
    }

    /// The root directory, entry point for all path resolution
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn root_id(&self) -> NodeId {
        self.root.id()
    }

    /// Walk the tree and report node and byte counts. Hard-linked nodes are
    /// counted once.
    pub fn stats(&self) -> FsStats {
        let mut seen = HashSet::new();
        let mut pending = vec![Arc::clone(&self.root)];
        let mut stats = FsStats {
            live_nodes: self.root.live_nodes(),
            ..FsStats::default()
        };

        while let Some(node) = pending.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            stats.reachable_nodes += 1;
            match node.entries() {
                Ok(entries) => pending.extend(entries.into_iter().map(|(_, child)| child)),
                Err(_) => stats.bytes_in_memory += node.getattr().size,
            }
        }
        stats
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for RamFS

use std::time::SystemTime;

/// File type mask within `Attributes::mode`
pub const S_IFMT: u32 = libc::S_IFMT as u32;
/// Directory type bits
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
/// Regular file type bits
pub const S_IFREG: u32 = libc::S_IFREG as u32;
/// Symbolic link type bits
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;
/// Permission bits, including setuid/setgid/sticky
pub const PERMISSION_MASK: u32 = 0o7777;

/// Largest offset or size a file may reach (2 GiB)
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Node identifier, unique within one filesystem instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of node kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    RegularFile,
    Symlink,
}

impl NodeKind {
    /// Type bits stored in the mode of a node of this kind
    pub fn type_bits(self) -> u32 {
        match self {
            NodeKind::Directory => S_IFDIR,
            NodeKind::RegularFile => S_IFREG,
            NodeKind::Symlink => S_IFLNK,
        }
    }

    /// Kind encoded in the type bits of `mode`, if any
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFDIR => Some(NodeKind::Directory),
            S_IFREG => Some(NodeKind::RegularFile),
            S_IFLNK => Some(NodeKind::Symlink),
            _ => None,
        }
    }
}

/// Node metadata
///
/// `size` always equals the length of the node's content buffer (0 for
/// directories). `nlink` counts directory entries naming the node, plus one
/// for a directory's own "." entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Attributes {
    pub(crate) fn new(mode: u32, now: SystemTime) -> Self {
        Self {
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            nlink: 0,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Permission bits without the type bits
    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_mode(self.mode)
    }

    /// Apply the given times; `None` leaves a field unchanged. `ctime` is
    /// set unconditionally when provided.
    pub(crate) fn set_times(
        &mut self,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
        ctime: Option<SystemTime>,
    ) {
        if let Some(atime) = atime {
            self.atime = atime;
        }
        if let Some(mtime) = mtime {
            self.mtime = mtime;
        }
        if let Some(ctime) = ctime {
            self.ctime = ctime;
        }
    }
}

/// Filesystem statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    /// Nodes still allocated, whether reachable from the root or held by an
    /// open handle only
    pub live_nodes: u64,
    /// Distinct nodes reachable from the root
    pub reachable_nodes: u64,
    /// Content bytes held by reachable files and symlinks
    pub bytes_in_memory: u64,
}

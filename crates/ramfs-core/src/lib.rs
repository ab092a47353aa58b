// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RamFS Core: an in-memory hierarchical filesystem
//!
//! The tree is made of [`Node`]s: directories map names to shared children,
//! regular files and symbolic links hold a byte buffer. [`RamFs`] owns the
//! root and is handed to a kernel transport (see `ramfs-fuse-host`), which
//! resolves paths by successive [`Node::lookup`] calls and maps [`FsError`]
//! kinds onto errno values.

pub mod config;
pub mod content;
pub mod error;
pub mod fs;
pub mod handle;
pub mod node;
pub mod tree;
pub mod types;

pub use config::{CachePolicy, FsConfig};
pub use content::ContentView;
pub use error::{FsError, FsResult};
pub use fs::RamFs;
pub use handle::{FileHandle, OpenFile};
pub use node::Node;
pub use types::{
    Attributes, FsStats, NodeId, NodeKind, MAX_FILE_SIZE, PERMISSION_MASK, S_IFDIR, S_IFLNK,
    S_IFMT, S_IFREG,
};

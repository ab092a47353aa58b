// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open file handles

use std::sync::Arc;
use std::time::SystemTime;

use crate::content::ContentView;
use crate::error::{FsError, FsResult};
use crate::node::Node;
use crate::types::Attributes;

/// Operations reachable through an open file.
///
/// Every method has a default: content and attribute operations report
/// `Unsupported`, `flush` and `release` succeed. Implementors override what
/// they model.
pub trait FileHandle: Send + Sync {
    fn read(&self, _offset: u64) -> FsResult<ContentView<'_>> {
        Err(FsError::Unsupported)
    }

    fn write(&self, _offset: u64, _data: &[u8]) -> FsResult<u32> {
        Err(FsError::Unsupported)
    }

    fn truncate(&self, _size: u64) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn getattr(&self) -> FsResult<Attributes> {
        Err(FsError::Unsupported)
    }

    fn chmod(&self, _perms: u32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn chown(&self, _uid: u32, _gid: u32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn utimens(&self, _atime: Option<SystemTime>, _mtime: Option<SystemTime>) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn flush(&self) -> FsResult<()> {
        Ok(())
    }

    fn fsync(&self, _datasync: bool) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn allocate(&self, _offset: u64, _length: u64, _mode: i32) -> FsResult<()> {
        Err(FsError::Unsupported)
    }

    fn ioctl(&self, _cmd: u32, _input: &[u8]) -> FsResult<Vec<u8>> {
        Err(FsError::Unsupported)
    }

    fn release(&self) {}
}

/// Handle returned by `Node::open` and `Node::create`
#[derive(Debug)]
pub struct OpenFile {
    node: Arc<Node>,
    flags: i32,
}

impl OpenFile {
    pub(crate) fn new(node: Arc<Node>, flags: i32) -> Self {
        Self { node, flags }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Open flags the handle was created with
    pub fn flags(&self) -> i32 {
        self.flags
    }
}

impl FileHandle for OpenFile {
    fn read(&self, offset: u64) -> FsResult<ContentView<'_>> {
        Ok(self.node.read(offset))
    }

    fn write(&self, offset: u64, data: &[u8]) -> FsResult<u32> {
        self.node.write(offset, data)
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.node.truncate(size)
    }

    fn getattr(&self) -> FsResult<Attributes> {
        Ok(self.node.getattr())
    }

    fn chmod(&self, perms: u32) -> FsResult<()> {
        self.node.chmod(perms);
        Ok(())
    }

    fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        self.node.chown(uid, gid);
        Ok(())
    }

    fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) -> FsResult<()> {
        self.node.utimens(atime, mtime);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeKind, S_IFREG};

    struct Bare;

    impl FileHandle for Bare {}

    fn open_file() -> (Arc<Node>, OpenFile) {
        let root = Node::new(None, NodeKind::Directory, 0o755);
        let (file, _) = root.create("f", libc::O_WRONLY, 0o644).unwrap();
        (root, file)
    }

    #[test]
    fn defaults_report_unsupported() {
        let handle = Bare;

        assert!(matches!(handle.read(0), Err(FsError::Unsupported)));
        assert_eq!(handle.write(0, b"x"), Err(FsError::Unsupported));
        assert_eq!(handle.getattr(), Err(FsError::Unsupported));
        assert_eq!(handle.flush(), Ok(()));
    }

    #[test]
    fn open_file_delegates_to_node() {
        let (_root, file) = open_file();

        assert_eq!(file.write(0, b"hello").unwrap(), 5);
        file.truncate(4).unwrap();
        file.chmod(0o600).unwrap();
        file.chown(7, 8).unwrap();

        assert_eq!(&*file.read(1).unwrap(), b"ell");
        let attr = file.getattr().unwrap();
        assert_eq!(attr.size, 4);
        assert_eq!(attr.mode, S_IFREG | 0o600);
        assert_eq!((attr.uid, attr.gid), (7, 8));
        assert_eq!(file.flags(), libc::O_WRONLY);
    }

    #[test]
    fn open_file_does_not_model_sync_or_extensions() {
        let (_root, file) = open_file();

        assert_eq!(file.flush(), Ok(()));
        assert_eq!(file.fsync(false), Err(FsError::Unsupported));
        assert_eq!(file.allocate(0, 4096, 0), Err(FsError::Unsupported));
        assert_eq!(file.ioctl(0, &[]), Err(FsError::Unsupported));
    }

    #[test]
    fn handle_keeps_unlinked_node_alive() {
        let (root, file) = open_file();
        file.write(0, b"still here").unwrap();

        root.unlink("f").unwrap();

        assert_eq!(&*file.read(0).unwrap(), b"still here");
        assert_eq!(root.live_nodes(), 2);
        drop(file);
        assert_eq!(root.live_nodes(), 1);
    }
}

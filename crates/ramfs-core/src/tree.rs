// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory mutation: mkdir, unlink, rmdir, symlink, rename, link, create
//!
//! These operate on the raw name → node mapping only. There are no emptiness
//! checks on removal and no cycle checks on rename or link; POSIX policy is
//! left to the caller.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::handle::OpenFile;
use crate::node::{Node, NodeBody};
use crate::types::NodeKind;

impl Node {
    /// Insert `child` under `name`, replacing any previous entry
    fn link_child(&self, name: &str, child: Arc<Node>) -> FsResult<()> {
        let now = SystemTime::now();
        let replaced = {
            let mut state = self.state.write();
            let replaced = state.body.children_mut()?.insert(name.to_string(), Arc::clone(&child));
            state.attr.mtime = now;
            state.attr.ctime = now;
            replaced
        };

        match replaced {
            Some(old) if Arc::ptr_eq(&old, &child) => return Ok(()),
            Some(old) => old.adjust_nlink(-1, now),
            None => {}
        }
        child.adjust_nlink(1, now);
        Ok(())
    }

    fn unlink_child(&self, name: &str) -> FsResult<Arc<Node>> {
        let now = SystemTime::now();
        let removed = {
            let mut state = self.state.write();
            let removed = state.body.children_mut()?.remove(name).ok_or(FsError::NotFound)?;
            state.attr.mtime = now;
            state.attr.ctime = now;
            removed
        };
        removed.adjust_nlink(-1, now);
        Ok(removed)
    }

    /// Create a child directory
    pub fn mkdir(&self, name: &str, mode: u32) -> FsResult<Arc<Node>> {
        self.ensure_dir()?;
        let child = Node::new(Some(self), NodeKind::Directory, mode);
        self.link_child(name, Arc::clone(&child))?;
        debug!(parent = %self.id(), node = %child.id(), entry = name, mode, "mkdir");
        Ok(child)
    }

    /// Remove the entry `name`
    pub fn unlink(&self, name: &str) -> FsResult<()> {
        let removed = self.unlink_child(name)?;
        debug!(parent = %self.id(), node = %removed.id(), entry = name, "unlink");
        Ok(())
    }

    /// Remove the entry `name`; directories are removed whether or not they
    /// are empty
    pub fn rmdir(&self, name: &str) -> FsResult<()> {
        self.unlink(name)
    }

    /// Create a symbolic link whose content is `target`
    pub fn symlink(&self, name: &str, target: &str) -> FsResult<Arc<Node>> {
        self.ensure_dir()?;
        let child = Node::new(Some(self), NodeKind::Symlink, 0o777);
        {
            let mut state = child.state.write();
            state.body = NodeBody::Symlink {
                target: target.as_bytes().to_vec(),
            };
            state.attr.size = target.len() as u64;
        }
        self.link_child(name, Arc::clone(&child))?;
        debug!(parent = %self.id(), node = %child.id(), entry = name, link_target = target, "symlink");
        Ok(child)
    }

    /// Move the entry `old_name` to `new_name` in `new_parent`.
    ///
    /// An existing `new_name` is replaced, whatever it is. A missing
    /// `old_name` makes this a no-op.
    pub fn rename(&self, old_name: &str, new_parent: &Node, new_name: &str) -> FsResult<()> {
        new_parent.ensure_dir()?;
        let moved = match self.unlink_child(old_name) {
            Ok(moved) => moved,
            Err(FsError::NotFound) => {
                debug!(parent = %self.id(), old_name, "rename source missing");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        new_parent.link_child(new_name, Arc::clone(&moved))?;
        debug!(
            parent = %self.id(),
            new_parent = %new_parent.id(),
            node = %moved.id(),
            old_name,
            new_name,
            "rename"
        );
        Ok(())
    }

    /// Add a second name for `existing` in this directory
    pub fn link(&self, name: &str, existing: &Arc<Node>) -> FsResult<Arc<Node>> {
        self.link_child(name, Arc::clone(existing))?;
        debug!(parent = %self.id(), node = %existing.id(), entry = name, "link");
        Ok(Arc::clone(existing))
    }

    /// Create an empty regular file and open it
    pub fn create(&self, name: &str, flags: i32, mode: u32) -> FsResult<(OpenFile, Arc<Node>)> {
        self.ensure_dir()?;
        let child = Node::new(Some(self), NodeKind::RegularFile, mode);
        self.link_child(name, Arc::clone(&child))?;
        debug!(parent = %self.id(), node = %child.id(), entry = name, flags, "create");
        let file = child.open(flags)?;
        Ok((file, child))
    }

    fn ensure_dir(&self) -> FsResult<()> {
        if self.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotADirectory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{S_IFDIR, S_IFLNK, S_IFREG};

    fn root() -> Arc<Node> {
        Node::new(None, NodeKind::Directory, 0o755)
    }

    fn names(dir: &Node) -> Vec<String> {
        dir.entries().unwrap().into_iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn mkdir_forces_directory_type() {
        let root = root();
        let dir = root.mkdir("a", S_IFREG | 0o750).unwrap();

        assert_eq!(dir.getattr().mode, S_IFDIR | 0o750);
        assert!(Arc::ptr_eq(&root.lookup("a").unwrap(), &dir));
        assert_eq!(dir.getattr().nlink, 2);
    }

    #[test]
    fn unlink_missing_entry_is_not_found() {
        let root = root();
        assert_eq!(root.unlink("nope"), Err(FsError::NotFound));
        assert_eq!(root.rmdir("nope"), Err(FsError::NotFound));
    }

    #[test]
    fn rmdir_does_not_require_empty_directory() {
        let root = root();
        let dir = root.mkdir("a", 0o700).unwrap();
        dir.mkdir("b", 0o700).unwrap();

        root.rmdir("a").unwrap();
        assert_eq!(root.lookup("a").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn symlink_stores_target_as_content() {
        let root = root();
        let link = root.symlink("l", "/some/target").unwrap();

        let attr = link.getattr();
        assert_eq!(attr.mode, S_IFLNK | 0o777);
        assert_eq!(attr.size, "/some/target".len() as u64);
        assert_eq!(link.readlink().unwrap(), b"/some/target");
    }

    #[test]
    fn create_opens_an_empty_regular_file() {
        let root = root();
        let (file, node) = root.create("f", libc::O_RDWR, 0o600).unwrap();

        assert!(Arc::ptr_eq(file.node(), &node));
        assert_eq!(node.getattr().mode, S_IFREG | 0o600);
        assert_eq!(node.getattr().size, 0);
        assert_eq!(node.getattr().nlink, 1);
    }

    #[test]
    fn rename_within_directory() {
        let root = root();
        let node = root.mkdir("old", 0o700).unwrap();

        root.rename("old", &root, "new").unwrap();

        assert_eq!(names(&root), vec!["new".to_string()]);
        assert!(Arc::ptr_eq(&root.lookup("new").unwrap(), &node));
    }

    #[test]
    fn rename_onto_itself_keeps_entry() {
        let root = root();
        let node = root.mkdir("a", 0o700).unwrap();

        root.rename("a", &root, "a").unwrap();

        assert!(Arc::ptr_eq(&root.lookup("a").unwrap(), &node));
        assert_eq!(node.getattr().nlink, 2);
    }

    #[test]
    fn rename_overwrites_non_empty_directory() {
        let root = root();
        let src = root.mkdir("src", 0o700).unwrap();
        let dst = root.mkdir("dst", 0o700).unwrap();
        dst.mkdir("inner", 0o700).unwrap();

        root.rename("src", &root, "dst").unwrap();

        assert!(Arc::ptr_eq(&root.lookup("dst").unwrap(), &src));
        assert_eq!(names(&root), vec!["dst".to_string()]);
    }

    #[test]
    fn rename_missing_source_is_a_no_op() {
        let root = root();
        let existing = root.mkdir("dst", 0o700).unwrap();

        root.rename("missing", &root, "dst").unwrap();

        assert!(Arc::ptr_eq(&root.lookup("dst").unwrap(), &existing));
    }

    #[test]
    fn link_shares_the_node_and_counts_names() {
        let root = root();
        let (_, file) = root.create("f", 0, 0o644).unwrap();
        let dir = root.mkdir("d", 0o755).unwrap();

        let linked = dir.link("g", &file).unwrap();

        assert!(Arc::ptr_eq(&linked, &file));
        assert_eq!(file.getattr().nlink, 2);
        root.unlink("f").unwrap();
        assert_eq!(file.getattr().nlink, 1);
        assert!(Arc::ptr_eq(&dir.lookup("g").unwrap(), &file));
    }

    #[test]
    fn tree_operations_require_a_directory() {
        let root = root();
        let (_, file) = root.create("f", 0, 0o644).unwrap();

        assert_eq!(file.mkdir("x", 0o700).unwrap_err(), FsError::NotADirectory);
        assert_eq!(file.unlink("x").unwrap_err(), FsError::NotADirectory);
        assert_eq!(file.lookup("x").unwrap_err(), FsError::NotADirectory);
        assert_eq!(root.rename("f", &file, "x").unwrap_err(), FsError::NotADirectory);
        assert!(root.lookup("f").is_ok());
    }

    #[test]
    fn entry_changes_touch_directory_times() {
        let root = root();
        let before = root.getattr();
        std::thread::sleep(std::time::Duration::from_millis(5));

        root.mkdir("a", 0o700).unwrap();

        let after = root.getattr();
        assert!(after.mtime > before.mtime);
        assert!(after.ctime > before.ctime);
        assert_eq!(after.atime, before.atime);
    }
}

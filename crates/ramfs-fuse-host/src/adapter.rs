// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RamFS FUSE adapter implementation
//!
//! Maps FUSE operations onto the in-memory node tree. Inode numbers are node
//! ids; the root node is always the first node of its filesystem, so it
//! lands on `FUSE_ROOT_ID`.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyIoctl, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::{c_int, EBADF, EINVAL, ENOENT};
use ramfs_core::{Attributes, FileHandle, FsConfig, FsError, Node, NodeKind, RamFs};
use tracing::{debug, info, warn};

use crate::errno_for;

/// Block size reported in attributes and statfs
const BLOCK_SIZE: u32 = 512;

/// Maximum single path component length
const NAME_MAX: u32 = 255;

/// A node the kernel holds a reference to
struct InodeEntry {
    node: Arc<Node>,
    /// Outstanding kernel lookups; the entry is dropped on FORGET once zero
    lookups: u64,
}

/// RamFS FUSE filesystem adapter
pub struct RamFsFuse {
    fs: RamFs,
    /// TTL for attribute cache responses
    attr_ttl: Duration,
    /// TTL for directory entry cache responses
    entry_ttl: Duration,
    /// Nodes known to the kernel, by inode number
    inodes: HashMap<u64, InodeEntry>,
    /// Open file handles, by fh
    handles: HashMap<u64, Box<dyn FileHandle>>,
    next_fh: u64,
    /// Notified when the session ends
    on_destroy: Option<Sender<()>>,
}

impl RamFsFuse {
    pub fn new(fs: RamFs, config: &FsConfig) -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(
            FUSE_ROOT_ID,
            InodeEntry {
                node: Arc::clone(fs.root()),
                lookups: 1,
            },
        );

        Self {
            fs,
            attr_ttl: Duration::from_millis(config.cache.attr_ttl_ms),
            entry_ttl: Duration::from_millis(config.cache.entry_ttl_ms),
            inodes,
            handles: HashMap::new(),
            next_fh: 1,
            on_destroy: None,
        }
    }

    /// Send on `tx` when the kernel tears the session down
    pub fn notify_on_destroy(mut self, tx: Sender<()>) -> Self {
        self.on_destroy = Some(tx);
        self
    }

    fn ino_of(&self, node: &Node) -> u64 {
        if node.id() == self.fs.root_id() {
            FUSE_ROOT_ID
        } else {
            node.id().as_u64()
        }
    }

    fn node(&self, ino: u64) -> Result<Arc<Node>, c_int> {
        self.inodes.get(&ino).map(|entry| Arc::clone(&entry.node)).ok_or(ENOENT)
    }

    fn handle(&self, fh: u64) -> Result<&dyn FileHandle, c_int> {
        self.handles.get(&fh).map(|handle| handle.as_ref()).ok_or(EBADF)
    }

    /// Record a kernel lookup of `node` and return its FUSE attributes
    fn remember(&mut self, node: &Arc<Node>) -> FileAttr {
        let ino = self.ino_of(node);
        self.inodes
            .entry(ino)
            .and_modify(|entry| entry.lookups += 1)
            .or_insert_with(|| InodeEntry {
                node: Arc::clone(node),
                lookups: 1,
            });
        attr_to_fuse(&node.getattr(), ino)
    }

    fn forget_inode(&mut self, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        if let Some(entry) = self.inodes.get_mut(&ino) {
            entry.lookups = entry.lookups.saturating_sub(nlookup);
            if entry.lookups == 0 {
                // The tree keeps the node; only the kernel's reference goes
                self.inodes.remove(&ino);
            }
        }
    }

    fn insert_handle(&mut self, handle: Box<dyn FileHandle>) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, handle);
        fh
    }

    fn directory(&self, parent: u64) -> Result<Arc<Node>, c_int> {
        let dir = self.node(parent)?;
        if !dir.is_dir() {
            return Err(errno_for(FsError::NotADirectory));
        }
        Ok(dir)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &self,
        ino: u64,
        fh: Option<u64>,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<Attributes, c_int> {
        let node = self.node(ino)?;
        // Content changes go through the open handle when the kernel names one
        let handle = fh.and_then(|fh| self.handles.get(&fh)).map(|handle| handle.as_ref());

        if let Some(size) = size {
            let truncated = match handle {
                Some(handle) => handle.truncate(size),
                None => node.truncate(size),
            };
            truncated.map_err(errno_for)?;
        }
        if let Some(mode) = mode {
            node.chmod(mode);
        }
        if uid.is_some() || gid.is_some() {
            let current = node.getattr();
            node.chown(uid.unwrap_or(current.uid), gid.unwrap_or(current.gid));
        }
        if atime.is_some() || mtime.is_some() {
            node.utimens(atime.map(resolve_time), mtime.map(resolve_time));
        }
        Ok(node.getattr())
    }
}

fn resolve_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn entry_name(name: &OsStr) -> Result<&str, c_int> {
    name.to_str().ok_or(EINVAL)
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::RegularFile => FileType::RegularFile,
        NodeKind::Symlink => FileType::Symlink,
    }
}

/// Convert core attributes to FUSE attributes
fn attr_to_fuse(attr: &Attributes, ino: u64) -> FileAttr {
    let kind = attr.kind().map(file_type).unwrap_or(FileType::RegularFile);
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind,
        perm: attr.permissions() as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

impl fuser::Filesystem for RamFsFuse {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        info!(
            attr_ttl_ms = self.attr_ttl.as_millis() as u64,
            entry_ttl_ms = self.entry_ttl.as_millis() as u64,
            "RamFS FUSE adapter initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!(open_handles = self.handles.len(), "RamFS FUSE adapter destroyed");
        self.handles.clear();
        if let Some(tx) = self.on_destroy.take() {
            let _ = tx.send(());
        }
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let found = self
            .node(parent)
            .and_then(|dir| dir.lookup(entry_name(name)?).map_err(errno_for));
        match found {
            Ok(node) => {
                let attr = self.remember(&node);
                reply.entry(&self.entry_ttl, &attr, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.forget_inode(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let attr = match fh.and_then(|fh| self.handles.get(&fh)) {
            Some(handle) => handle.getattr().map_err(errno_for),
            None => self.node(ino).map(|node| node.getattr()),
        };
        match attr {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr_to_fuse(&attr, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.apply_setattr(ino, fh, mode, uid, gid, size, atime, mtime) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr_to_fuse(&attr, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.node(ino).and_then(|node| node.readlink().map_err(errno_for)) {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let created = self
            .directory(parent)
            .and_then(|dir| dir.mkdir(entry_name(name)?, mode & !umask).map_err(errno_for));
        match created {
            Ok(node) => {
                let attr = self.remember(&node);
                reply.entry(&self.entry_ttl, &attr, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self
            .directory(parent)
            .and_then(|dir| dir.unlink(entry_name(name)?).map_err(errno_for))
        {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self
            .directory(parent)
            .and_then(|dir| dir.rmdir(entry_name(name)?).map_err(errno_for))
        {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let created = self.directory(parent).and_then(|dir| {
            let target = target.to_str().ok_or(EINVAL)?;
            dir.symlink(entry_name(link_name)?, target).map_err(errno_for)
        });
        match created {
            Ok(node) => {
                let attr = self.remember(&node);
                reply.entry(&self.entry_ttl, &attr, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 {
            // RENAME_NOREPLACE / RENAME_EXCHANGE are not modeled
            reply.error(EINVAL);
            return;
        }
        let result = self.directory(parent).and_then(|dir| {
            let new_dir = self.node(newparent)?;
            dir.rename(entry_name(name)?, &new_dir, entry_name(newname)?)
                .map_err(errno_for)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let linked = self.node(ino).and_then(|existing| {
            let dir = self.directory(newparent)?;
            dir.link(entry_name(newname)?, &existing).map_err(errno_for)
        });
        match linked {
            Ok(node) => {
                let attr = self.remember(&node);
                reply.entry(&self.entry_ttl, &attr, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.node(ino).and_then(|node| node.open(flags).map_err(errno_for)) {
            Ok(file) => {
                let fh = self.insert_handle(Box::new(file));
                debug!(ino, fh, flags, "open");
                reply.opened(fh, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        let handle = match self.handle(fh) {
            Ok(handle) => handle,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match handle.read(offset) {
            Ok(view) => {
                let len = view.len().min(size as usize);
                reply.data(&view[..len]);
            }
            Err(err) => reply.error(errno_for(err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        match self.handle(fh).and_then(|handle| handle.write(offset, data).map_err(errno_for)) {
            Ok(written) => reply.written(written),
            Err(errno) => reply.error(errno),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.handle(fh).and_then(|handle| handle.flush().map_err(errno_for)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.handles.remove(&fh) {
            Some(handle) => {
                handle.release();
                reply.ok();
            }
            None => reply.error(EBADF),
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        match self.handle(fh).and_then(|handle| handle.fsync(datasync).map_err(errno_for)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.directory(ino) {
            Ok(_) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.node(ino).and_then(|dir| dir.entries().map_err(errno_for)) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        // Nodes do not know their parent; ".." reports the directory itself
        let mut listing = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        listing.extend(
            entries
                .into_iter()
                .map(|(name, child)| (self.ino_of(&child), file_type(child.kind()), name)),
        );

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (entry_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats = self.fs.stats();
        reply.statfs(
            stats.bytes_in_memory.div_ceil(u64::from(BLOCK_SIZE)),
            0,
            0,
            stats.reachable_nodes,
            0,
            BLOCK_SIZE,
            NAME_MAX,
            BLOCK_SIZE,
        );
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let created = self.directory(parent).and_then(|dir| {
            dir.create(entry_name(name)?, flags, mode & !umask).map_err(errno_for)
        });
        match created {
            Ok((file, node)) => {
                let fh = self.insert_handle(Box::new(file));
                let attr = self.remember(&node);
                reply.created(&self.entry_ttl, &attr, 0, fh, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn fallocate(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        let result = self.handle(fh).and_then(|handle| {
            handle
                .allocate(offset.max(0) as u64, length.max(0) as u64, mode)
                .map_err(errno_for)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn ioctl(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: u32,
        cmd: u32,
        in_data: &[u8],
        _out_size: u32,
        reply: ReplyIoctl,
    ) {
        match self.handle(fh).and_then(|handle| handle.ioctl(cmd, in_data).map_err(errno_for)) {
            Ok(out) => reply.ioctl(0, &out),
            Err(errno) => {
                warn!(ino, cmd, errno, "ioctl rejected");
                reply.error(errno);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramfs_core::{S_IFDIR, S_IFREG};

    fn adapter() -> RamFsFuse {
        RamFsFuse::new(RamFs::new(Some(1000), Some(1000)), &FsConfig::default())
    }

    #[test]
    fn cache_ttls_follow_config() {
        let mut config = FsConfig::default();
        config.cache.attr_ttl_ms = 1500;
        config.cache.entry_ttl_ms = 2500;

        let fuse = RamFsFuse::new(RamFs::new(Some(0), Some(0)), &config);
        assert_eq!(fuse.attr_ttl, Duration::from_millis(1500));
        assert_eq!(fuse.entry_ttl, Duration::from_millis(2500));
    }

    #[test]
    fn root_is_fuse_root_inode() {
        let fuse = adapter();
        let root = fuse.node(FUSE_ROOT_ID).expect("root inode");
        assert!(Arc::ptr_eq(&root, fuse.fs.root()));
        assert_eq!(fuse.ino_of(&root), FUSE_ROOT_ID);
    }

    #[test]
    fn forget_drops_inode_but_keeps_tree() {
        let mut fuse = adapter();
        let dir = fuse.fs.root().mkdir("d", 0o755).unwrap();

        let attr = fuse.remember(&dir);
        fuse.remember(&dir);
        assert_eq!(fuse.inodes[&attr.ino].lookups, 2);

        fuse.forget_inode(attr.ino, 1);
        assert!(fuse.node(attr.ino).is_ok());
        fuse.forget_inode(attr.ino, 1);
        assert_eq!(fuse.node(attr.ino).unwrap_err(), ENOENT);

        assert!(fuse.fs.root().lookup("d").is_ok());
    }

    #[test]
    fn forget_never_drops_root() {
        let mut fuse = adapter();
        fuse.forget_inode(FUSE_ROOT_ID, 100);
        assert!(fuse.node(FUSE_ROOT_ID).is_ok());
    }

    #[test]
    fn attr_conversion_splits_type_and_permissions() {
        let fuse = adapter();
        let (_, file) = fuse.fs.root().create("f", 0, 0o640).unwrap();
        file.write(0, &[0u8; 513]).unwrap();

        let attr = attr_to_fuse(&file.getattr(), 7);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.blocks, 2);
        assert_eq!((attr.uid, attr.gid), (1000, 1000));

        let root_attr = attr_to_fuse(&fuse.fs.root().getattr(), FUSE_ROOT_ID);
        assert_eq!(root_attr.kind, FileType::Directory);
        assert_eq!(root_attr.perm, 0o700);
        assert_eq!(root_attr.nlink, 2);
    }

    #[test]
    fn unlinked_open_file_reports_zero_links() {
        let fuse = adapter();
        let (handle, file) = fuse.fs.root().create("f", libc::O_RDWR, 0o644).unwrap();
        fuse.fs.root().unlink("f").unwrap();

        let attr = attr_to_fuse(&handle.getattr().unwrap(), 7);
        assert_eq!(attr.nlink, 0);
        assert_eq!(file.getattr().nlink, 0);
    }

    #[test]
    fn setattr_through_handle_truncates_and_updates_mode() {
        let mut fuse = adapter();
        let (file, node) = fuse.fs.root().create("f", libc::O_RDWR, 0o644).unwrap();
        node.write(0, b"abcdef").unwrap();
        let fh = fuse.insert_handle(Box::new(file));
        let ino = fuse.remember(&node).ino;

        let attr = fuse
            .apply_setattr(ino, Some(fh), Some(0o600), None, Some(42), Some(2), None, None)
            .unwrap();

        assert_eq!(attr.size, 2);
        assert_eq!(attr.mode, S_IFREG | 0o600);
        assert_eq!((attr.uid, attr.gid), (1000, 42));
        assert_eq!(&*node.read(0), b"ab");
    }

    #[test]
    fn setattr_size_on_directory_is_rejected() {
        let fuse = adapter();
        let err = fuse
            .apply_setattr(FUSE_ROOT_ID, None, None, None, None, Some(0), None, None)
            .unwrap_err();
        assert_eq!(err, libc::EISDIR);
        assert_eq!(fuse.fs.root().getattr().mode, S_IFDIR | 0o700);
    }

    #[test]
    fn unknown_handle_is_bad_descriptor() {
        let fuse = adapter();
        assert_eq!(fuse.handle(99).err(), Some(EBADF));
    }
}

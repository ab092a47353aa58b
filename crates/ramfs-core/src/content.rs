// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File content and attribute operations

use std::time::SystemTime;

use parking_lot::{MappedRwLockReadGuard, RwLockReadGuard};
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::node::Node;
use crate::types::{MAX_FILE_SIZE, PERMISSION_MASK};

/// Borrowed view of a node's content, valid while the guard is held
pub type ContentView<'a> = MappedRwLockReadGuard<'a, [u8]>;

/// Byte length of a buffer that must stay within `MAX_FILE_SIZE`
fn checked_len(len: u64) -> FsResult<usize> {
    if len > MAX_FILE_SIZE {
        return Err(FsError::IoLimitExceeded);
    }
    usize::try_from(len).map_err(|_| FsError::IoLimitExceeded)
}

impl Node {
    /// Content from `offset` to the end. Offsets past the end yield an
    /// empty view.
    pub fn read(&self, offset: u64) -> ContentView<'_> {
        RwLockReadGuard::map(self.state.read(), |state| {
            let content = state.body.content();
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(content.len());
            &content[start..]
        })
    }

    /// Copy `data` in at `offset`, growing the buffer and zero-filling any
    /// gap past the old end.
    pub fn write(&self, offset: u64, data: &[u8]) -> FsResult<u32> {
        let end = offset.checked_add(data.len() as u64).ok_or(FsError::IoLimitExceeded)?;
        let (start, end) = match (checked_len(offset), checked_len(end)) {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                warn!(node = %self.id(), offset, len = data.len(), "write beyond maximum file size");
                return Err(FsError::IoLimitExceeded);
            }
        };
        let written = u32::try_from(data.len()).map_err(|_| FsError::IoLimitExceeded)?;

        let mut state = self.state.write();
        let content = state.body.content_mut()?;
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        let size = content.len() as u64;

        let now = SystemTime::now();
        state.attr.size = size;
        state.attr.mtime = now;
        state.attr.ctime = now;
        debug!(node = %self.id(), offset, written, size, "write");
        Ok(written)
    }

    /// Set the content length to `size`, zero-filling when growing
    pub fn truncate(&self, size: u64) -> FsResult<()> {
        let new_len = checked_len(size).map_err(|err| {
            warn!(node = %self.id(), size, "truncate beyond maximum file size");
            err
        })?;

        let mut state = self.state.write();
        let content = state.body.content_mut()?;
        content.resize(new_len, 0);

        let now = SystemTime::now();
        state.attr.size = size;
        state.attr.mtime = now;
        state.attr.ctime = now;
        debug!(node = %self.id(), size, "truncate");
        Ok(())
    }

    /// Set access and modification times; `None` leaves a time unchanged.
    /// The change time is always refreshed.
    pub fn utimens(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) {
        let mut state = self.state.write();
        state.attr.set_times(atime, mtime, Some(SystemTime::now()));
    }

    /// Replace the permission bits, keeping the type bits
    pub fn chmod(&self, perms: u32) {
        let mut state = self.state.write();
        state.attr.mode = (state.attr.mode & !PERMISSION_MASK) | (perms & PERMISSION_MASK);
        state.attr.set_times(None, None, Some(SystemTime::now()));
        debug!(node = %self.id(), mode = state.attr.mode, "chmod");
    }

    pub fn chown(&self, uid: u32, gid: u32) {
        let mut state = self.state.write();
        state.attr.uid = uid;
        state.attr.gid = gid;
        state.attr.set_times(None, None, Some(SystemTime::now()));
        debug!(node = %self.id(), uid, gid, "chown");
    }
}

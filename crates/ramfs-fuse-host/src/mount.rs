// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount lifecycle

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::Context;
use fuser::{BackgroundSession, MountOption};
use ramfs_core::{FsConfig, RamFs};
use tracing::info;

use crate::adapter::RamFsFuse;

/// Kernel-facing mount options
#[derive(Clone, Debug, Default)]
pub struct MountOptions {
    pub allow_other: bool,
    pub allow_root: bool,
    pub auto_unmount: bool,
}

impl MountOptions {
    fn to_fuser(&self, fs_name: &str) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(fs_name.to_string()),
            MountOption::Subtype("ramfs".to_string()),
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.allow_root {
            options.push(MountOption::AllowRoot);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// A mounted filesystem served from a background session thread
pub struct MountedFs {
    session: BackgroundSession,
    mountpoint: PathBuf,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

/// Mount `fs` at `mountpoint`, creating the directory (mode 0700) when it
/// does not exist. Returns once the kernel mount is in place.
pub fn mount(
    fs: RamFs,
    config: &FsConfig,
    mountpoint: &Path,
    options: &MountOptions,
) -> anyhow::Result<MountedFs> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(mountpoint)
        .with_context(|| format!("creating mount point {}", mountpoint.display()))?;

    let (stop_tx, stop_rx) = mpsc::channel();
    let filesystem = RamFsFuse::new(fs, config).notify_on_destroy(stop_tx.clone());
    let session = fuser::spawn_mount2(filesystem, mountpoint, &options.to_fuser(&config.fs_name))
        .with_context(|| format!("mounting at {}", mountpoint.display()))?;

    info!(mountpoint = %mountpoint.display(), fs_name = %config.fs_name, "mounted");
    Ok(MountedFs {
        session,
        mountpoint: mountpoint.to_path_buf(),
        stop_tx,
        stop_rx,
    })
}

impl MountedFs {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// A sender that wakes `wait`
    pub fn stop_handle(&self) -> Sender<()> {
        self.stop_tx.clone()
    }

    /// Block until the kernel ends the session (external unmount) or a stop
    /// handle fires
    pub fn wait(&self) {
        let _ = self.stop_rx.recv();
    }

    /// Unmount and join the session thread
    pub fn unmount(self) {
        let MountedFs {
            session, mountpoint, ..
        } = self;
        session.join();
        info!(mountpoint = %mountpoint.display(), "unmounted");
    }
}

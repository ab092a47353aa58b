// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RamFS FUSE Host: kernel transport for the in-memory filesystem
//!
//! The adapter and mount lifecycle need the `fuse` feature on Linux; errno
//! mapping, configuration loading and logging are always available.

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub mod adapter;
pub mod logging;
#[cfg(all(feature = "fuse", target_os = "linux"))]
pub mod mount;

use std::fs;
use std::path::Path;

use anyhow::Context;
use libc::{c_int, EINVAL, EIO, EISDIR, ENOENT, ENOSYS, ENOTDIR};
use ramfs_core::{FsConfig, FsError};

/// Kernel error code reported for a core error
pub fn errno_for(err: FsError) -> c_int {
    match err {
        FsError::NotFound => ENOENT,
        FsError::IoLimitExceeded => EIO,
        FsError::Unsupported => ENOSYS,
        FsError::NotADirectory => ENOTDIR,
        FsError::IsADirectory => EISDIR,
        FsError::InvalidArgument => EINVAL,
    }
}

/// Read a JSON configuration file, or return the defaults when no path is
/// given
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<FsConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: FsConfig = serde_json::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(config)
        }
        None => Ok(FsConfig::default()),
    }
}

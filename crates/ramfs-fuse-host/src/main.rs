// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! RamFS FUSE Host: mounts an in-memory filesystem
//!
//! The filesystem lives for as long as the process; its contents are gone
//! once it is unmounted.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ramfs_core::{FsConfig, RamFs};
use ramfs_fuse_host::load_config;
use ramfs_fuse_host::logging::LoggingArgs;
use tracing::info;

#[derive(Parser)]
#[command(name = "ramfs-fuse-host", about = "Mount an in-memory filesystem via FUSE")]
struct Args {
    /// Mount point for the filesystem (created with mode 0700 if missing)
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Owner uid of the root directory (default: current user)
    #[arg(long)]
    uid: Option<u32>,

    /// Owner gid of the root directory (default: current group)
    #[arg(long)]
    gid: Option<u32>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    #[command(flatten)]
    logging: LoggingArgs,
}

fn resolve_config(args: &Args) -> Result<FsConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if args.uid.is_some() {
        config.default_uid = args.uid;
    }
    if args.gid.is_some() {
        config.default_gid = args.gid;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.init("ramfs-fuse-host")?;

    info!(mount_point = %args.mount_point.display(), "Starting RamFS FUSE Host");
    let config = resolve_config(&args)?;
    info!(?config, "Configuration loaded");

    let fs = RamFs::from_config(&config);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        use nix::sys::signal::{SigSet, Signal};
        use ramfs_fuse_host::mount::{mount, MountOptions};

        // Block before any thread is spawned so only the waiter sees them
        let mut signals = SigSet::empty();
        signals.add(Signal::SIGINT);
        signals.add(Signal::SIGTERM);
        signals.add(Signal::SIGHUP);
        signals.thread_block()?;

        let options = MountOptions {
            allow_other: args.allow_other,
            allow_root: args.allow_root,
            auto_unmount: args.auto_unmount,
        };
        let mounted = mount(fs, &config, &args.mount_point, &options)?;

        let stop = mounted.stop_handle();
        std::thread::spawn(move || {
            if let Ok(signal) = signals.wait() {
                info!(%signal, "Received signal; unmounting");
                let _ = stop.send(());
            }
        });

        info!("RamFS FUSE host mounted; blocking until unmount");
        mounted.wait();
        mounted.unmount();
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        tracing::warn!("FUSE support not compiled in. This binary is for testing only.");
        info!(stats = ?fs.stats(), "RamFS core initialized");
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}

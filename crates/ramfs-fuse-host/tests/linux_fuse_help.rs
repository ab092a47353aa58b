// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#![allow(clippy::disallowed_methods)]

#[cfg(target_os = "linux")]
mod linux_tests {
    use std::process::Command;

    #[test]
    fn fuse_host_binary_help_runs() {
        // Cargo builds the crate's binaries before its integration tests
        let bin_path = env!("CARGO_BIN_EXE_ramfs-fuse-host");

        // Running with --help should not attempt a mount and must succeed
        let output = Command::new(bin_path)
            .arg("--help")
            .output()
            .expect("able to execute ramfs-fuse-host");

        assert!(output.status.success(), "--help should succeed");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--auto-unmount"));
        assert!(stdout.contains("--log-format"));
    }

    #[test]
    fn fuse_host_binary_requires_mount_point() {
        let status = Command::new(env!("CARGO_BIN_EXE_ramfs-fuse-host"))
            .status()
            .expect("able to execute ramfs-fuse-host");

        assert!(!status.success(), "missing mount point should be rejected");
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration for a RamFS instance

use serde::{Deserialize, Serialize};

/// Kernel cache lifetimes handed out with FUSE replies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub attr_ttl_ms: u64,
    pub entry_ttl_ms: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}

/// Filesystem configuration
///
/// `default_uid`/`default_gid` own the root directory; `None` means the
/// identity of the current process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub default_uid: Option<u32>,
    pub default_gid: Option<u32>,
    pub fs_name: String,
    pub cache: CachePolicy,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            default_uid: None,
            default_gid: None,
            fs_name: "ramfs".to_string(),
            cache: CachePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: FsConfig =
            serde_json::from_str(r#"{ "default_uid": 1000, "cache": { "attr_ttl_ms": 250 } }"#)
                .unwrap();

        assert_eq!(config.default_uid, Some(1000));
        assert_eq!(config.default_gid, None);
        assert_eq!(config.fs_name, "ramfs");
        assert_eq!(config.cache.attr_ttl_ms, 250);
        assert_eq!(config.cache.entry_ttl_ms, 1000);
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{ClosePolicy, OnPageFail};

/// Engine-wide settings, injected at context initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit manager-module path, tried before the search directories.
    pub manager_path: Option<PathBuf>,
    /// Well-known directories searched for a manager module, in order.
    pub search_dirs: Vec<PathBuf>,
    /// Whether a legacy (protocol 1.x) manager module is acceptable when no
    /// current-generation module is found.
    pub allow_legacy_manager: bool,
    /// Maximum re-attempts of a failing page before the job terminates.
    pub max_page_retries: u32,
    /// What a page-level protocol failure does by default.
    pub on_page_fail: OnPageFail,
    /// How session/source close treats an in-flight transfer.
    pub close_policy: ClosePolicy,
    /// Entries kept in the error-history ring before the oldest drop off.
    pub error_history_capacity: usize,
    /// Ceiling for any single transfer-buffer allocation, in bytes.
    pub max_buffer_bytes: usize,
    /// Extra wait applied before transfer-ready for devices on the
    /// ready-delay quirk list, in milliseconds.
    pub ready_delay_ms: u64,
    /// Override file for the well-known capability table (embedded default
    /// used when absent).
    pub capability_table_path: Option<PathBuf>,
    /// Override file for the device-quirk lists (embedded default used when
    /// absent).
    pub quirk_lists_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manager_path: None,
            search_dirs: default_search_dirs(),
            allow_legacy_manager: true,
            max_page_retries: 3,
            on_page_fail: OnPageFail::Retry,
            close_policy: ClosePolicy::Graceful,
            error_history_capacity: 64,
            max_buffer_bytes: 64 * 1024 * 1024,
            ready_delay_ms: 500,
            capability_table_path: None,
            quirk_lists_path: None,
        }
    }
}

/// Fixed platform search order for the manager module.
fn default_search_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from(r"C:\Windows\System32"),
            PathBuf::from(r"C:\Windows\twain_64"),
            PathBuf::from(r"C:\Windows\twain_32"),
        ]
    }
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Library/Frameworks"),
            PathBuf::from("/usr/local/lib"),
        ]
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/local/lib"),
            PathBuf::from("/usr/lib"),
            PathBuf::from("/opt/scanner/lib"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(!cfg.search_dirs.is_empty());
        assert_eq!(cfg.max_page_retries, 3);
        assert_eq!(cfg.on_page_fail, OnPageFail::Retry);
        assert_eq!(cfg.close_policy, ClosePolicy::Graceful);
        assert!(cfg.error_history_capacity > 0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = EngineConfig {
            manager_path: Some(PathBuf::from("/tmp/manager.so")),
            max_page_retries: 7,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: EngineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.manager_path, cfg.manager_path);
        assert_eq!(back.max_page_retries, 7);
    }
}

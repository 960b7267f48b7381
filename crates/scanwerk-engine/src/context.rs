// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide engine context.
//
// Holds everything shared across sessions: configuration, the well-known
// capability table, the quirk lists, the thread-affinity registry, and the
// bounded error-history ring. Sessions themselves are thread-affine; the
// context is the one `Send + Sync` handle.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use tracing::{debug, info};

use scanwerk_core::config::EngineConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::ErrorRecord;

use crate::captable::CapabilityTable;
use crate::quirks::{DeviceQuirks, QuirkLists};

struct History {
    ring: VecDeque<ErrorRecord>,
    capacity: usize,
    last: Option<ErrorRecord>,
}

/// Shared engine state. Create once with [`EngineContext::init`] and hand an
/// `Arc` to every session.
pub struct EngineContext {
    config: EngineConfig,
    captable: CapabilityTable,
    quirks: QuirkLists,
    /// Which thread owns which session serial. One session per thread.
    threads: Mutex<HashMap<ThreadId, u64>>,
    next_serial: AtomicU64,
    history: Mutex<History>,
}

impl EngineContext {
    /// Build the context: load the capability table and quirk lists (the
    /// configured overrides, or the embedded defaults).
    pub fn init(config: EngineConfig) -> Result<std::sync::Arc<Self>> {
        let captable = match &config.capability_table_path {
            Some(path) => CapabilityTable::from_path(path)?,
            None => CapabilityTable::embedded(),
        };
        let quirks = match &config.quirk_lists_path {
            Some(path) => QuirkLists::from_path(path)?,
            None => QuirkLists::embedded(),
        };
        if config.error_history_capacity == 0 {
            return Err(ScanwerkError::Config(
                "error_history_capacity must be at least 1".into(),
            ));
        }
        info!(
            capabilities = captable.len(),
            history = config.error_history_capacity,
            "engine context initialized"
        );
        Ok(std::sync::Arc::new(Self {
            history: Mutex::new(History {
                ring: VecDeque::with_capacity(config.error_history_capacity),
                capacity: config.error_history_capacity,
                last: None,
            }),
            captable,
            quirks,
            threads: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
            config,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn captable(&self) -> &CapabilityTable {
        &self.captable
    }

    pub(crate) fn quirks_for(&self, product_name: &str) -> DeviceQuirks {
        let quirks = self.quirks.for_product(product_name);
        if quirks.any() {
            debug!(product = product_name, ?quirks, "quirk list match");
        }
        quirks
    }

    /// Claim the current thread for a new session.
    pub(crate) fn register_session(&self) -> Result<u64> {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        let tid = std::thread::current().id();
        if threads.contains_key(&tid) {
            return Err(ScanwerkError::SessionOpen(
                "this thread already owns an open session".into(),
            ));
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        threads.insert(tid, serial);
        Ok(serial)
    }

    pub(crate) fn unregister_session(&self, serial: u64) {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        threads.retain(|_, s| *s != serial);
    }

    /// Verify the caller is on the thread that opened the session.
    pub(crate) fn check_thread(&self, serial: u64) -> Result<()> {
        let threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        match threads.get(&std::thread::current().id()) {
            Some(s) if *s == serial => Ok(()),
            _ => Err(ScanwerkError::WrongThread),
        }
    }

    /// Append to the bounded error history, dropping the oldest entry once
    /// full.
    pub fn record_error(&self, record: ErrorRecord) {
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        if history.ring.len() == history.capacity {
            history.ring.pop_front();
        }
        history.last = Some(record.clone());
        history.ring.push_back(record);
    }

    /// The most recent failure, if any.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        history.last.clone()
    }

    /// Snapshot of the error history, oldest first.
    pub fn error_history(&self) -> Vec<ErrorRecord> {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        history.ring.iter().cloned().collect()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("capabilities", &self.captable.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scanwerk_core::types::{ConditionCode, ResultCode};

    fn record(op: &str) -> ErrorRecord {
        ErrorRecord {
            at: Utc::now(),
            result: ResultCode::Failure,
            condition: ConditionCode::PaperJam,
            operation: op.into(),
        }
    }

    #[test]
    fn history_ring_is_bounded() {
        let config = EngineConfig {
            error_history_capacity: 3,
            ..Default::default()
        };
        let ctx = EngineContext::init(config).expect("init");
        for i in 0..5 {
            ctx.record_error(record(&format!("op-{i}")));
        }
        let history = ctx.error_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].operation, "op-2");
        assert_eq!(ctx.last_error().expect("last").operation, "op-4");
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = EngineConfig {
            error_history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            EngineContext::init(config),
            Err(ScanwerkError::Config(_))
        ));
    }

    #[test]
    fn one_session_per_thread() {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        let serial = ctx.register_session().expect("first claim");
        assert!(matches!(
            ctx.register_session(),
            Err(ScanwerkError::SessionOpen(_))
        ));
        ctx.check_thread(serial).expect("owner thread passes");
        ctx.unregister_session(serial);
        ctx.register_session().expect("free again after release");
    }

    #[test]
    fn foreign_thread_rejected() {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        let serial = ctx.register_session().expect("claim");
        let ctx2 = std::sync::Arc::clone(&ctx);
        let outcome = std::thread::spawn(move || ctx2.check_thread(serial))
            .join()
            .expect("join");
        assert!(matches!(outcome, Err(ScanwerkError::WrongThread)));
    }
}

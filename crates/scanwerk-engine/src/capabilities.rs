// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability negotiation and the per-source cache.
//
// The cache stores verdicts and metadata, never values: values are live
// device state and always fetched fresh. A failed support probe lands in
// the negative cache so unsupported capabilities are asked about exactly
// once per connection. The cache dies with the connection.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    CapId, ConditionCode, ContainerKinds, ItemType, OpFlags, ResultCode,
};
use scanwerk_dsm::traits::{CapContainer, CapPayload};
use scanwerk_dsm::{Dat, Msg, Payload, Triplet};

use crate::source::Source;

/// Cached knowledge about one capability of one source.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub id: CapId,
    pub containers: ContainerKinds,
    pub item_type: ItemType,
    pub ops: OpFlags,
    /// Whether the verdict came from a device probe (vs the static table).
    pub tested: bool,
    pub supported: bool,
}

/// Per-source capability cache: positive entries plus a negative set.
#[derive(Debug, Default)]
pub struct CapCache {
    entries: HashMap<u16, CapabilityEntry>,
    negative: HashSet<u16>,
}

impl CapCache {
    pub fn get(&self, id: CapId) -> Option<&CapabilityEntry> {
        self.entries.get(&id.0)
    }

    pub fn is_negative(&self, id: CapId) -> bool {
        self.negative.contains(&id.0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.negative.clear();
    }

    fn insert(&mut self, entry: CapabilityEntry) {
        self.negative.remove(&entry.id.0);
        self.entries.insert(entry.id.0, entry);
    }

    fn mark_negative(&mut self, id: CapId) {
        self.entries.remove(&id.0);
        self.negative.insert(id.0);
    }
}

impl Source {
    /// Seed cache entries for `ids` without touching the device. Known ids
    /// come from the well-known table; anything else is treated as
    /// vendor/custom and gets a minimal best-effort row.
    pub fn ensure_cached(&mut self, ids: &[CapId]) {
        for &id in ids {
            if self.cache.get(id).is_some() || self.cache.is_negative(id) {
                continue;
            }
            let entry = match self.ctx.captable().get(id) {
                Some(row) => CapabilityEntry {
                    id,
                    containers: row.containers,
                    item_type: row.item_type,
                    ops: row.ops,
                    tested: false,
                    supported: true,
                },
                None => CapabilityEntry {
                    id,
                    containers: ContainerKinds(ContainerKinds::ONE_VALUE),
                    item_type: ItemType::U32,
                    ops: OpFlags::FULL,
                    tested: false,
                    supported: true,
                },
            };
            self.cache.insert(entry);
        }
    }

    /// Whether the source supports a capability.
    ///
    /// Returns the cached verdict when one exists. With `retest`, an
    /// untested entry is settled by a single query-support probe; without
    /// it, an unknown capability is reported unsupported and nothing is
    /// cached.
    pub fn is_supported(&mut self, id: CapId, retest: bool) -> Result<bool> {
        if self.cache.is_negative(id) {
            return Ok(false);
        }
        if let Some(entry) = self.cache.get(id) {
            if entry.tested || !retest {
                return Ok(entry.supported);
            }
        } else if !retest {
            return Ok(false);
        }

        let mut payload = Payload::Capability(CapPayload::get(id));
        let triplet = Triplet::control(Dat::Capability, Msg::QuerySupport);
        match self.call(triplet, &mut payload) {
            Ok(rc) if rc.is_success() => {
                let ops = match &payload {
                    Payload::Capability(cap) => cap
                        .container
                        .as_ref()
                        .and_then(CapContainer::current)
                        .map(|v| OpFlags(v as u16))
                        .unwrap_or(OpFlags::GET_ONLY),
                    _ => OpFlags::GET_ONLY,
                };
                let seeded = self.cache.get(id);
                let entry = CapabilityEntry {
                    id,
                    containers: seeded
                        .map(|e| e.containers)
                        .unwrap_or(ContainerKinds(ContainerKinds::ONE_VALUE)),
                    item_type: seeded.map(|e| e.item_type).unwrap_or(ItemType::U32),
                    ops,
                    tested: true,
                    supported: true,
                };
                debug!(cap = %id, ops = ops.0, "capability probe: supported");
                self.cache.insert(entry);
                Ok(true)
            }
            Ok(_) | Err(ScanwerkError::Protocol { .. }) => {
                debug!(cap = %id, "capability probe: unsupported");
                self.cache.mark_negative(id);
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Current value of a numeric capability, fetched live.
    pub fn get_u32(&mut self, id: CapId) -> Result<u32> {
        if self.cache.is_negative(id) {
            return Err(ScanwerkError::CapabilityUnsupported { cap: id.0 });
        }
        let mut payload = Payload::Capability(CapPayload::get(id));
        self.call(Triplet::control(Dat::Capability, Msg::GetCurrent), &mut payload)
            .map_err(|e| cap_error(id, e))?;
        match payload {
            Payload::Capability(cap) => cap
                .container
                .as_ref()
                .and_then(CapContainer::current)
                .ok_or_else(|| ScanwerkError::CapabilityOperation {
                    cap: id.0,
                    detail: "no current value in returned container".into(),
                }),
            other => Err(ScanwerkError::Misuse(format!(
                "capability get returned {} payload",
                other.kind()
            ))),
        }
    }

    /// Set a numeric capability. `CheckStatus` means the device clamped the
    /// value; that is success, and callers who care re-read the current
    /// value.
    pub fn set_u32(&mut self, id: CapId, value: u32) -> Result<()> {
        if self.cache.is_negative(id) {
            return Err(ScanwerkError::CapabilityUnsupported { cap: id.0 });
        }
        let item_type = self
            .cache
            .get(id)
            .map(|e| e.item_type)
            .unwrap_or(ItemType::U32);
        let mut payload = Payload::Capability(CapPayload::set_u32(id, item_type, value));
        let rc = self
            .call(Triplet::control(Dat::Capability, Msg::Set), &mut payload)
            .map_err(|e| cap_error(id, e))?;
        if rc == ResultCode::CheckStatus {
            debug!(cap = %id, value, "set accepted with clamping");
        }
        Ok(())
    }

    /// Return a capability to its device default.
    pub fn reset_capability(&mut self, id: CapId) -> Result<()> {
        if self.cache.is_negative(id) {
            return Err(ScanwerkError::CapabilityUnsupported { cap: id.0 });
        }
        let mut payload = Payload::Capability(CapPayload::get(id));
        self.call(Triplet::control(Dat::Capability, Msg::Reset), &mut payload)
            .map_err(|e| cap_error(id, e))?;
        Ok(())
    }
}

/// Map a protocol failure on a capability triplet to the capability-shaped
/// error the caller can act on.
fn cap_error(id: CapId, err: ScanwerkError) -> ScanwerkError {
    match err {
        ScanwerkError::Protocol {
            condition: ConditionCode::CapUnsupported,
            ..
        } => ScanwerkError::CapabilityUnsupported { cap: id.0 },
        ScanwerkError::Protocol {
            condition: ConditionCode::CapBadOperation,
            detail,
        } => ScanwerkError::CapabilityOperation { cap: id.0, detail },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::context::EngineContext;
    use crate::session::Session;
    use scanwerk_core::config::EngineConfig;
    use scanwerk_core::types::{AppIdentity, SourceState};
    use scanwerk_dsm::stub::StubManager;

    fn app() -> AppIdentity {
        AppIdentity::new("Scanwerk", "Engine", "CapTest")
    }

    fn session(stub: Arc<StubManager>) -> Session {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        Session::open_with(ctx, stub, app()).expect("session")
    }

    #[test]
    fn probe_verdict_is_cached() {
        let stub = Arc::new(StubManager::new());
        let mut session = session(Arc::clone(&stub));
        let source = session.open_default().expect("open");
        let baseline = stub.capability_calls();

        assert!(source.is_supported(CapId::XFER_COUNT, true).expect("probe"));
        assert_eq!(stub.capability_calls(), baseline + 1);
        // Second and third asks hit the cache.
        assert!(source.is_supported(CapId::XFER_COUNT, true).expect("cached"));
        assert!(source.is_supported(CapId::XFER_COUNT, false).expect("cached"));
        assert_eq!(stub.capability_calls(), baseline + 1);
    }

    #[test]
    fn failed_probe_lands_in_negative_cache() {
        let stub = Arc::new(StubManager::new().without_capability(CapId::UNITS));
        let mut session = session(Arc::clone(&stub));
        let source = session.open_default().expect("open");
        let baseline = stub.capability_calls();

        assert!(!source.is_supported(CapId::UNITS, true).expect("probe"));
        assert_eq!(stub.capability_calls(), baseline + 1);
        // The device is never asked about it again.
        assert!(!source.is_supported(CapId::UNITS, true).expect("cached"));
        assert_eq!(stub.capability_calls(), baseline + 1);
        // And value operations short-circuit on the negative entry.
        assert!(matches!(
            source.get_u32(CapId::UNITS),
            Err(ScanwerkError::CapabilityUnsupported { cap }) if cap == CapId::UNITS.0
        ));
        assert_eq!(stub.capability_calls(), baseline + 1);
    }

    #[test]
    fn untested_without_retest_reports_unsupported_silently() {
        let stub = Arc::new(StubManager::new());
        let mut session = session(Arc::clone(&stub));
        let source = session.open_default().expect("open");
        let baseline = stub.capability_calls();

        let custom = CapId(0x8123);
        assert!(!source.is_supported(custom, false).expect("no probe"));
        assert_eq!(stub.capability_calls(), baseline);
        // Nothing was cached either way.
        assert!(!source.cache.is_negative(custom));
        assert!(source.cache.get(custom).is_none());
    }

    #[test]
    fn set_then_get_round_trips_through_device() {
        let stub = Arc::new(StubManager::new());
        let mut session = session(stub);
        let source = session.open_default().expect("open");

        source.set_u32(CapId::XFER_COUNT, 5).expect("set");
        assert_eq!(source.get_u32(CapId::XFER_COUNT).expect("get"), 5);
    }

    #[test]
    fn set_rejected_while_transferring() {
        let stub = Arc::new(StubManager::new());
        let mut session = session(Arc::clone(&stub));
        let source = session.open_default().expect("open");
        source.state = SourceState::Transferring;

        let calls = stub.capability_calls();
        let err = source.set_u32(CapId::XFER_COUNT, 2).unwrap_err();
        assert!(matches!(err, ScanwerkError::Sequence { .. }));
        // Gets remain legal mid-transfer.
        source.get_u32(CapId::XFER_COUNT).expect("get");
        assert_eq!(stub.capability_calls(), calls + 1);
    }

    #[test]
    fn custom_capability_gets_minimal_entry() {
        let stub = Arc::new(StubManager::new());
        let mut session = session(stub);
        let source = session.open_default().expect("open");

        let custom = CapId(0x9001);
        source.ensure_cached(&[custom]);
        let entry = source.cache.get(custom).expect("seeded");
        assert!(!entry.tested);
        assert_eq!(entry.item_type, ItemType::U32);
        assert!(entry.containers.contains(ContainerKinds::ONE_VALUE));
    }
}

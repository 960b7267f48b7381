// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session lifecycle: manager open, source discovery, source open/close.
//
// A session is thread-affine. It claims its thread at open and every
// public entry re-checks the claim, so a handle smuggled across threads
// fails fast instead of corrupting per-source state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    AppIdentity, CapId, ClosePolicy, ProtocolVersion, ResultCode, SourceIdentity, SourceState,
    VersionInfo,
};
use scanwerk_dsm::loader;
use scanwerk_dsm::{Dat, ManagerEntry, Msg, Payload, Triplet};

use crate::capabilities::CapCache;
use crate::condition;
use crate::context::EngineContext;
use crate::source::Source;

/// How to pick a device.
#[derive(Debug, Clone)]
pub enum SelectCriteria {
    /// Ask the manager to run its selection dialog.
    Dialog,
    /// Exact product-name match over the enumerated sources.
    ByName(String),
    /// The manager's configured default device.
    Default,
}

/// Outcome of a selection. A dialog dismissal or a name miss is a normal
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelection {
    Selected(SourceIdentity),
    Cancelled,
}

/// Capabilities seeded into every source's cache at open, before any
/// device traffic.
const DISCOVERY_CAPS: [CapId; 8] = [
    CapId::XFER_COUNT,
    CapId::XFER_MECH,
    CapId::PIXEL_TYPE,
    CapId::UNITS,
    CapId::UI_CONTROLLABLE,
    CapId::PAPER_DETECTABLE,
    CapId::FEEDER_ENABLED,
    CapId::DUPLEX,
];

/// An open connection to the device manager, owning its sources.
pub struct Session {
    ctx: Arc<EngineContext>,
    manager: Arc<dyn ManagerEntry>,
    app: AppIdentity,
    serial: u64,
    sources: Vec<Source>,
    open: bool,
}

impl Session {
    /// Open a session against the native manager module found via the
    /// context's configuration.
    pub fn open(ctx: Arc<EngineContext>, app: AppIdentity) -> Result<Self> {
        let manager = loader::load_manager(ctx.config())?;
        Self::open_with(ctx, manager, app)
    }

    /// Open a session against an already-bound manager (the loader's
    /// result, or a stub).
    pub fn open_with(
        ctx: Arc<EngineContext>,
        manager: Arc<dyn ManagerEntry>,
        mut app: AppIdentity,
    ) -> Result<Self> {
        // A legacy manager only understands the last 1.x generation, so the
        // registered identity must not claim more.
        if manager.is_legacy() {
            app.protocol = ProtocolVersion::LEGACY;
        }
        let serial = ctx.register_session()?;
        let mut payload = Payload::None;

        let open_dsm = Triplet::control(Dat::Parent, Msg::OpenDsm);
        let rc = manager.call(&app, None, open_dsm, &mut payload);
        if rc == ResultCode::Failure {
            let err = condition::report_failure(&ctx, manager.as_ref(), &app, None, open_dsm);
            ctx.unregister_session(serial);
            return Err(ScanwerkError::ManagerUnavailable(format!(
                "manager refused to open: {err}"
            )));
        }

        let open_session = Triplet::control(Dat::Parent, Msg::OpenSession);
        let rc = manager.call(&app, None, open_session, &mut payload);
        if rc == ResultCode::Failure {
            let err =
                condition::report_failure(&ctx, manager.as_ref(), &app, None, open_session);
            let _ = manager.call(
                &app,
                None,
                Triplet::control(Dat::Parent, Msg::CloseDsm),
                &mut payload,
            );
            ctx.unregister_session(serial);
            return Err(ScanwerkError::SessionOpen(err.to_string()));
        }

        info!(
            app = %app.product_name,
            legacy = manager.is_legacy(),
            "session open"
        );
        Ok(Self {
            ctx,
            manager,
            app,
            serial,
            sources: Vec::new(),
            open: true,
        })
    }

    pub fn app(&self) -> &AppIdentity {
        &self.app
    }

    /// Whether the bound manager speaks the legacy protocol generation.
    pub fn is_legacy(&self) -> bool {
        self.manager.is_legacy()
    }

    // -- Discovery -------------------------------------------------------

    /// Enumerate every device the manager knows about.
    pub fn list_sources(&mut self) -> Result<Vec<SourceIdentity>> {
        self.ctx.check_thread(self.serial)?;
        let mut found = Vec::new();
        let mut msg = Msg::GetFirst;
        loop {
            let mut payload = Payload::Identity(blank_identity());
            let triplet = Triplet::control(Dat::Identity, msg);
            let rc = self.manager.call(&self.app, None, triplet, &mut payload);
            match rc {
                ResultCode::EndOfList => break,
                ResultCode::Failure => {
                    return Err(condition::report_failure(
                        &self.ctx,
                        self.manager.as_ref(),
                        &self.app,
                        None,
                        triplet,
                    ));
                }
                _ => {
                    if let Payload::Identity(id) = payload {
                        found.push(id);
                    }
                }
            }
            msg = Msg::GetNext;
        }
        debug!(count = found.len(), "sources enumerated");
        Ok(found)
    }

    /// Pick a device by dialog, name, or manager default.
    pub fn select_source(&mut self, criteria: SelectCriteria) -> Result<SourceSelection> {
        self.ctx.check_thread(self.serial)?;
        match criteria {
            SelectCriteria::Dialog => {
                let mut payload = Payload::Identity(blank_identity());
                let triplet = Triplet::control(Dat::Identity, Msg::UserSelect);
                let rc = self.manager.call(&self.app, None, triplet, &mut payload);
                match rc {
                    ResultCode::Cancel => Ok(SourceSelection::Cancelled),
                    ResultCode::Failure => Err(condition::report_failure(
                        &self.ctx,
                        self.manager.as_ref(),
                        &self.app,
                        None,
                        triplet,
                    )),
                    _ => match payload {
                        Payload::Identity(id) => Ok(SourceSelection::Selected(id)),
                        _ => Err(ScanwerkError::NoSourceSelected),
                    },
                }
            }
            SelectCriteria::ByName(name) => {
                let found = self
                    .list_sources()?
                    .into_iter()
                    .find(|s| s.product_name.eq_ignore_ascii_case(&name));
                Ok(match found {
                    Some(id) => SourceSelection::Selected(id),
                    None => SourceSelection::Cancelled,
                })
            }
            SelectCriteria::Default => {
                let mut payload = Payload::Identity(blank_identity());
                let triplet = Triplet::control(Dat::Identity, Msg::GetDefault);
                let rc = self.manager.call(&self.app, None, triplet, &mut payload);
                if rc == ResultCode::Failure {
                    return Err(condition::report_failure(
                        &self.ctx,
                        self.manager.as_ref(),
                        &self.app,
                        None,
                        triplet,
                    ));
                }
                match payload {
                    Payload::Identity(id) => Ok(SourceSelection::Selected(id)),
                    _ => Err(ScanwerkError::NoSourceSelected),
                }
            }
        }
    }

    // -- Source lifecycle ------------------------------------------------

    /// Open a connection to the selected device. Seeds the capability
    /// cache, resolves quirks, and runs the post-open probes.
    pub fn open_source(&mut self, identity: &SourceIdentity) -> Result<&mut Source> {
        self.ctx.check_thread(self.serial)?;
        let mut payload = Payload::Identity(identity.clone());
        let triplet = Triplet::control(Dat::Identity, Msg::OpenDs);
        let rc = self.manager.call(&self.app, None, triplet, &mut payload);
        if rc == ResultCode::Failure {
            return Err(condition::report_failure(
                &self.ctx,
                self.manager.as_ref(),
                &self.app,
                None,
                triplet,
            ));
        }
        let opened = match payload {
            Payload::Identity(id) => id,
            _ => identity.clone(),
        };

        let quirks = self.ctx.quirks_for(&opened.product_name);
        let mut source = Source {
            ctx: Arc::clone(&self.ctx),
            manager: Arc::clone(&self.manager),
            app: self.app.clone(),
            identity: opened,
            serial: self.serial,
            state: SourceState::Opened,
            cache: CapCache::default(),
            quirks,
            xfer: None,
            forced_done: false,
            retries_used: 0,
        };

        // Seed the cache from the well-known table, then probe the device
        // for the answers the table cannot give.
        source.ensure_cached(&DISCOVERY_CAPS);
        let _ = source.is_supported(CapId::PAPER_DETECTABLE, true);
        if quirks.flatbed_only {
            // Best effort: a device on this list may reject the set too.
            if source.set_u32(CapId::FEEDER_ENABLED, 0).is_err() {
                warn!(
                    source = %source.identity.product_name,
                    "flatbed-only quirk: could not disable feeder"
                );
            }
        }

        info!(
            source = %source.identity.product_name,
            protocol = %source.identity.protocol,
            quirks = quirks.any(),
            "source open"
        );
        self.sources.push(source);
        let last = self.sources.len() - 1;
        Ok(&mut self.sources[last])
    }

    /// Select the manager default and open it in one step.
    pub fn open_default(&mut self) -> Result<&mut Source> {
        match self.select_source(SelectCriteria::Default)? {
            SourceSelection::Selected(id) => self.open_source(&id),
            SourceSelection::Cancelled => Err(ScanwerkError::NoSourceSelected),
        }
    }

    /// The open source with this manager-assigned id, if any.
    pub fn source_mut(&mut self, id: u32) -> Option<&mut Source> {
        self.sources
            .iter_mut()
            .find(|s| s.identity.id == id && s.state != SourceState::Closed)
    }

    /// Close one source and drop it from the session.
    pub fn close_source(&mut self, id: u32, policy: ClosePolicy) -> Result<()> {
        self.ctx.check_thread(self.serial)?;
        let Some(pos) = self.sources.iter().position(|s| s.identity.id == id) else {
            return Err(ScanwerkError::NoSourceSelected);
        };
        self.sources[pos].close_internal(policy)?;
        self.sources.remove(pos);
        Ok(())
    }

    // -- Teardown --------------------------------------------------------

    /// Close every source and the manager connection. Graceful policy
    /// leaves the session open if any source refuses to close.
    pub fn close(&mut self, policy: ClosePolicy) -> Result<()> {
        self.ctx.check_thread(self.serial)?;
        if !self.open {
            return Ok(());
        }
        for source in &mut self.sources {
            source.close_internal(policy)?;
        }
        self.sources.clear();

        let mut payload = Payload::None;
        let _ = self.manager.call(
            &self.app,
            None,
            Triplet::control(Dat::Parent, Msg::CloseSession),
            &mut payload,
        );
        let _ = self.manager.call(
            &self.app,
            None,
            Triplet::control(Dat::Parent, Msg::CloseDsm),
            &mut payload,
        );
        self.ctx.unregister_session(self.serial);
        self.open = false;
        info!(app = %self.app.product_name, "session closed");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("app", &self.app.product_name)
            .field("serial", &self.serial)
            .field("sources", &self.sources.len())
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.open {
            warn!(app = %self.app.product_name, "session dropped while open; force closing");
            for source in &mut self.sources {
                let _ = source.close_internal(ClosePolicy::Force);
            }
            self.sources.clear();
            let mut payload = Payload::None;
            let _ = self.manager.call(
                &self.app,
                None,
                Triplet::control(Dat::Parent, Msg::CloseSession),
                &mut payload,
            );
            let _ = self.manager.call(
                &self.app,
                None,
                Triplet::control(Dat::Parent, Msg::CloseDsm),
                &mut payload,
            );
            self.ctx.unregister_session(self.serial);
        }
    }
}

fn blank_identity() -> SourceIdentity {
    SourceIdentity {
        id: 0,
        version: VersionInfo::default(),
        protocol: ProtocolVersion::CURRENT,
        supported_groups: 0,
        manufacturer: String::new(),
        product_family: String::new(),
        product_name: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::config::EngineConfig;
    use scanwerk_dsm::stub::StubManager;

    fn app() -> AppIdentity {
        AppIdentity::new("Scanwerk", "Engine", "SessionTest")
    }

    fn ctx() -> Arc<EngineContext> {
        EngineContext::init(EngineConfig::default()).expect("init")
    }

    #[test]
    fn open_enumerate_select_close() {
        let stub = Arc::new(StubManager::new());
        let mut session = Session::open_with(ctx(), stub.clone() as Arc<dyn ManagerEntry>, app())
            .expect("open");
        assert_eq!(stub.count(Dat::Parent, Msg::OpenDsm), 1);
        assert_eq!(stub.count(Dat::Parent, Msg::OpenSession), 1);

        let sources = session.list_sources().expect("enumerate");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].product_name, "StubScan 2000");

        let sel = session
            .select_source(SelectCriteria::ByName("stubscan 2000".into()))
            .expect("select");
        assert!(matches!(sel, SourceSelection::Selected(_)));

        session.close(ClosePolicy::Graceful).expect("close");
        assert_eq!(stub.count(Dat::Parent, Msg::CloseSession), 1);
        assert_eq!(stub.count(Dat::Parent, Msg::CloseDsm), 1);
    }

    #[test]
    fn refused_manager_open_is_fatal() {
        let stub = Arc::new(StubManager::new().fail_open_manager());
        let err = Session::open_with(ctx(), stub, app()).unwrap_err();
        assert!(matches!(err, ScanwerkError::ManagerUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn refused_session_open_closes_manager_again() {
        let stub = Arc::new(StubManager::new().fail_open_session());
        let err = Session::open_with(ctx(), stub.clone() as Arc<dyn ManagerEntry>, app())
            .unwrap_err();
        assert!(matches!(err, ScanwerkError::SessionOpen(_)));
        assert_eq!(stub.count(Dat::Parent, Msg::CloseDsm), 1);
    }

    #[test]
    fn second_session_on_same_thread_rejected() {
        let context = ctx();
        let _first =
            Session::open_with(Arc::clone(&context), Arc::new(StubManager::new()), app())
                .expect("first");
        let err = Session::open_with(context, Arc::new(StubManager::new()), app()).unwrap_err();
        assert!(matches!(err, ScanwerkError::SessionOpen(_)));
    }

    #[test]
    fn legacy_manager_downgrades_registered_protocol() {
        let stub = Arc::new(StubManager::new().legacy());
        let session = Session::open_with(ctx(), stub, app()).expect("open");
        assert_eq!(session.app.protocol, ProtocolVersion::LEGACY);
    }

    #[test]
    fn dialog_dismissal_is_cancelled_not_error() {
        let stub = Arc::new(StubManager::new().cancel_selection());
        let mut session = Session::open_with(ctx(), stub, app()).expect("open");
        let sel = session
            .select_source(SelectCriteria::Dialog)
            .expect("select");
        assert_eq!(sel, SourceSelection::Cancelled);
    }

    #[test]
    fn open_source_seeds_cache_without_device_calls() {
        let stub = Arc::new(StubManager::new());
        let mut session = Session::open_with(ctx(), stub.clone() as Arc<dyn ManagerEntry>, app())
            .expect("open");
        let source = session.open_default().expect("open source");
        assert_eq!(source.state(), SourceState::Opened);
        // Discovery seeds from the table; the only device traffic is the
        // single paper-detectable probe.
        assert_eq!(stub.capability_calls(), 1);
    }

    #[test]
    fn cross_thread_use_fails_fast() {
        let stub = Arc::new(StubManager::new());
        let mut session = Session::open_with(ctx(), stub, app()).expect("open");
        std::thread::spawn(move || {
            // The handle moved threads; its claim did not.
            let err = session.list_sources().unwrap_err();
            assert!(matches!(err, ScanwerkError::WrongThread));
            // Drop still cleans up without panicking.
        })
        .join()
        .expect("join");
    }
}

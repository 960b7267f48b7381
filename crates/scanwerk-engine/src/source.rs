// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A connected source and its state machine.
//
// All protocol traffic to a device funnels through [`Source::call`], which
// enforces triplet legality against the lifecycle state before the manager
// ever sees the message, and converts `Failure` results into typed errors
// with the condition code attached. Misuse is reported to the caller
// immediately; the device is never consulted for an illegal triplet.

use std::sync::Arc;

use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    AppIdentity, ClosePolicy, Frame, ImageInfo, ImageLayout, PixelType, ResultCode,
    SourceIdentity, SourceState, Unit,
};
use scanwerk_dsm::traits::{PendingXfersPayload, UserInterfacePayload};
use scanwerk_dsm::{Dat, ManagerEntry, Msg, Payload, Triplet};

use crate::capabilities::CapCache;
use crate::condition;
use crate::context::EngineContext;
use crate::quirks::DeviceQuirks;
use crate::transfer::TransferContext;

/// Result of a UI enable. A device-reported cancel is not an error; the
/// UI has already been torn back down by the time the caller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    Enabled,
    Cancelled,
}

/// One open connection to a device.
pub struct Source {
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) manager: Arc<dyn ManagerEntry>,
    pub(crate) app: AppIdentity,
    pub(crate) identity: SourceIdentity,
    /// Serial of the owning session, for thread-affinity checks.
    pub(crate) serial: u64,
    pub(crate) state: SourceState,
    pub(crate) cache: CapCache,
    pub(crate) quirks: DeviceQuirks,
    /// Single transfer slot; a second in-flight buffer is a caller bug.
    pub(crate) xfer: Option<TransferContext>,
    /// Set by a UI disable on a force-done device; read by the acquisition
    /// driver to end the job cleanly instead of hanging.
    pub(crate) forced_done: bool,
    /// Page re-attempts spent over the life of this connection.
    pub(crate) retries_used: u32,
}

impl Source {
    pub fn identity(&self) -> &SourceIdentity {
        &self.identity
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn quirks(&self) -> DeviceQuirks {
        self.quirks
    }

    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    /// Issue one triplet to this source, gated by the state machine.
    pub(crate) fn call(&mut self, triplet: Triplet, payload: &mut Payload) -> Result<ResultCode> {
        if triplet.dat.is_transfer() && self.state < SourceState::TransferReady {
            return Err(ScanwerkError::Sequence {
                state: self.state,
                detail: format!("{} requires transfer-ready", triplet.summary()),
            });
        }
        if triplet.dat == Dat::Capability
            && triplet.msg.is_mutation()
            && self.state == SourceState::Transferring
        {
            return Err(ScanwerkError::Sequence {
                state: self.state,
                detail: format!("{} while a transfer is in progress", triplet.summary()),
            });
        }
        debug!(triplet = %triplet, state = ?self.state, "source call");
        let rc = self
            .manager
            .call(&self.app, Some(&self.identity), triplet, payload);
        if rc == ResultCode::Failure {
            return Err(condition::report_failure(
                &self.ctx,
                self.manager.as_ref(),
                &self.app,
                Some(&self.identity),
                triplet,
            ));
        }
        Ok(rc)
    }

    // -- UI lifecycle ----------------------------------------------------

    /// Enable the source, with or without its built-in UI. Blocks until the
    /// device reports the outcome. Idempotent when already enabled.
    pub fn enable_ui(&mut self, show_ui: bool) -> Result<EnableOutcome> {
        if self.state == SourceState::UiEnabled {
            return Ok(EnableOutcome::Enabled);
        }
        if self.state != SourceState::Opened {
            return Err(ScanwerkError::Sequence {
                state: self.state,
                detail: "enable requires an opened, idle source".into(),
            });
        }
        let mut payload = Payload::UserInterface(UserInterfacePayload {
            show_ui,
            modal: false,
        });
        let rc = self.call(
            Triplet::control(Dat::UserInterface, Msg::EnableDs),
            &mut payload,
        )?;
        if rc == ResultCode::Cancel {
            // Soft failure: the device may have flashed its dialog, so tear
            // it back down before reporting.
            info!(source = %self.identity.product_name, "enable cancelled by device");
            self.disable_ui();
            return Ok(EnableOutcome::Cancelled);
        }
        self.state = SourceState::UiEnabled;
        Ok(EnableOutcome::Enabled)
    }

    /// Disable the source UI. Safe in any state and on every cleanup path;
    /// a refusing device is logged, never escalated.
    pub fn disable_ui(&mut self) {
        let mut payload = Payload::UserInterface(UserInterfacePayload {
            show_ui: false,
            modal: false,
        });
        let rc = self.manager.call(
            &self.app,
            Some(&self.identity),
            Triplet::control(Dat::UserInterface, Msg::DisableDs),
            &mut payload,
        );
        if rc == ResultCode::Failure {
            warn!(source = %self.identity.product_name, "disable refused by device");
        }
        if self.state > SourceState::Opened {
            self.state = SourceState::Opened;
        }
        if self.quirks.force_done {
            self.forced_done = true;
        }
    }

    // -- Pre-transfer queries --------------------------------------------

    /// Pages waiting in the device, -1 for "more, count unknown".
    pub fn pending_count(&mut self) -> Result<i32> {
        let mut payload = Payload::PendingXfers(PendingXfersPayload::default());
        self.call(Triplet::control(Dat::PendingXfers, Msg::Get), &mut payload)?;
        match payload {
            Payload::PendingXfers(px) => Ok(px.count),
            other => Err(ScanwerkError::Misuse(format!(
                "pending-count returned {} payload",
                other.kind()
            ))),
        }
    }

    /// Geometry of the image about to transfer. Extents may carry the
    /// undefined sentinel on feeder devices.
    pub fn image_info(&mut self) -> Result<ImageInfo> {
        let mut payload = Payload::ImageInfo(blank_info());
        self.call(Triplet::image(Dat::ImageInfo, Msg::Get), &mut payload)?;
        match payload {
            Payload::ImageInfo(info) => Ok(info),
            other => Err(ScanwerkError::Misuse(format!(
                "image-info returned {} payload",
                other.kind()
            ))),
        }
    }

    /// Frame layout of the image about to transfer.
    pub fn image_layout(&mut self) -> Result<ImageLayout> {
        let mut payload = Payload::ImageLayout(blank_layout());
        self.call(Triplet::image(Dat::ImageLayout, Msg::Get), &mut payload)?;
        match payload {
            Payload::ImageLayout(layout) => Ok(layout),
            other => Err(ScanwerkError::Misuse(format!(
                "image-layout returned {} payload",
                other.kind()
            ))),
        }
    }

    // -- Page acknowledgement --------------------------------------------

    /// Acknowledge the end of one page and learn how many remain. Moves the
    /// state machine back to transfer-ready (more pages) or UI-enabled
    /// (batch done).
    pub(crate) fn end_transfer(&mut self) -> Result<i32> {
        let mut payload = Payload::PendingXfers(PendingXfersPayload::default());
        self.call(
            Triplet::control(Dat::PendingXfers, Msg::EndXfer),
            &mut payload,
        )?;
        let pending = match payload {
            Payload::PendingXfers(px) => px.count,
            _ => 0,
        };
        self.state = if pending != 0 {
            SourceState::TransferReady
        } else {
            SourceState::UiEnabled
        };
        Ok(pending)
    }

    /// Abandon whatever the feeder still holds. Cleanup path: failures are
    /// logged, not propagated.
    pub(crate) fn abandon_pending(&mut self) {
        let mut payload = Payload::PendingXfers(PendingXfersPayload::default());
        let rc = self.manager.call(
            &self.app,
            Some(&self.identity),
            Triplet::control(Dat::PendingXfers, Msg::Reset),
            &mut payload,
        );
        if rc == ResultCode::Failure {
            warn!(source = %self.identity.product_name, "pending-transfer reset refused");
        }
    }

    // -- Teardown --------------------------------------------------------

    /// Close the connection. Graceful policy refuses while a transfer is in
    /// flight; force disables the UI and abandons the feeder first. The
    /// capability cache dies with the connection.
    pub(crate) fn close_internal(&mut self, policy: ClosePolicy) -> Result<()> {
        if self.state == SourceState::Closed {
            return Ok(());
        }
        if self.state >= SourceState::TransferReady {
            match policy {
                ClosePolicy::Graceful => return Err(ScanwerkError::SourceBusy),
                ClosePolicy::Force => {
                    warn!(
                        source = %self.identity.product_name,
                        "force close: abandoning in-flight transfer"
                    );
                    self.abandon_pending();
                    self.xfer = None;
                }
            }
        }
        if self.state > SourceState::Opened {
            self.disable_ui();
        }
        let mut payload = Payload::Identity(self.identity.clone());
        let triplet = Triplet::control(Dat::Identity, Msg::CloseDs);
        let rc = self
            .manager
            .call(&self.app, None, triplet, &mut payload);
        if rc == ResultCode::Failure {
            return Err(condition::report_failure(
                &self.ctx,
                self.manager.as_ref(),
                &self.app,
                None,
                triplet,
            ));
        }
        self.cache.clear();
        self.state = SourceState::Closed;
        info!(source = %self.identity.product_name, "source closed");
        Ok(())
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("product", &self.identity.product_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub(crate) fn blank_info() -> ImageInfo {
    ImageInfo {
        width: ImageInfo::UNDEFINED,
        height: ImageInfo::UNDEFINED,
        bits_per_pixel: 0,
        pixel_type: PixelType::BlackWhite,
        x_resolution: 0.0,
        y_resolution: 0.0,
    }
}

pub(crate) fn blank_layout() -> ImageLayout {
    ImageLayout {
        frame: Frame {
            left: 0.0,
            top: 0.0,
            right: 0.0,
            bottom: 0.0,
        },
        unit: Unit::Inches,
        document_number: 0,
        page_number: 0,
        frame_number: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SelectCriteria, Session, SourceSelection};
    use scanwerk_core::config::EngineConfig;
    use scanwerk_dsm::stub::StubManager;

    fn app() -> AppIdentity {
        AppIdentity::new("Scanwerk", "Engine", "SourceTest")
    }

    fn open_stub(stub: Arc<StubManager>) -> Session {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        Session::open_with(ctx, stub, app()).expect("session")
    }

    #[test]
    fn transfer_triplet_rejected_before_ready() {
        let stub = Arc::new(StubManager::new().with_pages(1, 16));
        let mut session = open_stub(Arc::clone(&stub));
        let source = session.open_default().expect("open source");
        assert_eq!(source.state(), SourceState::Opened);

        let mut payload = Payload::NativeXfer(Default::default());
        let err = source
            .call(Triplet::image(Dat::ImageNativeXfer, Msg::Get), &mut payload)
            .unwrap_err();
        assert!(matches!(err, ScanwerkError::Sequence { .. }));
        // The device never saw the illegal triplet.
        assert_eq!(stub.transfer_calls(), 0);
    }

    #[test]
    fn enable_then_disable_round_trip() {
        let stub = Arc::new(StubManager::new());
        let mut session = open_stub(Arc::clone(&stub));
        let source = session.open_default().expect("open source");

        assert_eq!(source.enable_ui(false).expect("enable"), EnableOutcome::Enabled);
        assert_eq!(source.state(), SourceState::UiEnabled);
        assert!(stub.ui_enabled());
        // Re-enable is a no-op, not a device call.
        assert_eq!(source.enable_ui(true).expect("again"), EnableOutcome::Enabled);
        assert_eq!(stub.count(Dat::UserInterface, Msg::EnableDs), 1);

        source.disable_ui();
        assert_eq!(source.state(), SourceState::Opened);
        assert!(!stub.ui_enabled());
    }

    #[test]
    fn cancelled_enable_tears_ui_down() {
        let stub = Arc::new(StubManager::new().cancel_on_enable());
        let mut session = open_stub(Arc::clone(&stub));
        let source = session.open_default().expect("open source");

        assert_eq!(
            source.enable_ui(true).expect("enable"),
            EnableOutcome::Cancelled
        );
        assert_eq!(source.state(), SourceState::Opened);
        assert_eq!(stub.count(Dat::UserInterface, Msg::DisableDs), 1);
    }

    #[test]
    fn graceful_close_refuses_mid_transfer() {
        let stub = Arc::new(StubManager::new().with_pages(2, 16));
        let mut session = open_stub(stub);
        let source = session.open_default().expect("open source");
        source.enable_ui(false).expect("enable");
        source.state = SourceState::TransferReady;

        let err = source.close_internal(ClosePolicy::Graceful).unwrap_err();
        assert!(matches!(err, ScanwerkError::SourceBusy));
        // Force succeeds and resets the machine.
        source.close_internal(ClosePolicy::Force).expect("force close");
        assert_eq!(source.state(), SourceState::Closed);
    }

    #[test]
    fn select_by_name_miss_is_not_an_error() {
        let stub = Arc::new(StubManager::new());
        let mut session = open_stub(stub);
        let sel = session
            .select_source(SelectCriteria::ByName("NoSuchScan".into()))
            .expect("select");
        assert_eq!(sel, SourceSelection::Cancelled);
    }
}

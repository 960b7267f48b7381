// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable stub manager.
//
// Behaves like a loaded device-manager module with one fake scanner behind
// it. Tests script failures, cancels, page counts, and strip sizes, then
// assert on the recorded triplet log. Also usable as the manager for
// device-less builds (mirrors the platform-stub role of the bridge crate).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use scanwerk_core::types::{
    AppIdentity, CapId, ConditionCode, ImageInfo, ImageLayout, ItemType, OpFlags, PixelType,
    ProtocolVersion, ResultCode, SourceIdentity, VersionInfo,
};

use crate::traits::{CapContainer, ManagerEntry, Payload, SetupMemXferPayload};
use crate::triplet::{Dat, Msg, Triplet};

/// One scripted capability of the fake device.
#[derive(Debug, Clone)]
pub struct StubCap {
    pub container: CapContainer,
    pub settable: bool,
}

/// One scripted page in the fake feeder.
#[derive(Debug, Clone)]
pub struct StubPage {
    pub data: Vec<u8>,
    /// Transfer attempts that fail before one succeeds.
    pub fail_times: u32,
}

struct StubState {
    sources: Vec<SourceIdentity>,
    enum_cursor: usize,
    select_cancel: bool,
    manager_open: bool,
    session_open: bool,
    open_source: Option<u32>,
    ui_enabled: bool,
    enable_result: ResultCode,
    fail_open_manager: bool,
    fail_open_session: bool,
    condition: ConditionCode,
    caps: HashMap<u16, StubCap>,
    pages: VecDeque<StubPage>,
    audio_clips: VecDeque<Vec<u8>>,
    setup_mem: SetupMemXferPayload,
    strip_cursor: usize,
    image_info: ImageInfo,
    layout: ImageLayout,
    file_path: Option<std::path::PathBuf>,
    file_counter: u32,
    legacy: bool,
    log: Vec<Triplet>,
}

/// A fake manager + device pair for tests.
pub struct StubManager {
    state: Mutex<StubState>,
}

impl Default for StubManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StubManager {
    pub fn new() -> Self {
        let source = SourceIdentity {
            id: 1,
            version: VersionInfo::default(),
            protocol: ProtocolVersion::CURRENT,
            supported_groups: 0x0003, // control | image
            manufacturer: "Scanwerk".into(),
            product_family: "StubScan".into(),
            product_name: "StubScan 2000".into(),
        };

        let mut caps = HashMap::new();
        caps.insert(
            CapId::XFER_COUNT.0,
            StubCap {
                container: CapContainer::OneValue {
                    item_type: ItemType::I16,
                    value: 1,
                },
                settable: true,
            },
        );
        caps.insert(
            CapId::XFER_MECH.0,
            StubCap {
                container: CapContainer::OneValue {
                    item_type: ItemType::U16,
                    value: 0,
                },
                settable: true,
            },
        );
        caps.insert(
            CapId::PIXEL_TYPE.0,
            StubCap {
                container: CapContainer::Enumeration {
                    item_type: ItemType::U16,
                    items: vec![0, 1, 2],
                    current_index: 2,
                    default_index: 2,
                },
                settable: true,
            },
        );
        caps.insert(
            CapId::UNITS.0,
            StubCap {
                container: CapContainer::OneValue {
                    item_type: ItemType::U16,
                    value: 0,
                },
                settable: true,
            },
        );
        caps.insert(
            CapId::UI_CONTROLLABLE.0,
            StubCap {
                container: CapContainer::OneValue {
                    item_type: ItemType::Bool,
                    value: 1,
                },
                settable: false,
            },
        );
        caps.insert(
            CapId::PAPER_DETECTABLE.0,
            StubCap {
                container: CapContainer::OneValue {
                    item_type: ItemType::Bool,
                    value: 1,
                },
                settable: false,
            },
        );

        Self {
            state: Mutex::new(StubState {
                sources: vec![source],
                enum_cursor: 0,
                select_cancel: false,
                manager_open: false,
                session_open: false,
                open_source: None,
                ui_enabled: false,
                enable_result: ResultCode::Success,
                fail_open_manager: false,
                fail_open_session: false,
                condition: ConditionCode::Success,
                caps,
                pages: VecDeque::new(),
                audio_clips: VecDeque::new(),
                setup_mem: SetupMemXferPayload {
                    min_size: 1024,
                    max_size: 1024 * 1024,
                    preferred: 64 * 1024,
                },
                strip_cursor: 0,
                image_info: ImageInfo {
                    width: 2550,
                    height: 3300,
                    bits_per_pixel: 24,
                    pixel_type: PixelType::Rgb,
                    x_resolution: 300.0,
                    y_resolution: 300.0,
                },
                layout: ImageLayout {
                    frame: scanwerk_core::types::Frame {
                        left: 0.0,
                        top: 0.0,
                        right: 8.5,
                        bottom: 11.0,
                    },
                    unit: scanwerk_core::types::Unit::Inches,
                    document_number: 1,
                    page_number: 1,
                    frame_number: 1,
                },
                file_path: None,
                file_counter: 0,
                legacy: false,
                log: Vec::new(),
            }),
        }
    }

    // -- Scripting -------------------------------------------------------

    pub fn with_source(self, source: SourceIdentity) -> Self {
        self.state.lock().unwrap().sources.push(source);
        self
    }

    pub fn with_capability(self, id: CapId, container: CapContainer, settable: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .caps
            .insert(id.0, StubCap { container, settable });
        self
    }

    pub fn without_capability(self, id: CapId) -> Self {
        self.state.lock().unwrap().caps.remove(&id.0);
        self
    }

    /// Queue `count` pages of `bytes` bytes each in the fake feeder.
    pub fn with_pages(self, count: usize, bytes: usize) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            for i in 0..count {
                st.pages.push_back(StubPage {
                    data: vec![(i % 251) as u8; bytes],
                    fail_times: 0,
                });
            }
        }
        self
    }

    /// Make page `index` fail `times` transfer attempts before succeeding.
    pub fn fail_page(self, index: usize, times: u32) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            if let Some(page) = st.pages.get_mut(index) {
                page.fail_times = times;
            }
        }
        self
    }

    pub fn with_audio_clip(self, data: Vec<u8>) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            st.audio_clips.push_back(data);
            // Advertise the audio group on every source.
            for src in &mut st.sources {
                src.supported_groups |= 0x0004;
            }
        }
        self
    }

    /// Report user cancel when the UI is enabled.
    pub fn cancel_on_enable(self) -> Self {
        self.state.lock().unwrap().enable_result = ResultCode::Cancel;
        self
    }

    pub fn fail_open_manager(self) -> Self {
        self.state.lock().unwrap().fail_open_manager = true;
        self
    }

    pub fn fail_open_session(self) -> Self {
        self.state.lock().unwrap().fail_open_session = true;
        self
    }

    /// Pretend the module speaks only the 1.x protocol generation.
    pub fn legacy(self) -> Self {
        self.state.lock().unwrap().legacy = true;
        self
    }

    /// Report cancel from the selection dialog.
    pub fn cancel_selection(self) -> Self {
        self.state.lock().unwrap().select_cancel = true;
        self
    }

    pub fn with_strip_sizes(self, min: u32, preferred: u32, max: u32) -> Self {
        self.state.lock().unwrap().setup_mem = SetupMemXferPayload {
            min_size: min,
            max_size: max,
            preferred,
        };
        self
    }

    pub fn with_image_info(self, info: ImageInfo) -> Self {
        self.state.lock().unwrap().image_info = info;
        self
    }

    // -- Assertions ------------------------------------------------------

    /// Every triplet issued so far, in order.
    pub fn calls(&self) -> Vec<Triplet> {
        self.state.lock().unwrap().log.clone()
    }

    /// How many times a (dat, msg) pair was issued.
    pub fn count(&self, dat: Dat, msg: Msg) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|t| t.dat == dat && t.msg == msg)
            .count()
    }

    /// How many capability triplets (any message) were issued.
    pub fn capability_calls(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|t| t.dat == Dat::Capability)
            .count()
    }

    /// How many data-moving triplets were issued.
    pub fn transfer_calls(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|t| t.dat.is_transfer())
            .count()
    }

    pub fn ui_enabled(&self) -> bool {
        self.state.lock().unwrap().ui_enabled
    }

    pub fn pages_remaining(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    // -- Internals -------------------------------------------------------

    fn fail(st: &mut StubState, condition: ConditionCode) -> ResultCode {
        st.condition = condition;
        ResultCode::Failure
    }

    /// Consume one scripted failure of the front page, if any remain.
    fn page_fails(st: &mut StubState) -> bool {
        match st.pages.front_mut() {
            Some(page) if page.fail_times > 0 => {
                page.fail_times -= 1;
                true
            }
            _ => false,
        }
    }
}

impl ManagerEntry for StubManager {
    fn call(
        &self,
        _origin: &AppIdentity,
        _dest: Option<&SourceIdentity>,
        triplet: Triplet,
        payload: &mut Payload,
    ) -> ResultCode {
        let mut st = self.state.lock().unwrap();
        // Status queries are diagnostics, not protocol traffic worth
        // counting against the caches.
        if triplet.dat != Dat::Status {
            st.log.push(triplet);
        }
        debug!(triplet = %triplet, "stub call");

        match (triplet.dat, triplet.msg) {
            (Dat::Parent, Msg::OpenDsm) => {
                if st.fail_open_manager {
                    return Self::fail(&mut st, ConditionCode::Bummer);
                }
                st.manager_open = true;
                ResultCode::Success
            }
            (Dat::Parent, Msg::CloseDsm) => {
                st.manager_open = false;
                ResultCode::Success
            }
            (Dat::Parent, Msg::OpenSession) => {
                if st.fail_open_session {
                    return Self::fail(&mut st, ConditionCode::MaxConnections);
                }
                st.session_open = true;
                ResultCode::Success
            }
            (Dat::Parent, Msg::CloseSession) => {
                st.session_open = false;
                ResultCode::Success
            }

            (Dat::Identity, Msg::GetFirst) => {
                st.enum_cursor = 0;
                match st.sources.first().cloned() {
                    Some(src) => {
                        st.enum_cursor = 1;
                        if let Payload::Identity(out) = payload {
                            *out = src;
                        }
                        ResultCode::Success
                    }
                    None => ResultCode::EndOfList,
                }
            }
            (Dat::Identity, Msg::GetNext) => match st.sources.get(st.enum_cursor).cloned() {
                Some(src) => {
                    st.enum_cursor += 1;
                    if let Payload::Identity(out) = payload {
                        *out = src;
                    }
                    ResultCode::Success
                }
                None => ResultCode::EndOfList,
            },
            (Dat::Identity, Msg::GetDefault) | (Dat::Identity, Msg::UserSelect) => {
                if triplet.msg == Msg::UserSelect && st.select_cancel {
                    return ResultCode::Cancel;
                }
                match st.sources.first().cloned() {
                    Some(src) => {
                        if let Payload::Identity(out) = payload {
                            *out = src;
                        }
                        ResultCode::Success
                    }
                    None => Self::fail(&mut st, ConditionCode::NoSource),
                }
            }
            (Dat::Identity, Msg::OpenDs) => {
                let wanted = match payload {
                    Payload::Identity(id) => id.product_name.clone(),
                    _ => String::new(),
                };
                match st
                    .sources
                    .iter()
                    .find(|s| s.product_name == wanted || wanted.is_empty())
                    .cloned()
                {
                    Some(src) => {
                        st.open_source = Some(src.id);
                        if let Payload::Identity(out) = payload {
                            *out = src;
                        }
                        ResultCode::Success
                    }
                    None => Self::fail(&mut st, ConditionCode::NoSource),
                }
            }
            (Dat::Identity, Msg::CloseDs) => {
                st.open_source = None;
                ResultCode::Success
            }

            (Dat::Status, Msg::Get) => {
                if let Payload::Status(out) = payload {
                    out.condition = Some(st.condition);
                }
                ResultCode::Success
            }

            (Dat::Capability, msg) => {
                let Payload::Capability(cap) = payload else {
                    return Self::fail(&mut st, ConditionCode::BadProtocol);
                };
                let stub_cap = st.caps.get(&cap.id.0).cloned();
                let Some(stub_cap) = stub_cap else {
                    return Self::fail(&mut st, ConditionCode::CapUnsupported);
                };
                match msg {
                    Msg::Get | Msg::GetCurrent | Msg::GetDefault => {
                        cap.container = Some(stub_cap.container);
                        ResultCode::Success
                    }
                    Msg::QuerySupport => {
                        let ops = if stub_cap.settable {
                            OpFlags::FULL
                        } else {
                            OpFlags::GET_ONLY
                        };
                        cap.container = Some(CapContainer::OneValue {
                            item_type: ItemType::U32,
                            value: u32::from(ops.0),
                        });
                        ResultCode::Success
                    }
                    Msg::Set | Msg::SetConstraint => {
                        if !stub_cap.settable {
                            return Self::fail(&mut st, ConditionCode::CapBadOperation);
                        }
                        let Some(new_value) =
                            cap.container.as_ref().and_then(CapContainer::current)
                        else {
                            return Self::fail(&mut st, ConditionCode::BadValue);
                        };
                        if let Some(entry) = st.caps.get_mut(&cap.id.0) {
                            entry.container = CapContainer::OneValue {
                                item_type: ItemType::U32,
                                value: new_value,
                            };
                        }
                        ResultCode::Success
                    }
                    Msg::Reset => ResultCode::Success,
                    _ => Self::fail(&mut st, ConditionCode::BadProtocol),
                }
            }

            (Dat::UserInterface, Msg::EnableDs) => {
                let rc = st.enable_result;
                if rc == ResultCode::Success {
                    st.ui_enabled = true;
                }
                rc
            }
            (Dat::UserInterface, Msg::DisableDs) => {
                st.ui_enabled = false;
                ResultCode::Success
            }

            (Dat::PendingXfers, Msg::Get) => {
                if let Payload::PendingXfers(out) = payload {
                    out.count = st.pages.len() as i32;
                }
                ResultCode::Success
            }
            (Dat::PendingXfers, Msg::EndXfer) => {
                st.pages.pop_front();
                st.strip_cursor = 0;
                if let Payload::PendingXfers(out) = payload {
                    out.count = st.pages.len() as i32;
                }
                ResultCode::Success
            }
            (Dat::PendingXfers, Msg::Reset) => {
                st.pages.clear();
                st.strip_cursor = 0;
                if let Payload::PendingXfers(out) = payload {
                    out.count = 0;
                }
                ResultCode::Success
            }

            (Dat::SetupMemXfer, Msg::Get) => {
                if let Payload::SetupMemXfer(out) = payload {
                    *out = st.setup_mem;
                }
                ResultCode::Success
            }

            (Dat::SetupFileXfer, Msg::Get) => {
                st.file_counter += 1;
                if let Payload::SetupFileXfer(out) = payload {
                    out.path = std::env::temp_dir().join(format!(
                        "stubscan-{:04}.{}",
                        st.file_counter,
                        out.format.extension()
                    ));
                }
                ResultCode::Success
            }
            (Dat::SetupFileXfer, Msg::Set) => {
                if let Payload::SetupFileXfer(setup) = payload {
                    st.file_path = Some(setup.path.clone());
                }
                ResultCode::Success
            }

            (Dat::ImageInfo, Msg::Get) => {
                if st.pages.is_empty() {
                    return Self::fail(&mut st, ConditionCode::SequenceError);
                }
                if let Payload::ImageInfo(out) = payload {
                    *out = st.image_info;
                }
                ResultCode::Success
            }
            (Dat::ImageLayout, Msg::Get) => {
                if let Payload::ImageLayout(out) = payload {
                    *out = st.layout;
                }
                ResultCode::Success
            }

            (Dat::ImageNativeXfer, Msg::Get) => {
                if st.pages.is_empty() {
                    return Self::fail(&mut st, ConditionCode::SequenceError);
                }
                if Self::page_fails(&mut st) {
                    return Self::fail(&mut st, ConditionCode::OperationError);
                }
                let data = st.pages[0].data.clone();
                if let Payload::NativeXfer(out) = payload {
                    out.handle = Some(data);
                }
                ResultCode::XferDone
            }

            (Dat::ImageMemXfer, Msg::Get) => {
                if st.pages.is_empty() {
                    return Self::fail(&mut st, ConditionCode::SequenceError);
                }
                if Self::page_fails(&mut st) {
                    st.strip_cursor = 0;
                    return Self::fail(&mut st, ConditionCode::OperationError);
                }
                let data = st.pages[0].data.clone();
                let total = data.len();
                let Payload::MemXfer(mem) = payload else {
                    return Self::fail(&mut st, ConditionCode::BadProtocol);
                };
                let start = st.strip_cursor;
                let n = mem.buffer.len().min(total - start);
                mem.buffer[..n].copy_from_slice(&data[start..start + n]);
                mem.bytes_written = n as u32;
                mem.columns = st.image_info.width.max(0) as u32;
                mem.rows = 1;
                mem.y_offset = start as u32;
                st.strip_cursor += n;
                if st.strip_cursor >= total {
                    st.strip_cursor = 0;
                    ResultCode::XferDone
                } else {
                    ResultCode::Success
                }
            }

            (Dat::ImageFileXfer, Msg::Get) => {
                if st.pages.is_empty() {
                    return Self::fail(&mut st, ConditionCode::SequenceError);
                }
                if Self::page_fails(&mut st) {
                    return Self::fail(&mut st, ConditionCode::OperationError);
                }
                let data = st.pages[0].data.clone();
                let path = st.file_path.clone();
                let Some(path) = path else {
                    return Self::fail(&mut st, ConditionCode::FileNotFound);
                };
                if std::fs::write(&path, &data).is_err() {
                    return Self::fail(&mut st, ConditionCode::FileWriteError);
                }
                ResultCode::XferDone
            }

            (Dat::AudioNativeXfer, Msg::Get) => match st.audio_clips.pop_front() {
                Some(clip) => {
                    if let Payload::NativeXfer(out) = payload {
                        out.handle = Some(clip);
                    }
                    ResultCode::XferDone
                }
                None => Self::fail(&mut st, ConditionCode::SequenceError),
            },

            _ => Self::fail(&mut st, ConditionCode::BadProtocol),
        }
    }

    fn is_legacy(&self) -> bool {
        self.state.lock().unwrap().legacy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{NativeXferPayload, PendingXfersPayload, StatusPayload};

    fn app() -> AppIdentity {
        AppIdentity::new("Scanwerk", "Engine", "StubTest")
    }

    #[test]
    fn open_and_select_default_source() {
        let stub = StubManager::new();
        let mut p = Payload::None;
        let rc = stub.call(&app(), None, Triplet::control(Dat::Parent, Msg::OpenDsm), &mut p);
        assert_eq!(rc, ResultCode::Success);

        let mut p = Payload::Identity(SourceIdentity {
            id: 0,
            version: VersionInfo::default(),
            protocol: ProtocolVersion::CURRENT,
            supported_groups: 0,
            manufacturer: String::new(),
            product_family: String::new(),
            product_name: String::new(),
        });
        let rc = stub.call(
            &app(),
            None,
            Triplet::control(Dat::Identity, Msg::GetDefault),
            &mut p,
        );
        assert_eq!(rc, ResultCode::Success);
        match p {
            Payload::Identity(id) => assert_eq!(id.product_name, "StubScan 2000"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn failing_page_reports_condition() {
        let stub = StubManager::new().with_pages(1, 16).fail_page(0, 1);
        let mut p = Payload::NativeXfer(NativeXferPayload::default());
        let rc = stub.call(
            &app(),
            None,
            Triplet::image(Dat::ImageNativeXfer, Msg::Get),
            &mut p,
        );
        assert_eq!(rc, ResultCode::Failure);

        let mut s = Payload::Status(StatusPayload::default());
        stub.call(&app(), None, Triplet::control(Dat::Status, Msg::Get), &mut s);
        match s {
            Payload::Status(st) => {
                assert_eq!(st.condition, Some(ConditionCode::OperationError));
            }
            _ => unreachable!(),
        }

        // Second attempt succeeds.
        let rc = stub.call(
            &app(),
            None,
            Triplet::image(Dat::ImageNativeXfer, Msg::Get),
            &mut p,
        );
        assert_eq!(rc, ResultCode::XferDone);
    }

    #[test]
    fn end_xfer_pops_pages() {
        let stub = StubManager::new().with_pages(2, 8);
        let mut p = Payload::PendingXfers(PendingXfersPayload::default());
        stub.call(
            &app(),
            None,
            Triplet::control(Dat::PendingXfers, Msg::EndXfer),
            &mut p,
        );
        match p {
            Payload::PendingXfers(px) => assert_eq!(px.count, 1),
            _ => unreachable!(),
        }
        assert_eq!(stub.pages_remaining(), 1);
    }

    #[test]
    fn call_log_counts_triplets() {
        let stub = StubManager::new();
        let mut p = Payload::None;
        stub.call(&app(), None, Triplet::control(Dat::Parent, Msg::OpenDsm), &mut p);
        stub.call(&app(), None, Triplet::control(Dat::Parent, Msg::OpenDsm), &mut p);
        assert_eq!(stub.count(Dat::Parent, Msg::OpenDsm), 2);
        assert_eq!(stub.transfer_calls(), 0);
    }

    #[test]
    fn status_queries_are_not_logged() {
        let stub = StubManager::new();
        let mut s = Payload::Status(StatusPayload::default());
        stub.call(&app(), None, Triplet::control(Dat::Status, Msg::Get), &mut s);
        assert!(stub.calls().is_empty());
    }
}

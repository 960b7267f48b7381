// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dynamic loading of the device-manager module.
//
// Search order: the explicitly configured path first, then the fixed list
// of well-known directories; first successful load wins. Current-generation
// and legacy modules are distinguished by filename, which drives the
// protocol fields pre-filled in identity records.
//
// SAFETY: this module is the only place the raw entry point is called. Any
// unwind crossing the boundary is caught and converted to the sentinel
// failure result — the native side has no exception model.

use std::ffi::c_void;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    AppIdentity, CapId, ConditionCode, FileFormat, ItemType, ResultCode, SourceIdentity,
};
use scanwerk_core::EngineConfig;

use crate::traits::{CapContainer, ManagerEntry, Payload};
use crate::triplet::Triplet;
use crate::wire;

/// Name the entry point is resolved by.
pub const ENTRY_SYMBOL: &[u8] = b"DSM_Entry\0";

/// Raw signature of the resolved entry point.
type RawEntry = unsafe extern "C" fn(
    *const wire::WireIdentity,
    *mut wire::WireIdentity,
    u32,
    u16,
    u16,
    *mut c_void,
) -> u16;

/// Module filename candidates in preference order, with a legacy flag.
fn module_candidates() -> &'static [(&'static str, bool)] {
    #[cfg(target_os = "windows")]
    {
        &[("TWAINDSM.dll", false), ("TWAIN_32.DLL", true)]
    }
    #[cfg(target_os = "macos")]
    {
        &[
            ("TWAINDSM.framework/TWAINDSM", false),
            ("TWAIN.framework/TWAIN", true),
        ]
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        &[("libtwaindsm.so", false), ("libtwain.so", true)]
    }
}

/// Locate and load the manager module per the configured search order.
///
/// Returns a boxed `ManagerEntry` the engine can call through. Failure to
/// find any module is `ManagerNotFound`; a module without the entry point
/// is `EntryPointMissing`. Both are fatal to the session.
pub fn load_manager(config: &EngineConfig) -> Result<Arc<dyn ManagerEntry>> {
    if let Some(path) = &config.manager_path {
        debug!(path = %path.display(), "trying explicit manager path");
        return NativeManager::load(path, false).map(|m| Arc::new(m) as Arc<dyn ManagerEntry>);
    }

    for dir in &config.search_dirs {
        for (name, legacy) in module_candidates() {
            if *legacy && !config.allow_legacy_manager {
                continue;
            }
            let candidate = dir.join(name);
            if !candidate.exists() {
                continue;
            }
            match NativeManager::load(&candidate, *legacy) {
                Ok(manager) => {
                    info!(
                        path = %candidate.display(),
                        legacy = *legacy,
                        "device manager loaded"
                    );
                    return Ok(Arc::new(manager));
                }
                Err(err) => {
                    warn!(
                        path = %candidate.display(),
                        error = %err,
                        "manager candidate failed to load, trying next"
                    );
                }
            }
        }
    }

    Err(ScanwerkError::ManagerNotFound)
}

/// The loaded manager module and its resolved entry point.
pub struct NativeManager {
    // Must stay alive as long as `entry` is callable.
    _library: Library,
    entry: RawEntry,
    legacy: bool,
    path: PathBuf,
}

impl NativeManager {
    /// Load one module and resolve its entry point.
    pub fn load(path: &Path, legacy: bool) -> Result<Self> {
        // SAFETY: loading an arbitrary module runs its initializers; that
        // is inherent to the protocol and the operator controls the search
        // paths.
        let library = unsafe { Library::new(path) }
            .map_err(|e| ScanwerkError::ManagerUnavailable(format!("{}: {e}", path.display())))?;

        let entry = unsafe {
            library
                .get::<RawEntry>(ENTRY_SYMBOL)
                .map(|sym| *sym)
                .map_err(|_| ScanwerkError::EntryPointMissing {
                    module: path.display().to_string(),
                    symbol: "DSM_Entry".into(),
                })?
        };

        Ok(Self {
            _library: library,
            entry,
            legacy,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One raw call with unwind containment.
    fn raw_call(
        &self,
        origin: *const wire::WireIdentity,
        dest: *mut wire::WireIdentity,
        triplet: Triplet,
        payload: *mut c_void,
    ) -> ResultCode {
        let entry = self.entry;
        let group = triplet.group.raw();
        let dat = triplet.dat.as_raw();
        let msg = triplet.msg.as_raw();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: pointers are valid for the duration of the call per
            // the ManagerEntry contract; layouts are the repr(C) structs
            // the module was built against.
            unsafe { entry(origin, dest, group, dat, msg, payload) }
        }));

        match outcome {
            Ok(raw) => ResultCode::from_raw(raw),
            Err(_) => {
                warn!(triplet = %triplet, "unwind caught at manager boundary");
                ResultCode::Failure
            }
        }
    }
}

impl ManagerEntry for NativeManager {
    fn call(
        &self,
        origin: &AppIdentity,
        dest: Option<&SourceIdentity>,
        triplet: Triplet,
        payload: &mut Payload,
    ) -> ResultCode {
        let origin_wire = wire::WireIdentity::from_app(origin);
        let mut dest_wire = dest.map(wire::WireIdentity::from_source);
        let dest_ptr = dest_wire
            .as_mut()
            .map_or(std::ptr::null_mut(), |d| d as *mut _);

        marshal_and_call(self, &origin_wire, dest_ptr, triplet, payload)
    }

    fn is_legacy(&self) -> bool {
        self.legacy
    }
}

/// Build the wire payload for the triplet, issue the call, and copy results
/// back into the safe payload.
fn marshal_and_call(
    manager: &NativeManager,
    origin: &wire::WireIdentity,
    dest: *mut wire::WireIdentity,
    triplet: Triplet,
    payload: &mut Payload,
) -> ResultCode {
    let origin_ptr = origin as *const _;

    match payload {
        Payload::None => {
            manager.raw_call(origin_ptr, dest, triplet, std::ptr::null_mut())
        }

        Payload::Identity(identity) => {
            let mut w = wire::WireIdentity::from_source(identity);
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                *identity = w.to_source();
            }
            rc
        }

        Payload::Status(status) => {
            let mut w = wire::WireStatus::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                status.condition = Some(ConditionCode::from_raw(w.condition_code));
            }
            rc
        }

        Payload::Capability(cap) => {
            // Fixed scratch space for containers coming back from the
            // device; 64 items covers every enumeration seen in practice.
            let mut items = [0u32; 64];
            let mut w = cap_to_wire(cap.id, cap.container.as_ref(), &mut items);
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                cap.container = wire_to_container(&w, &items);
            }
            rc
        }

        Payload::UserInterface(ui) => {
            let mut w = wire::WireUserInterface {
                show_ui: u16::from(ui.show_ui),
                modal_ui: u16::from(ui.modal),
                parent: std::ptr::null_mut(),
            };
            manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void)
        }

        Payload::PendingXfers(pending) => {
            let mut w = wire::WirePendingXfers::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                pending.count = w.signed_count();
            }
            rc
        }

        Payload::SetupMemXfer(setup) => {
            let mut w = wire::WireSetupMemXfer::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                setup.min_size = w.min_size;
                setup.max_size = w.max_size;
                setup.preferred = w.preferred;
            }
            rc
        }

        Payload::SetupFileXfer(setup) => {
            let mut w = wire::WireSetupFileXfer::default();
            w.set_name(&setup.path.to_string_lossy());
            w.format = setup.format.as_raw();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                setup.path = PathBuf::from(w.name());
                setup.format = match w.format {
                    2 => FileFormat::Bmp,
                    4 => FileFormat::Jpeg,
                    7 => FileFormat::Png,
                    _ => FileFormat::Tiff,
                };
            }
            rc
        }

        Payload::ImageInfo(info) => {
            let mut w = wire::WireImageInfo::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                *info = w.to_info();
            }
            rc
        }

        Payload::ImageLayout(layout) => {
            let mut w = wire::WireImageLayout::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                *layout = w.to_layout();
            }
            rc
        }

        Payload::MemXfer(mem) => {
            let mut w = wire::WireMemXfer {
                buffer: mem.buffer.as_mut_ptr(),
                buffer_len: mem.buffer.len() as u32,
                bytes_written: 0,
                rows: 0,
                columns: 0,
                y_offset: 0,
            };
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() {
                mem.bytes_written = w.bytes_written.min(w.buffer_len);
                mem.rows = w.rows;
                mem.columns = w.columns;
                mem.y_offset = w.y_offset;
            }
            rc
        }

        Payload::NativeXfer(native) => {
            let mut w = wire::WireNativeXfer::default();
            let rc = manager.raw_call(origin_ptr, dest, triplet, &mut w as *mut _ as *mut c_void);
            if rc.is_success() && !w.handle.is_null() && w.len > 0 {
                // Copy out of the manager-owned buffer, then release it
                // exactly once through the callback it provided.
                // SAFETY: the manager guarantees handle/len validity on a
                // success result.
                let data =
                    unsafe { std::slice::from_raw_parts(w.handle, w.len as usize) }.to_vec();
                if let Some(release) = w.release {
                    unsafe { release(w.handle) };
                }
                native.handle = Some(data);
            }
            rc
        }
    }
}

fn cap_to_wire(
    id: CapId,
    container: Option<&CapContainer>,
    items: &mut [u32; 64],
) -> wire::WireCapability {
    use scanwerk_core::types::ContainerKinds;

    let mut w = wire::WireCapability {
        cap_id: id.0,
        count: items.len() as u32,
        items: items.as_mut_ptr(),
        ..Default::default()
    };

    match container {
        None => {}
        Some(CapContainer::OneValue { item_type, value }) => {
            w.container_kind = u16::from(ContainerKinds::ONE_VALUE);
            w.item_type = item_type.as_raw();
            w.current = *value;
        }
        Some(CapContainer::Range {
            item_type,
            min,
            max,
            step,
            default,
            current,
        }) => {
            w.container_kind = u16::from(ContainerKinds::RANGE);
            w.item_type = item_type.as_raw();
            w.min = *min;
            w.max = *max;
            w.step = *step;
            w.default_value = *default;
            w.current = *current;
        }
        Some(CapContainer::Enumeration {
            item_type,
            items: vals,
            current_index,
            default_index,
        }) => {
            w.container_kind = u16::from(ContainerKinds::ENUMERATION);
            w.item_type = item_type.as_raw();
            let n = vals.len().min(items.len());
            items[..n].copy_from_slice(&vals[..n]);
            w.count = n as u32;
            w.current = *current_index;
            w.default_value = *default_index;
        }
        Some(CapContainer::Array {
            item_type,
            items: vals,
        }) => {
            w.container_kind = u16::from(ContainerKinds::ARRAY);
            w.item_type = item_type.as_raw();
            let n = vals.len().min(items.len());
            items[..n].copy_from_slice(&vals[..n]);
            w.count = n as u32;
        }
    }

    w
}

fn wire_to_container(w: &wire::WireCapability, items: &[u32; 64]) -> Option<CapContainer> {
    use scanwerk_core::types::ContainerKinds;

    let item_type = ItemType::from_raw(w.item_type).unwrap_or(ItemType::U32);
    let count = (w.count as usize).min(items.len());

    match u8::try_from(w.container_kind).unwrap_or(0) {
        ContainerKinds::ONE_VALUE => Some(CapContainer::OneValue {
            item_type,
            value: w.current,
        }),
        ContainerKinds::RANGE => Some(CapContainer::Range {
            item_type,
            min: w.min,
            max: w.max,
            step: w.step,
            default: w.default_value,
            current: w.current,
        }),
        ContainerKinds::ENUMERATION => Some(CapContainer::Enumeration {
            item_type,
            items: items[..count].to_vec(),
            current_index: w.current,
            default_index: w.default_value,
        }),
        ContainerKinds::ARRAY => Some(CapContainer::Array {
            item_type,
            items: items[..count].to_vec(),
        }),
        _ => None,
    }
}

/// Stand-in used when the module failed to load but a binding object is
/// still needed. Every call fails fast with the manager-unavailable
/// sentinel and never touches the payload.
pub struct UnavailableManager;

impl ManagerEntry for UnavailableManager {
    fn call(
        &self,
        _origin: &AppIdentity,
        _dest: Option<&SourceIdentity>,
        triplet: Triplet,
        _payload: &mut Payload,
    ) -> ResultCode {
        debug!(triplet = %triplet, "call rejected: manager unavailable");
        ResultCode::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StatusPayload;
    use crate::triplet::{Dat, Msg};

    #[test]
    fn missing_module_is_manager_unavailable() {
        let err = NativeManager::load(Path::new("/nonexistent/libtwaindsm.so"), false)
            .err()
            .expect("load must fail");
        assert!(matches!(err, ScanwerkError::ManagerUnavailable(_)));
    }

    #[test]
    fn empty_search_dirs_yield_not_found() {
        let config = EngineConfig {
            search_dirs: vec![PathBuf::from("/nonexistent")],
            ..Default::default()
        };
        let err = load_manager(&config).err().expect("must fail");
        assert!(matches!(err, ScanwerkError::ManagerNotFound));
    }

    #[test]
    fn unavailable_manager_fails_without_touching_payload() {
        let mgr = UnavailableManager;
        let app = AppIdentity::new("Scanwerk", "Engine", "Test");
        let mut payload = Payload::Status(StatusPayload::default());
        let rc = mgr.call(
            &app,
            None,
            Triplet::control(Dat::Status, Msg::Get),
            &mut payload,
        );
        assert_eq!(rc, ResultCode::Failure);
        match payload {
            Payload::Status(s) => assert!(s.condition.is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn cap_marshalling_round_trip() {
        let mut items = [0u32; 64];
        let container = CapContainer::Enumeration {
            item_type: ItemType::U16,
            items: vec![1, 2, 4],
            current_index: 1,
            default_index: 0,
        };
        let w = cap_to_wire(CapId::PIXEL_TYPE, Some(&container), &mut items);
        assert_eq!(w.cap_id, CapId::PIXEL_TYPE.0);
        let back = wire_to_container(&w, &items).expect("container");
        assert_eq!(back, container);
    }
}

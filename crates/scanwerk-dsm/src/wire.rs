// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// repr(C) structures crossing the manager entry point.
//
// The entry point is `(origin*, dest*, group: u32, dat: u16, msg: u16,
// payload: *mut c_void) -> u16`. These structs define the payload layouts
// for each data argument type. String fields are fixed-size NUL-padded
// byte arrays, as the native ABI requires.

use std::ffi::c_void;

use scanwerk_core::types::{
    AppIdentity, ImageInfo, ImageLayout, PixelType, ProtocolVersion, SourceIdentity, VersionInfo,
};

/// Fixed-size string field: 32 usable bytes plus two NULs.
pub const STR32_LEN: usize = 34;

/// NUL-padded fixed string as it appears inside wire structs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireStr32(pub [u8; STR32_LEN]);

impl WireStr32 {
    pub fn from_str(s: &str) -> Self {
        let mut buf = [0u8; STR32_LEN];
        let bytes = s.as_bytes();
        let n = bytes.len().min(STR32_LEN - 2);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(STR32_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl Default for WireStr32 {
    fn default() -> Self {
        Self([0u8; STR32_LEN])
    }
}

/// Version block inside an identity record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireVersion {
    pub major: u16,
    pub minor: u16,
    pub language: u16,
    pub country: u16,
    pub info: WireStr32,
}

impl WireVersion {
    pub fn from_info(v: &VersionInfo) -> Self {
        Self {
            major: v.major,
            minor: v.minor,
            language: v.language,
            country: v.country,
            info: WireStr32::from_str(&v.info),
        }
    }

    pub fn to_info(&self) -> VersionInfo {
        VersionInfo {
            major: self.major,
            minor: self.minor,
            language: self.language,
            country: self.country,
            info: self.info.to_string_lossy(),
        }
    }
}

/// Identity record — the origin/destination of every call, and the payload
/// of discovery and open/close triplets.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireIdentity {
    pub id: u32,
    pub version: WireVersion,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    pub supported_groups: u32,
    pub manufacturer: WireStr32,
    pub product_family: WireStr32,
    pub product_name: WireStr32,
}

impl WireIdentity {
    pub fn from_app(app: &AppIdentity) -> Self {
        Self {
            id: 0,
            version: WireVersion::from_info(&app.version),
            protocol_major: app.protocol.major,
            protocol_minor: app.protocol.minor,
            supported_groups: app.supported_groups,
            manufacturer: WireStr32::from_str(&app.manufacturer),
            product_family: WireStr32::from_str(&app.product_family),
            product_name: WireStr32::from_str(&app.product_name),
        }
    }

    pub fn from_source(src: &SourceIdentity) -> Self {
        Self {
            id: src.id,
            version: WireVersion::from_info(&src.version),
            protocol_major: src.protocol.major,
            protocol_minor: src.protocol.minor,
            supported_groups: src.supported_groups,
            manufacturer: WireStr32::from_str(&src.manufacturer),
            product_family: WireStr32::from_str(&src.product_family),
            product_name: WireStr32::from_str(&src.product_name),
        }
    }

    pub fn to_source(&self) -> SourceIdentity {
        SourceIdentity {
            id: self.id,
            version: self.version.to_info(),
            protocol: ProtocolVersion {
                major: self.protocol_major,
                minor: self.protocol_minor,
            },
            supported_groups: self.supported_groups,
            manufacturer: self.manufacturer.to_string_lossy(),
            product_family: self.product_family.to_string_lossy(),
            product_name: self.product_name.to_string_lossy(),
        }
    }
}

/// Status payload: the source writes its condition code here.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireStatus {
    pub condition_code: u16,
    pub reserved: u16,
}

/// UI enable/disable payload. `parent` is an opaque window handle the core
/// never dereferences; it is passed through as NULL.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireUserInterface {
    pub show_ui: u16,
    pub modal_ui: u16,
    pub parent: *mut c_void,
}

/// Pending-transfer counter. `count` of 0xFFFF means "unknown, more pending".
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WirePendingXfers {
    pub count: u16,
    pub reserved: u32,
}

impl WirePendingXfers {
    pub const UNKNOWN: u16 = 0xFFFF;

    pub fn signed_count(&self) -> i32 {
        if self.count == Self::UNKNOWN {
            -1
        } else {
            i32::from(self.count)
        }
    }
}

/// Buffered-transfer size bounds, filled by the source.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireSetupMemXfer {
    pub min_size: u32,
    pub max_size: u32,
    pub preferred: u32,
}

/// File-transfer negotiation payload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireSetupFileXfer {
    pub file_name: [u8; 256],
    pub format: u16,
}

impl Default for WireSetupFileXfer {
    fn default() -> Self {
        Self {
            file_name: [0u8; 256],
            format: 0,
        }
    }
}

impl WireSetupFileXfer {
    pub fn set_name(&mut self, name: &str) {
        self.file_name = [0u8; 256];
        let bytes = name.as_bytes();
        let n = bytes.len().min(255);
        self.file_name[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn name(&self) -> String {
        let end = self
            .file_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.file_name.len());
        String::from_utf8_lossy(&self.file_name[..end]).into_owned()
    }
}

/// Pre-transfer image geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireImageInfo {
    pub x_resolution: f64,
    pub y_resolution: f64,
    pub width: i32,
    pub height: i32,
    pub bits_per_pixel: u16,
    pub pixel_type: u16,
}

impl WireImageInfo {
    pub fn to_info(&self) -> ImageInfo {
        ImageInfo {
            width: self.width,
            height: self.height,
            bits_per_pixel: self.bits_per_pixel,
            pixel_type: PixelType::from_raw(self.pixel_type).unwrap_or(PixelType::Rgb),
            x_resolution: self.x_resolution,
            y_resolution: self.y_resolution,
        }
    }
}

/// Frame origin/extent in the device's current unit.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WireImageLayout {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub unit: u16,
    pub document_number: u32,
    pub page_number: u32,
    pub frame_number: u32,
}

impl WireImageLayout {
    pub fn to_layout(&self) -> ImageLayout {
        ImageLayout {
            frame: scanwerk_core::types::Frame {
                left: self.left,
                top: self.top,
                right: self.right,
                bottom: self.bottom,
            },
            unit: scanwerk_core::types::Unit::from_raw(self.unit)
                .unwrap_or(scanwerk_core::types::Unit::Inches),
            document_number: self.document_number,
            page_number: self.page_number,
            frame_number: self.frame_number,
        }
    }
}

/// Capability container, flattened for the wire. `container_kind` selects
/// which fields are meaningful (one of the `ContainerKinds` bits, or 0 when
/// the payload is a bare get). `items`/`count` are caller-allocated: `count`
/// carries the capacity on input and the number written on output.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireCapability {
    pub cap_id: u16,
    pub container_kind: u16,
    pub item_type: u16,
    pub current: u32,
    pub default_value: u32,
    pub min: u32,
    pub max: u32,
    pub step: u32,
    pub count: u32,
    pub items: *mut u32,
}

impl Default for WireCapability {
    fn default() -> Self {
        Self {
            cap_id: 0,
            container_kind: 0,
            item_type: 0,
            current: 0,
            default_value: 0,
            min: 0,
            max: 0,
            step: 0,
            count: 0,
            items: std::ptr::null_mut(),
        }
    }
}

/// One buffered strip. The application owns `buffer`; the source writes
/// into it and reports how much.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireMemXfer {
    pub buffer: *mut u8,
    pub buffer_len: u32,
    pub bytes_written: u32,
    pub rows: u32,
    pub columns: u32,
    pub y_offset: u32,
}

/// Native handoff: the manager fills `handle`/`len` with a buffer it
/// allocated; the application takes ownership and frees it through
/// `release` exactly once.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireNativeXfer {
    pub handle: *mut u8,
    pub len: u32,
    pub release: Option<unsafe extern "C" fn(*mut u8)>,
}

impl Default for WireNativeXfer {
    fn default() -> Self {
        Self {
            handle: std::ptr::null_mut(),
            len: 0,
            release: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str32_round_trip() {
        let s = WireStr32::from_str("Fujitsu fi-7160");
        assert_eq!(s.to_string_lossy(), "Fujitsu fi-7160");
    }

    #[test]
    fn str32_truncates_long_names() {
        let long = "x".repeat(100);
        let s = WireStr32::from_str(&long);
        // 32 usable bytes, always NUL terminated.
        assert_eq!(s.to_string_lossy().len(), STR32_LEN - 2);
        assert_eq!(s.0[STR32_LEN - 1], 0);
    }

    #[test]
    fn identity_round_trip() {
        let src = SourceIdentity {
            id: 7,
            version: VersionInfo::default(),
            protocol: ProtocolVersion::CURRENT,
            supported_groups: 0x3,
            manufacturer: "Acme".into(),
            product_family: "ScanJet".into(),
            product_name: "ScanJet 900".into(),
        };
        let wire = WireIdentity::from_source(&src);
        assert_eq!(wire.to_source(), src);
    }

    #[test]
    fn pending_unknown_maps_to_minus_one() {
        let p = WirePendingXfers {
            count: WirePendingXfers::UNKNOWN,
            reserved: 0,
        };
        assert_eq!(p.signed_count(), -1);
        let p = WirePendingXfers {
            count: 2,
            reserved: 0,
        };
        assert_eq!(p.signed_count(), 2);
    }

    #[test]
    fn file_xfer_name_round_trip() {
        let mut f = WireSetupFileXfer::default();
        f.set_name("/tmp/scan-0001.tif");
        assert_eq!(f.name(), "/tmp/scan-0001.tif");
    }
}

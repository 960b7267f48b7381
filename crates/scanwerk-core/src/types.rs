// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk acquisition engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an acquisition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Wire-level codes
// ---------------------------------------------------------------------------

/// Protocol data groups. Every triplet is addressed to exactly one group;
/// identity records advertise a supported-groups bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataGroup {
    /// Session, capability, and status messages.
    Control,
    /// Image transfer messages.
    Image,
    /// Audio transfer messages.
    Audio,
}

impl DataGroup {
    /// Wire bitmask value for this group.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Control => 0x0001,
            Self::Image => 0x0002,
            Self::Audio => 0x0004,
        }
    }

    /// Combine groups into a supported-groups bitmask.
    pub fn mask(groups: &[DataGroup]) -> u32 {
        groups.iter().fold(0, |m, g| m | g.raw())
    }
}

/// Raw result code returned by every manager entry-point call.
///
/// These are the only terminal states a protocol call produces; everything
/// finer-grained comes from the follow-up condition-code query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Success,
    Failure,
    /// Success with a condition worth inspecting (e.g. value clamped).
    CheckStatus,
    /// The user or device cancelled the operation.
    Cancel,
    /// All pending transfers for the job are complete.
    XferDone,
    /// Device enumeration reached the end of the list.
    EndOfList,
    /// The source does not implement the requested operation.
    InfoNotSupported,
    /// The requested data exists but is not available yet.
    DataNotAvailable,
    /// A code this engine does not know. Treated as failure.
    Unknown(u16),
}

impl ResultCode {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::Failure,
            2 => Self::CheckStatus,
            3 => Self::Cancel,
            6 => Self::XferDone,
            7 => Self::EndOfList,
            8 => Self::InfoNotSupported,
            9 => Self::DataNotAvailable,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::CheckStatus => 2,
            Self::Cancel => 3,
            Self::XferDone => 6,
            Self::EndOfList => 7,
            Self::InfoNotSupported => 8,
            Self::DataNotAvailable => 9,
            Self::Unknown(raw) => *raw,
        }
    }

    /// Whether the call delivered its payload (CheckStatus counts as
    /// success-with-followup).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::CheckStatus | Self::XferDone)
    }
}

/// Detailed failure reason, retrieved via the status triplet after a
/// failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionCode {
    Success,
    /// General catastrophic failure.
    Bummer,
    LowMemory,
    /// No device-manager or no source available.
    NoSource,
    MaxConnections,
    OperationError,
    BadCapability,
    BadProtocol,
    BadValue,
    SequenceError,
    BadDestination,
    CapUnsupported,
    CapBadOperation,
    CapSequenceError,
    /// File-system permission denied.
    Denied,
    FileExists,
    FileNotFound,
    NotEmpty,
    PaperJam,
    PaperDoubleFeed,
    FileWriteError,
    DeviceOffline,
    InterlockOpen,
    DamagedCorner,
    FocusError,
    DocTooLight,
    DocTooDark,
    NoMedia,
    Unknown(u16),
}

impl ConditionCode {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::Bummer,
            2 => Self::LowMemory,
            3 => Self::NoSource,
            4 => Self::MaxConnections,
            5 => Self::OperationError,
            6 => Self::BadCapability,
            9 => Self::BadProtocol,
            10 => Self::BadValue,
            11 => Self::SequenceError,
            12 => Self::BadDestination,
            13 => Self::CapUnsupported,
            14 => Self::CapBadOperation,
            15 => Self::CapSequenceError,
            16 => Self::Denied,
            17 => Self::FileExists,
            18 => Self::FileNotFound,
            19 => Self::NotEmpty,
            20 => Self::PaperJam,
            21 => Self::PaperDoubleFeed,
            22 => Self::FileWriteError,
            23 => Self::DeviceOffline,
            24 => Self::InterlockOpen,
            25 => Self::DamagedCorner,
            26 => Self::FocusError,
            27 => Self::DocTooLight,
            28 => Self::DocTooDark,
            29 => Self::NoMedia,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Success => 0,
            Self::Bummer => 1,
            Self::LowMemory => 2,
            Self::NoSource => 3,
            Self::MaxConnections => 4,
            Self::OperationError => 5,
            Self::BadCapability => 6,
            Self::BadProtocol => 9,
            Self::BadValue => 10,
            Self::SequenceError => 11,
            Self::BadDestination => 12,
            Self::CapUnsupported => 13,
            Self::CapBadOperation => 14,
            Self::CapSequenceError => 15,
            Self::Denied => 16,
            Self::FileExists => 17,
            Self::FileNotFound => 18,
            Self::NotEmpty => 19,
            Self::PaperJam => 20,
            Self::PaperDoubleFeed => 21,
            Self::FileWriteError => 22,
            Self::DeviceOffline => 23,
            Self::InterlockOpen => 24,
            Self::DamagedCorner => 25,
            Self::FocusError => 26,
            Self::DocTooLight => 27,
            Self::DocTooDark => 28,
            Self::NoMedia => 29,
            Self::Unknown(raw) => *raw,
        }
    }
}

impl std::fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown condition {raw}"),
            other => write!(f, "{other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Protocol revision spoken by one side of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// The current protocol generation.
    pub const CURRENT: Self = Self { major: 2, minor: 4 };
    /// The last legacy generation, pre-filled when a legacy manager module
    /// is loaded.
    pub const LEGACY: Self = Self { major: 1, minor: 9 };
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Software version info carried inside an identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    /// Language code (resource-table key space).
    pub language: u16,
    /// Country code.
    pub country: u16,
    pub info: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            language: 0,
            country: 0,
            info: String::new(),
        }
    }
}

/// The application's identity, registered with the manager at session open.
/// Created once per process at session start; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub version: VersionInfo,
    pub protocol: ProtocolVersion,
    /// Bitmask of `DataGroup` values this application wants.
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl AppIdentity {
    pub fn new(manufacturer: &str, product_family: &str, product_name: &str) -> Self {
        Self {
            version: VersionInfo::default(),
            protocol: ProtocolVersion::CURRENT,
            supported_groups: DataGroup::mask(&[DataGroup::Control, DataGroup::Image]),
            manufacturer: manufacturer.into(),
            product_family: product_family.into(),
            product_name: product_name.into(),
        }
    }

    /// Request audio transfers in addition to images.
    pub fn with_audio(mut self) -> Self {
        self.supported_groups |= DataGroup::Audio.raw();
        self
    }
}

/// A connected device as the manager reports it. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    /// Manager-assigned id, unique while the session is open.
    pub id: u32,
    pub version: VersionInfo,
    pub protocol: ProtocolVersion,
    /// Bitmask of `DataGroup` values the device supports.
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl SourceIdentity {
    pub fn supports_group(&self, group: DataGroup) -> bool {
        self.supported_groups & group.raw() != 0
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Numeric capability identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapId(pub u16);

impl CapId {
    /// Number of transfers the application will accept for this job.
    pub const XFER_COUNT: CapId = CapId(0x0001);
    /// Whether the feeder is enabled (vs flatbed).
    pub const FEEDER_ENABLED: CapId = CapId(0x1002);
    /// Whether the device can report paper in the feeder.
    pub const PAPER_DETECTABLE: CapId = CapId(0x100d);
    /// Whether the source UI can be suppressed.
    pub const UI_CONTROLLABLE: CapId = CapId(0x100e);
    /// Hardware duplex support (0 none / 1 one-pass / 2 two-pass).
    pub const DUPLEX: CapId = CapId(0x1012);
    /// Whether duplex scanning is switched on.
    pub const DUPLEX_ENABLED: CapId = CapId(0x1013);
    /// Number of physical sheets to feed (preferred over doubling
    /// XFER_COUNT on duplex devices).
    pub const SHEET_COUNT: CapId = CapId(0x102d);
    /// Compression applied to transferred image data.
    pub const COMPRESSION: CapId = CapId(0x0100);
    /// Pixel type of acquired images.
    pub const PIXEL_TYPE: CapId = CapId(0x0101);
    /// Measurement unit for layout frames.
    pub const UNITS: CapId = CapId(0x0102);
    /// The negotiated transfer mechanism.
    pub const XFER_MECH: CapId = CapId(0x0103);
    /// On-disk format for file transfers.
    pub const IMAGE_FILE_FORMAT: CapId = CapId(0x0110);
    /// Horizontal resolution in current units.
    pub const X_RESOLUTION: CapId = CapId(0x1118);
    /// Vertical resolution in current units.
    pub const Y_RESOLUTION: CapId = CapId(0x1119);
    /// Bits per channel.
    pub const BIT_DEPTH: CapId = CapId(0x112b);

    /// Capability ids at or above this value are vendor/custom space.
    pub const CUSTOM_BASE: u16 = 0x8000;

    pub fn is_custom(&self) -> bool {
        self.0 >= Self::CUSTOM_BASE
    }
}

impl std::fmt::Display for CapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Bitmask of container shapes a capability may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerKinds(pub u8);

impl ContainerKinds {
    pub const ONE_VALUE: u8 = 0x01;
    pub const ARRAY: u8 = 0x02;
    pub const ENUMERATION: u8 = 0x04;
    pub const RANGE: u8 = 0x08;

    pub const NONE: ContainerKinds = ContainerKinds(0);
    pub const ALL: ContainerKinds = ContainerKinds(0x0f);

    pub fn contains(&self, kind: u8) -> bool {
        self.0 & kind != 0
    }
}

/// Bitmask of operations a capability supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpFlags(pub u16);

impl OpFlags {
    pub const GET: u16 = 0x0001;
    pub const SET: u16 = 0x0002;
    pub const GET_DEFAULT: u16 = 0x0004;
    pub const GET_CURRENT: u16 = 0x0008;
    pub const RESET: u16 = 0x0010;
    pub const SET_CONSTRAINT: u16 = 0x0020;
    pub const QUERY_SUPPORT: u16 = 0x0040;

    pub const NONE: OpFlags = OpFlags(0);
    /// Everything a fully negotiable capability offers.
    pub const FULL: OpFlags = OpFlags(0x007f);
    /// Read-only capabilities: all the gets plus query-support.
    pub const GET_ONLY: OpFlags = OpFlags(0x004d);

    pub fn contains(&self, op: u16) -> bool {
        self.0 & op != 0
    }
}

/// Item data type tag carried in capability containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    Bool,
    /// 16.16 fixed point.
    Fix32,
    Frame,
    Str32,
    Str64,
    Str128,
    Str255,
}

impl ItemType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::I8,
            1 => Self::I16,
            2 => Self::I32,
            3 => Self::U8,
            4 => Self::U16,
            5 => Self::U32,
            6 => Self::Bool,
            7 => Self::Fix32,
            8 => Self::Frame,
            9 => Self::Str32,
            10 => Self::Str64,
            11 => Self::Str128,
            12 => Self::Str255,
            _ => return None,
        })
    }

    pub fn as_raw(&self) -> u16 {
        match self {
            Self::I8 => 0,
            Self::I16 => 1,
            Self::I32 => 2,
            Self::U8 => 3,
            Self::U16 => 4,
            Self::U32 => 5,
            Self::Bool => 6,
            Self::Fix32 => 7,
            Self::Frame => 8,
            Self::Str32 => 9,
            Self::Str64 => 10,
            Self::Str128 => 11,
            Self::Str255 => 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

/// Pixel interpretation of acquired images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    BlackWhite,
    Gray,
    Rgb,
    Palette,
    Cmy,
    Cmyk,
    Yuv,
}

impl PixelType {
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::BlackWhite => 0,
            Self::Gray => 1,
            Self::Rgb => 2,
            Self::Palette => 3,
            Self::Cmy => 4,
            Self::Cmyk => 5,
            Self::Yuv => 6,
        }
    }

    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::BlackWhite,
            1 => Self::Gray,
            2 => Self::Rgb,
            3 => Self::Palette,
            4 => Self::Cmy,
            5 => Self::Cmyk,
            6 => Self::Yuv,
            _ => return None,
        })
    }
}

/// Measurement unit for layout frames and resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Inches,
    Centimeters,
    Picas,
    Points,
    Twips,
    Pixels,
}

impl Unit {
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Inches => 0,
            Self::Centimeters => 1,
            Self::Picas => 2,
            Self::Points => 3,
            Self::Twips => 4,
            Self::Pixels => 5,
        }
    }

    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Inches,
            1 => Self::Centimeters,
            2 => Self::Picas,
            3 => Self::Points,
            4 => Self::Twips,
            5 => Self::Pixels,
            _ => return None,
        })
    }
}

/// The agreed method for moving image bytes from device to application.
///
/// A closed set fixed by the protocol itself; selected once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMechanism {
    /// Manager allocates and returns one full image buffer.
    Native,
    /// Manager/device writes directly to disk.
    File,
    /// Application-supplied fixed-size strips across repeated calls.
    Buffered,
    /// Native handoff over the audio data group.
    AudioNative,
}

impl TransferMechanism {
    /// Wire value negotiated through the XFER_MECH capability. Audio has no
    /// wire value — the group on the transfer triplet distinguishes it.
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Native | Self::AudioNative => 0,
            Self::File => 1,
            Self::Buffered => 2,
        }
    }

    pub fn data_group(&self) -> DataGroup {
        match self {
            Self::AudioNative => DataGroup::Audio,
            _ => DataGroup::Image,
        }
    }
}

/// On-disk format for file transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    Tiff,
    Bmp,
    Jpeg,
    Png,
}

impl FileFormat {
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Tiff => 0,
            Self::Bmp => 2,
            Self::Jpeg => 4,
            Self::Png => 7,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Where acquired page data ends up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// Hand the image buffer to the caller.
    Memory,
    /// Write to disk via the file transfer mechanism.
    File { path: PathBuf, format: FileFormat },
    /// Acquire and immediately discard (e.g. clipboard page 2..n).
    Discard,
}

/// What to do when a page-level protocol failure occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnPageFail {
    /// Stop, reporting the pages acquired so far.
    Terminate,
    /// Re-attempt the same page, bounded by the configured retry count.
    Retry,
}

/// Policy applied when closing a session or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosePolicy {
    /// Refuse to close while a source is mid-transfer.
    Graceful,
    /// Disable UI and abandon in-flight transfers first.
    Force,
}

/// Lifecycle states of a connected source.
///
/// No image-transfer triplet may be issued below `TransferReady`; no
/// capability mutation may be issued while `Transferring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceState {
    Closed,
    Opened,
    UiEnabled,
    TransferReady,
    Transferring,
}

/// Image geometry reported by the device before a transfer.
///
/// Extents of -1 mean "undefined until scanned" — a feeder device often
/// cannot know the page length ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: i32,
    pub height: i32,
    pub bits_per_pixel: u16,
    pub pixel_type: PixelType,
    pub x_resolution: f64,
    pub y_resolution: f64,
}

impl ImageInfo {
    /// Sentinel for extents the device cannot report before scanning.
    pub const UNDEFINED: i32 = -1;

    pub fn width_known(&self) -> bool {
        self.width != Self::UNDEFINED
    }

    pub fn height_known(&self) -> bool {
        self.height != Self::UNDEFINED
    }
}

/// Frame origin and extent in the device's current unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Layout of the image about to be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageLayout {
    pub frame: Frame,
    pub unit: Unit,
    pub document_number: u32,
    pub page_number: u32,
    pub frame_number: u32,
}

/// One entry in the bounded error-history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub result: ResultCode,
    pub condition: ConditionCode,
    /// Triplet summary, e.g. "Control/Status/Get".
    pub operation: String,
}

/// Payload of one acquired page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageData {
    /// Whole-image buffer handed over by the manager (native transfer).
    /// Ownership transfers to the caller.
    Native(Vec<u8>),
    /// Image assembled from buffered strips.
    Memory(Vec<u8>),
    /// Written to disk by the manager/device.
    File(PathBuf),
    /// Audio clip handed over by the manager.
    Audio(Vec<u8>),
    /// Acquired but immediately dropped (Discard destination).
    Discarded,
}

/// One successfully acquired page.
#[derive(Debug, Clone)]
pub struct AcquiredPage {
    /// Zero-based page index within the job.
    pub index: u32,
    pub data: PageData,
    pub info: ImageInfo,
    /// Transfer attempts this page took (1 = no retries).
    pub attempts: u32,
}

/// Terminal status of an acquisition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquireStatus {
    /// All requested pages (or all the device had) were transferred.
    Completed,
    /// The user or device cancelled. Not an error.
    Cancelled,
    /// A page failure terminated the job under the failure policy.
    Terminated,
}

/// What a call to `acquire` returns.
#[derive(Debug)]
pub struct AcquireOutcome {
    pub job_id: JobId,
    pub status: AcquireStatus,
    pub pages: Vec<AcquiredPage>,
    /// Physical sheets fed, when the device reports them.
    pub sheets: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_round_trip() {
        for raw in [0u16, 1, 2, 3, 6, 7, 8, 9, 42] {
            assert_eq!(ResultCode::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn check_status_counts_as_success() {
        assert!(ResultCode::CheckStatus.is_success());
        assert!(ResultCode::XferDone.is_success());
        assert!(!ResultCode::Cancel.is_success());
        assert!(!ResultCode::Failure.is_success());
    }

    #[test]
    fn condition_code_unknown_preserved() {
        let cc = ConditionCode::from_raw(999);
        assert_eq!(cc, ConditionCode::Unknown(999));
        assert_eq!(cc.as_raw(), 999);
    }

    #[test]
    fn group_mask_combines() {
        let mask = DataGroup::mask(&[DataGroup::Control, DataGroup::Image]);
        assert_eq!(mask, 0x0003);
        let id = AppIdentity::new("Scanwerk", "Engine", "Test").with_audio();
        assert_eq!(id.supported_groups, 0x0007);
    }

    #[test]
    fn custom_capability_space() {
        assert!(CapId(0x8001).is_custom());
        assert!(!CapId::XFER_COUNT.is_custom());
    }

    #[test]
    fn op_flags_get_only_excludes_set() {
        assert!(OpFlags::GET_ONLY.contains(OpFlags::GET));
        assert!(OpFlags::GET_ONLY.contains(OpFlags::QUERY_SUPPORT));
        assert!(!OpFlags::GET_ONLY.contains(OpFlags::SET));
        assert!(!OpFlags::GET_ONLY.contains(OpFlags::RESET));
    }

    #[test]
    fn states_are_ordered() {
        assert!(SourceState::Closed < SourceState::Opened);
        assert!(SourceState::TransferReady < SourceState::Transferring);
    }

    #[test]
    fn undefined_extent_sentinel() {
        let info = ImageInfo {
            width: 2550,
            height: ImageInfo::UNDEFINED,
            bits_per_pixel: 24,
            pixel_type: PixelType::Rgb,
            x_resolution: 300.0,
            y_resolution: 300.0,
        };
        assert!(info.width_known());
        assert!(!info.height_known());
    }

    #[test]
    fn audio_mechanism_uses_audio_group() {
        assert_eq!(TransferMechanism::AudioNative.data_group(), DataGroup::Audio);
        assert_eq!(TransferMechanism::Buffered.data_group(), DataGroup::Image);
        // Audio shares the native wire value.
        assert_eq!(
            TransferMechanism::AudioNative.as_raw(),
            TransferMechanism::Native.as_raw()
        );
    }
}

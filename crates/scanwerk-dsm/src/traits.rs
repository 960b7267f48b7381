// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The manager-entry seam and the typed payloads that cross it.
//
// `ManagerEntry` is the single point of contact with the device-manager
// module. The engine never issues a raw call any other way, so state-machine
// legality can be enforced entirely on the caller side, and tests can swap
// in the scriptable stub.

use std::path::PathBuf;

use scanwerk_core::types::{
    AppIdentity, CapId, ConditionCode, FileFormat, ImageInfo, ImageLayout, ItemType, ResultCode,
    SourceIdentity,
};

use crate::triplet::Triplet;

/// The resolved manager entry point, viewed through a safe seam.
///
/// "Get"-style messages mutate the payload in place — that is the
/// protocol's convention for returning data. Implementations must never let
/// an unwind escape: the native side has no exception model, so any panic
/// is converted to the sentinel `ResultCode::Failure`.
pub trait ManagerEntry: Send + Sync {
    /// Issue one triplet. Identities must outlive the call; the payload
    /// layout must match the triplet's data argument type.
    fn call(
        &self,
        origin: &AppIdentity,
        dest: Option<&SourceIdentity>,
        triplet: Triplet,
        payload: &mut Payload,
    ) -> ResultCode;

    /// Whether the underlying module speaks the legacy (1.x) protocol.
    fn is_legacy(&self) -> bool {
        false
    }
}

/// Capability container shapes. A "get" returns whichever shape the source
/// chose; a "set" carries the shape the application chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapContainer {
    OneValue {
        item_type: ItemType,
        value: u32,
    },
    Range {
        item_type: ItemType,
        min: u32,
        max: u32,
        step: u32,
        default: u32,
        current: u32,
    },
    Enumeration {
        item_type: ItemType,
        items: Vec<u32>,
        current_index: u32,
        default_index: u32,
    },
    Array {
        item_type: ItemType,
        items: Vec<u32>,
    },
}

impl CapContainer {
    /// The current value, for shapes that have one.
    pub fn current(&self) -> Option<u32> {
        match self {
            Self::OneValue { value, .. } => Some(*value),
            Self::Range { current, .. } => Some(*current),
            Self::Enumeration {
                items,
                current_index,
                ..
            } => items.get(*current_index as usize).copied(),
            Self::Array { .. } => None,
        }
    }
}

/// Payload for capability triplets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapPayload {
    pub id: CapId,
    /// `None` going into a get; filled by the source. For a set, the
    /// application supplies it.
    pub container: Option<CapContainer>,
}

impl CapPayload {
    pub fn get(id: CapId) -> Self {
        Self {
            id,
            container: None,
        }
    }

    pub fn set_u32(id: CapId, item_type: ItemType, value: u32) -> Self {
        Self {
            id,
            container: Some(CapContainer::OneValue { item_type, value }),
        }
    }
}

/// Payload for the status triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusPayload {
    pub condition: Option<ConditionCode>,
}

/// Payload for UI enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserInterfacePayload {
    /// Whether the source should display its own UI.
    pub show_ui: bool,
    pub modal: bool,
}

/// Payload for the pending-transfers counter.
///
/// `count` of -1 means "more pages pending, exact number unknown" — the
/// usual feeder answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingXfersPayload {
    pub count: i32,
}

impl PendingXfersPayload {
    pub fn more_pending(&self) -> bool {
        self.count != 0
    }
}

/// Payload for buffered-transfer size negotiation. Filled by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupMemXferPayload {
    pub min_size: u32,
    pub max_size: u32,
    pub preferred: u32,
}

/// Payload for file-transfer negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFileXferPayload {
    pub path: PathBuf,
    pub format: FileFormat,
}

/// Payload for one buffered strip. The driver owns `buffer` and reuses it
/// across strips; the source fills it and reports geometry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemXferPayload {
    pub buffer: Vec<u8>,
    pub bytes_written: u32,
    pub rows: u32,
    pub columns: u32,
    pub y_offset: u32,
}

/// Payload for native whole-image (or whole-clip) handoff. The source
/// allocates and fills `handle`; ownership transfers to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeXferPayload {
    pub handle: Option<Vec<u8>>,
}

/// Every payload shape a triplet may carry.
#[derive(Debug)]
pub enum Payload {
    /// Triplets with no payload (manager open/close, session control).
    None,
    /// Identity records for discovery, selection, and device open/close.
    Identity(SourceIdentity),
    Status(StatusPayload),
    Capability(CapPayload),
    UserInterface(UserInterfacePayload),
    PendingXfers(PendingXfersPayload),
    SetupMemXfer(SetupMemXferPayload),
    SetupFileXfer(SetupFileXferPayload),
    ImageInfo(ImageInfo),
    ImageLayout(ImageLayout),
    MemXfer(MemXferPayload),
    NativeXfer(NativeXferPayload),
}

impl Payload {
    /// Name of the payload shape, for mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Identity(_) => "identity",
            Self::Status(_) => "status",
            Self::Capability(_) => "capability",
            Self::UserInterface(_) => "user-interface",
            Self::PendingXfers(_) => "pending-xfers",
            Self::SetupMemXfer(_) => "setup-mem-xfer",
            Self::SetupFileXfer(_) => "setup-file-xfer",
            Self::ImageInfo(_) => "image-info",
            Self::ImageLayout(_) => "image-layout",
            Self::MemXfer(_) => "mem-xfer",
            Self::NativeXfer(_) => "native-xfer",
        }
    }
}

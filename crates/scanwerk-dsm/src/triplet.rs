// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The triplet message vocabulary.
//
// Every protocol message is an addressing triple (data group, data argument
// type, message) plus origin/destination identities and a payload. The raw
// codes here are the wire values the manager entry point receives.

use scanwerk_core::types::DataGroup;

/// Data argument type — which payload structure the triplet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dat {
    /// Capability container.
    Capability,
    /// Application or source identity record.
    Identity,
    /// Manager-level session control.
    Parent,
    /// Pending-transfer counter.
    PendingXfers,
    /// Buffered-transfer size negotiation.
    SetupMemXfer,
    /// File-transfer name/format negotiation.
    SetupFileXfer,
    /// Condition-code query.
    Status,
    /// UI enable/disable control.
    UserInterface,
    /// Pre-transfer image geometry.
    ImageInfo,
    /// Frame origin/extent in current units.
    ImageLayout,
    /// One buffered strip.
    ImageMemXfer,
    /// Whole-image native handoff.
    ImageNativeXfer,
    /// Direct-to-disk transfer.
    ImageFileXfer,
    /// Whole-clip audio handoff.
    AudioNativeXfer,
}

impl Dat {
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Capability => 0x0001,
            Self::Identity => 0x0003,
            Self::Parent => 0x0004,
            Self::PendingXfers => 0x0005,
            Self::SetupMemXfer => 0x0006,
            Self::SetupFileXfer => 0x0007,
            Self::Status => 0x0008,
            Self::UserInterface => 0x0009,
            Self::ImageInfo => 0x0101,
            Self::ImageLayout => 0x0102,
            Self::ImageMemXfer => 0x0103,
            Self::ImageNativeXfer => 0x0104,
            Self::ImageFileXfer => 0x0105,
            Self::AudioNativeXfer => 0x0203,
        }
    }

    /// Whether this argument type moves image or audio data (and therefore
    /// requires the source to be at least transfer-ready).
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Self::ImageMemXfer
                | Self::ImageNativeXfer
                | Self::ImageFileXfer
                | Self::AudioNativeXfer
        )
    }
}

/// Message — the action requested of the manager or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Msg {
    Get,
    GetCurrent,
    GetDefault,
    GetFirst,
    GetNext,
    Set,
    Reset,
    QuerySupport,
    SetConstraint,
    /// Open the manager module itself.
    OpenDsm,
    CloseDsm,
    /// Register this application with the opened manager.
    OpenSession,
    CloseSession,
    /// Open a connection to one device.
    OpenDs,
    CloseDs,
    /// Ask the manager to run its device-selection dialog.
    UserSelect,
    DisableDs,
    EnableDs,
    /// Acknowledge the end of one page transfer.
    EndXfer,
    StopFeeder,
}

impl Msg {
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Get => 0x0001,
            Self::GetCurrent => 0x0002,
            Self::GetDefault => 0x0003,
            Self::GetFirst => 0x0004,
            Self::GetNext => 0x0005,
            Self::Set => 0x0006,
            Self::Reset => 0x0007,
            Self::QuerySupport => 0x0008,
            Self::SetConstraint => 0x0009,
            Self::OpenDsm => 0x0301,
            Self::CloseDsm => 0x0302,
            Self::OpenSession => 0x0303,
            Self::CloseSession => 0x0304,
            Self::OpenDs => 0x0401,
            Self::CloseDs => 0x0402,
            Self::UserSelect => 0x0403,
            Self::DisableDs => 0x0501,
            Self::EnableDs => 0x0502,
            Self::EndXfer => 0x0701,
            Self::StopFeeder => 0x0702,
        }
    }

    /// Whether this message mutates source state on the device side.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Set | Self::SetConstraint | Self::Reset)
    }
}

/// One addressable protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triplet {
    pub group: DataGroup,
    pub dat: Dat,
    pub msg: Msg,
}

impl Triplet {
    pub fn new(group: DataGroup, dat: Dat, msg: Msg) -> Self {
        Self { group, dat, msg }
    }

    /// Control-group shorthand — most session and capability traffic.
    pub fn control(dat: Dat, msg: Msg) -> Self {
        Self::new(DataGroup::Control, dat, msg)
    }

    pub fn image(dat: Dat, msg: Msg) -> Self {
        Self::new(DataGroup::Image, dat, msg)
    }

    pub fn audio(dat: Dat, msg: Msg) -> Self {
        Self::new(DataGroup::Audio, dat, msg)
    }

    /// Short form for logs and error records, e.g. "Image/ImageMemXfer/Get".
    pub fn summary(&self) -> String {
        format!("{:?}/{:?}/{:?}", self.group, self.dat, self.msg)
    }
}

impl std::fmt::Display for Triplet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_dats_are_flagged() {
        assert!(Dat::ImageNativeXfer.is_transfer());
        assert!(Dat::ImageMemXfer.is_transfer());
        assert!(Dat::AudioNativeXfer.is_transfer());
        assert!(!Dat::Capability.is_transfer());
        assert!(!Dat::Status.is_transfer());
    }

    #[test]
    fn mutation_messages_are_flagged() {
        assert!(Msg::Set.is_mutation());
        assert!(Msg::Reset.is_mutation());
        assert!(!Msg::Get.is_mutation());
        assert!(!Msg::QuerySupport.is_mutation());
    }

    #[test]
    fn raw_codes_are_distinct() {
        let dats = [
            Dat::Capability,
            Dat::Identity,
            Dat::Parent,
            Dat::PendingXfers,
            Dat::SetupMemXfer,
            Dat::SetupFileXfer,
            Dat::Status,
            Dat::UserInterface,
            Dat::ImageInfo,
            Dat::ImageLayout,
            Dat::ImageMemXfer,
            Dat::ImageNativeXfer,
            Dat::ImageFileXfer,
            Dat::AudioNativeXfer,
        ];
        let mut raws: Vec<u16> = dats.iter().map(|d| d.as_raw()).collect();
        raws.sort_unstable();
        raws.dedup();
        assert_eq!(raws.len(), dats.len());
    }

    #[test]
    fn summary_reads_naturally() {
        let t = Triplet::control(Dat::Status, Msg::Get);
        assert_eq!(t.summary(), "Control/Status/Get");
    }
}

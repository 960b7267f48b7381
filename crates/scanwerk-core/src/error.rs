// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use thiserror::Error;

use crate::types::{ConditionCode, SourceState};

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Manager binding --
    #[error("device manager unavailable: {0}")]
    ManagerUnavailable(String),

    #[error("manager module not found in any search location")]
    ManagerNotFound,

    #[error("entry point `{symbol}` missing from manager module {module}")]
    EntryPointMissing { module: String, symbol: String },

    // -- Session --
    #[error("session open failed: {0}")]
    SessionOpen(String),

    #[error("session used from a thread other than its owner")]
    WrongThread,

    #[error("no source selected")]
    NoSourceSelected,

    // -- Protocol --
    #[error("protocol call failed: {condition} ({detail})")]
    Protocol {
        condition: ConditionCode,
        detail: String,
    },

    #[error("operation illegal in state {state:?}: {detail}")]
    Sequence { state: SourceState, detail: String },

    #[error("source is still acquiring")]
    SourceBusy,

    // -- Capabilities --
    #[error("capability {cap:#06x} not supported by this source")]
    CapabilityUnsupported { cap: u16 },

    #[error("capability {cap:#06x} rejected operation: {detail}")]
    CapabilityOperation { cap: u16, detail: String },

    // -- Transfer --
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("strip size {requested} outside device bounds [{min}, {max}]")]
    StripSize { requested: u32, min: u32, max: u32 },

    #[error("a transfer buffer is already in flight for this source")]
    BufferInFlight,

    // -- Programmer misuse --
    #[error("invalid handle or payload: {0}")]
    Misuse(String),

    // -- Storage / ambient --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanwerkError {
    /// The condition code behind this error, when one was reported by the
    /// manager. Ambient errors (I/O, config, misuse) have none.
    pub fn condition(&self) -> Option<ConditionCode> {
        match self {
            Self::Protocol { condition, .. } => Some(*condition),
            Self::ManagerUnavailable(_) | Self::ManagerNotFound => {
                Some(ConditionCode::Bummer)
            }
            Self::Sequence { .. } | Self::SourceBusy => Some(ConditionCode::SequenceError),
            Self::CapabilityUnsupported { .. } => Some(ConditionCode::CapUnsupported),
            Self::CapabilityOperation { .. } => Some(ConditionCode::CapBadOperation),
            _ => None,
        }
    }

    /// Whether this error is fatal to the whole session (as opposed to a
    /// single page or operation).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ManagerUnavailable(_)
                | Self::ManagerNotFound
                | Self::EntryPointMissing { .. }
                | Self::SessionOpen(_)
                | Self::WrongThread
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_errors_are_fatal() {
        assert!(ScanwerkError::ManagerNotFound.is_fatal());
        assert!(ScanwerkError::WrongThread.is_fatal());
        assert!(!ScanwerkError::SourceBusy.is_fatal());
    }

    #[test]
    fn protocol_error_carries_condition() {
        let err = ScanwerkError::Protocol {
            condition: ConditionCode::PaperJam,
            detail: "feeder".into(),
        };
        assert_eq!(err.condition(), Some(ConditionCode::PaperJam));
    }

    #[test]
    fn misuse_has_no_condition() {
        let err = ScanwerkError::Misuse("wrong container".into());
        assert_eq!(err.condition(), None);
    }
}

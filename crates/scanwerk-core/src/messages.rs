// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable messages for device condition codes.
//
// Every condition a device reports is mapped to plain English with a clear
// suggestion. The localization subsystem consumes the numeric message id;
// the English text here is the built-in fallback.

use crate::types::ConditionCode;

/// Severity of a condition from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Momentary device hiccup — safe to retry automatically.
    Transient,
    /// User must do something (load paper, close a cover, clear a jam).
    ActionRequired,
    /// Cannot be fixed by retrying or user action.
    Permanent,
}

/// A human-readable condition message.
#[derive(Debug, Clone)]
pub struct ConditionMessage {
    /// Key into the external localization table.
    pub message_id: u32,
    /// Plain English summary (fallback text).
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether the engine may auto-retry the page.
    pub retriable: bool,
    pub severity: Severity,
}

/// Numeric message id for a condition, consumed by the localization
/// subsystem. Ids are stable; unknown conditions share one id.
pub fn message_id(condition: ConditionCode) -> u32 {
    match condition {
        ConditionCode::Unknown(_) => 1999,
        other => 1000 + u32::from(other.as_raw()),
    }
}

/// Convert a device condition into a message the operator can act on.
pub fn describe_condition(condition: ConditionCode) -> ConditionMessage {
    let (message, suggestion, retriable, severity) = match condition {
        ConditionCode::Success => (
            "The scanner finished without problems.",
            "Nothing to do.",
            false,
            Severity::Transient,
        ),
        ConditionCode::Bummer => (
            "The scanner driver reported a general failure.",
            "Try the scan again. If it keeps happening, turn the scanner off and on.",
            true,
            Severity::Transient,
        ),
        ConditionCode::LowMemory => (
            "There isn't enough memory to finish the scan.",
            "Close other applications, or scan at a lower resolution.",
            true,
            Severity::Transient,
        ),
        ConditionCode::NoSource => (
            "No scanner could be found.",
            "Check the scanner is plugged in and turned on, then try again.",
            true,
            Severity::ActionRequired,
        ),
        ConditionCode::MaxConnections => (
            "The scanner is already in use.",
            "Close the other application using the scanner, then try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::OperationError => (
            "The scanner couldn't complete the operation.",
            "Try again. The scanner may have shown its own error message.",
            true,
            Severity::Transient,
        ),
        ConditionCode::BadCapability
        | ConditionCode::BadProtocol
        | ConditionCode::BadValue
        | ConditionCode::BadDestination => (
            "The application asked the scanner for something it doesn't understand.",
            "This is a software problem, not a scanner problem. Please report it.",
            false,
            Severity::Permanent,
        ),
        ConditionCode::SequenceError | ConditionCode::CapSequenceError => (
            "Scanner commands were issued in the wrong order.",
            "Try the whole scan again from the start.",
            false,
            Severity::Permanent,
        ),
        ConditionCode::CapUnsupported | ConditionCode::CapBadOperation => (
            "This scanner doesn't support the requested setting.",
            "Change the scan settings and try again.",
            false,
            Severity::Permanent,
        ),
        ConditionCode::Denied => (
            "Permission to write the scan file was denied.",
            "Choose a different folder to save into, or check the folder permissions.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::FileExists => (
            "A file with that name already exists.",
            "Choose a different file name and scan again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::FileNotFound => (
            "The file or folder couldn't be found.",
            "Check the save location still exists, then try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::NotEmpty => (
            "The folder isn't empty.",
            "Choose an empty folder and try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::PaperJam => (
            "Paper is stuck in the scanner.",
            "Gently pull the stuck page out, check for torn pieces, then try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::PaperDoubleFeed => (
            "The scanner pulled two pages through at once.",
            "Separate the pages, put them back in the feeder, and scan again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::FileWriteError => (
            "The scan couldn't be written to disk.",
            "Check there's enough disk space, then try again.",
            true,
            Severity::Transient,
        ),
        ConditionCode::DeviceOffline => (
            "The scanner is offline.",
            "Check the cable and power, turn the scanner on, then try again.",
            true,
            Severity::ActionRequired,
        ),
        ConditionCode::InterlockOpen => (
            "A cover or door is open on the scanner.",
            "Close all covers and doors, then try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::DamagedCorner => (
            "A page has a folded or damaged corner the feeder can't handle.",
            "Flatten the page, or scan it on the flatbed instead.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::FocusError => (
            "The scanner couldn't focus.",
            "Make sure the document lies flat, then try again.",
            true,
            Severity::Transient,
        ),
        ConditionCode::DocTooLight => (
            "The scanned page came out too light to use.",
            "Increase the darkness/contrast setting and scan again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::DocTooDark => (
            "The scanned page came out too dark to use.",
            "Decrease the darkness/contrast setting and scan again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::NoMedia => (
            "There's no paper in the feeder.",
            "Put the pages in the feeder, then try again.",
            false,
            Severity::ActionRequired,
        ),
        ConditionCode::Unknown(_) => (
            "The scanner reported a problem this application doesn't recognize.",
            "Try again. If it keeps happening, check for an updated scanner driver.",
            true,
            Severity::Transient,
        ),
    };

    ConditionMessage {
        message_id: message_id(condition),
        message: message.into(),
        suggestion: suggestion.into(),
        retriable,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_jam_is_action_required() {
        let msg = describe_condition(ConditionCode::PaperJam);
        assert_eq!(msg.severity, Severity::ActionRequired);
        assert!(!msg.retriable);
    }

    #[test]
    fn low_memory_is_transient() {
        let msg = describe_condition(ConditionCode::LowMemory);
        assert_eq!(msg.severity, Severity::Transient);
        assert!(msg.retriable);
    }

    #[test]
    fn protocol_misuse_is_permanent() {
        let msg = describe_condition(ConditionCode::BadProtocol);
        assert_eq!(msg.severity, Severity::Permanent);
    }

    #[test]
    fn message_ids_are_stable_and_distinct() {
        assert_eq!(message_id(ConditionCode::Bummer), 1001);
        assert_eq!(message_id(ConditionCode::PaperJam), 1020);
        assert_eq!(message_id(ConditionCode::Unknown(500)), 1999);
        assert_ne!(
            message_id(ConditionCode::PaperJam),
            message_id(ConditionCode::PaperDoubleFeed)
        );
    }
}

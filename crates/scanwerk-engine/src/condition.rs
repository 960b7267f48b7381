// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure follow-up: condition query, error history, typed error.
//
// Every `Failure` result is immediately followed by a status triplet to the
// same destination, because the condition code is per-source transient
// state the next call overwrites.

use chrono::Utc;
use tracing::warn;

use scanwerk_core::messages::describe_condition;
use scanwerk_core::types::{
    AppIdentity, ConditionCode, ErrorRecord, ResultCode, SourceIdentity,
};
use scanwerk_core::ScanwerkError;

use scanwerk_dsm::traits::StatusPayload;
use scanwerk_dsm::{Dat, ManagerEntry, Msg, Payload, Triplet};

use crate::context::EngineContext;

/// Ask the manager what went wrong. A failing or shape-mismatched status
/// query degrades to the general-failure condition rather than erroring —
/// there is nothing further to ask.
pub(crate) fn query_condition(
    manager: &dyn ManagerEntry,
    origin: &AppIdentity,
    dest: Option<&SourceIdentity>,
) -> ConditionCode {
    let mut payload = Payload::Status(StatusPayload::default());
    let rc = manager.call(
        origin,
        dest,
        Triplet::control(Dat::Status, Msg::Get),
        &mut payload,
    );
    if !rc.is_success() {
        return ConditionCode::Bummer;
    }
    match payload {
        Payload::Status(status) => status.condition.unwrap_or(ConditionCode::Bummer),
        _ => ConditionCode::Bummer,
    }
}

/// Turn a failing call into a typed error: fetch the condition, log it,
/// record it in the history ring.
pub(crate) fn report_failure(
    ctx: &EngineContext,
    manager: &dyn ManagerEntry,
    origin: &AppIdentity,
    dest: Option<&SourceIdentity>,
    triplet: Triplet,
) -> ScanwerkError {
    let condition = query_condition(manager, origin, dest);
    let described = describe_condition(condition);
    warn!(
        triplet = %triplet,
        condition = %condition,
        message_id = described.message_id,
        "protocol call failed"
    );
    ctx.record_error(ErrorRecord {
        at: Utc::now(),
        result: ResultCode::Failure,
        condition,
        operation: triplet.summary(),
    });
    ScanwerkError::Protocol {
        condition,
        detail: described.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::config::EngineConfig;
    use scanwerk_dsm::stub::StubManager;

    fn app() -> AppIdentity {
        AppIdentity::new("Scanwerk", "Engine", "ConditionTest")
    }

    #[test]
    fn failure_is_followed_by_condition_fetch() {
        let ctx = EngineContext::init(EngineConfig::default()).expect("init");
        let stub = StubManager::new().fail_open_manager();
        let mut p = Payload::None;
        let rc = stub.call(
            &app(),
            None,
            Triplet::control(Dat::Parent, Msg::OpenDsm),
            &mut p,
        );
        assert_eq!(rc, ResultCode::Failure);

        let err = report_failure(
            &ctx,
            &stub,
            &app(),
            None,
            Triplet::control(Dat::Parent, Msg::OpenDsm),
        );
        assert_eq!(err.condition(), Some(ConditionCode::Bummer));

        let last = ctx.last_error().expect("recorded");
        assert_eq!(last.condition, ConditionCode::Bummer);
        assert_eq!(last.operation, "Control/Parent/OpenDsm");
    }

    #[test]
    fn condition_degrades_to_bummer_without_status_support() {
        struct Mute;
        impl ManagerEntry for Mute {
            fn call(
                &self,
                _origin: &AppIdentity,
                _dest: Option<&SourceIdentity>,
                _triplet: Triplet,
                _payload: &mut Payload,
            ) -> ResultCode {
                ResultCode::Failure
            }
        }
        assert_eq!(query_condition(&Mute, &app(), None), ConditionCode::Bummer);
    }
}

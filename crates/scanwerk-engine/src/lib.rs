// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — the acquisition engine.
//
// Sits on top of the device-manager boundary crate and drives the whole
// conversation with a scanner: session and source lifecycle, capability
// negotiation with per-source caching, quirk handling, and the page-by-page
// acquisition state machine with its transfer strategies.
//
// ```no_run
// use std::sync::Arc;
// use scanwerk_core::{EngineConfig, types::{AppIdentity, TransferMechanism}};
// use scanwerk_engine::{AcquireJob, EngineContext, Session};
//
// # fn main() -> scanwerk_core::error::Result<()> {
// let ctx = EngineContext::init(EngineConfig::default())?;
// let app = AppIdentity::new("Example", "Imaging", "Example Scan");
// let mut session = Session::open(ctx, app)?;
// let source = session.open_default()?;
// let outcome = source.acquire(AcquireJob::new(TransferMechanism::Buffered))?;
// println!("{} pages", outcome.pages.len());
// # Ok(())
// # }
// ```

pub mod acquire;
pub mod capabilities;
pub mod captable;
pub mod condition;
pub mod context;
pub mod quirks;
pub mod session;
pub mod source;
pub mod transfer;

pub use acquire::{AcquireJob, RenameHook};
pub use capabilities::{CapCache, CapabilityEntry};
pub use captable::CapabilityTable;
pub use context::EngineContext;
pub use quirks::{DeviceQuirks, QuirkLists};
pub use session::{SelectCriteria, Session, SourceSelection};
pub use source::{EnableOutcome, Source};

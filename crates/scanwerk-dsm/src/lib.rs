// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — device-manager boundary.
//
// This crate is the only place allowed to touch the dynamically loaded
// device-manager module. It defines the triplet message vocabulary, the
// typed payloads that cross the entry point, the `ManagerEntry` trait that
// the engine calls through, the module loader, and a scriptable stub
// manager used by tests and device-less builds.

pub mod loader;
pub mod stub;
pub mod traits;
pub mod triplet;
pub mod wire;

pub use traits::{ManagerEntry, Payload};
pub use triplet::{Dat, Msg, Triplet};

//! Top-level operations: one module per run kind, each taking a
//! request struct and returning an outcome.

pub mod backup;
pub mod report;
pub mod restore;
mod util;

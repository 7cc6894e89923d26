//! Deterministic, restart-safe grassland simulation pipeline.
//!
//! One run takes a location and a year range through six strictly sequential
//! stages: precondition validation, location key derivation, data acquisition,
//! config materialization, replicated simulation, and output collection. The
//! crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parameters, location keys, token
//!   substitution, verdicts). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (environment snapshot, config file,
//!   child processes, filesystem staging). External collaborators sit behind
//!   traits so tests can script them.
//!
//! [`pipeline`] coordinates core logic with I/O and is what the CLI calls.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

//! Stable exit codes for pipeline CLI commands.

/// Run succeeded, or at least one replicate succeeded.
pub const OK: i32 = 0;
/// Invalid usage, unreadable config, or any error outside the stage taxonomy.
pub const INVALID: i32 = 1;
/// A required parameter or credential is missing or malformed.
pub const PRECONDITION: i32 = 2;
/// The data-preparation collaborator failed or produced an unexpected layout.
pub const ACQUISITION: i32 = 3;
/// Project directory or template materialization failed.
pub const TEMPLATING: i32 = 4;
/// Every simulation replicate failed.
pub const SIMULATION: i32 = 5;

//! I/O helpers for pipeline stages.

pub mod acquisition;
pub mod collect;
pub mod config;
pub mod env;
pub mod fsops;
pub mod layout;
pub mod materialize;
pub mod process;
pub mod report;
pub mod simulation;

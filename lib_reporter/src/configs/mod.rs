//! # Configuration Modules
//!
//! Transport options consumed by the `Reporter` when it builds its channel.
//! Process-level configuration (CLI flags, config files, env) lives in the
//! binary that embeds the reporter.

/// Timeouts and client identity for the outbound channel.
pub mod options;

pub use options::ReporterOptions;

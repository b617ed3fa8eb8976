//! # Core Engine Module
//!
//! The reporter and the pieces it is built from:
//!
//! - **`reporter`**: the public multiplexer (`Reporter`, `ReporterBuilder`).
//! - **`registry`**: the single owner of the active-session count; closes the
//!   shared channel when the count returns to zero.
//! - **`session`**: the per-source timer loop and its one-shot release signal.
//! - **`source`**: the contract a statistics source implements.

/// Public multiplexer API.
pub mod reporter;
/// Session bookkeeping and channel lifetime.
pub(crate) mod registry;
/// Per-source timer loop and release signal.
pub mod session;
/// Statistics source contract and the hooks installed into sources.
pub mod source;

pub use reporter::{Reporter, ReporterBuilder};
pub use session::{ReleaseHandle, SessionState};
pub use source::{SourceHooks, StatsSource};

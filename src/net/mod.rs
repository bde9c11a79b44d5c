//! Remote-call surface and state snapshots
//!
//! The transport itself is left to the host; this module only defines what
//! goes over it.

pub mod protocol;
pub mod snapshot;

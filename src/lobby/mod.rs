//! Player sessions and the room facade
//!
//! The room is the single authoritative world object; sessions map client
//! secrets and names to player ids.

pub mod room;
pub mod session;

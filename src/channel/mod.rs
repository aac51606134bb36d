//! Asynchronous supervisor ↔ worker command channel.
//!
//! Ordered, at-most-once delivery per message over a local socket; every
//! command is acknowledged with an explicit event carrying its correlation
//! id. Channel teardown is equivalent to an implicit STOP.

pub mod protocol;
pub mod supervisor;
pub mod worker;

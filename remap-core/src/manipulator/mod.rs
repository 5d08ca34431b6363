//! Manipulator implementations. `basic` is the only type
//! the configuration model currently names (`type = "basic"`); the module
//! exists as its own namespace so other manipulator types could be added
//! beside it without disturbing the chain's arena.

pub mod basic;

pub use basic::{BasicManipulator, Posting};

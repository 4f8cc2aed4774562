//! the test_utils folder here will share utils or test components between unit
//! tests: logger setup, stand-in peer executables and an in-process fake peer
mod common;
mod fake_peer;

pub use common::*;
pub use fake_peer::*;

//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the bridge end to end on
//! the host simulation board.  No hardware required.

mod pipeline_tests;
mod rig;
mod scenario_tests;
mod session_tests;

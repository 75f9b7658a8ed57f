//! E2E Test Runner
//!
//! Loads JSON test files and drives them step by step against the
//! engine's agent socket.

mod runner;
mod suite;

pub use runner::{build_request, run_tests, RunOptions, RunSummary};
pub use suite::{collect_test_files, has_screenshot, load_tests, Step, TestFile};

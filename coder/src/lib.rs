//! Condition-driven code modification cycles.
//!
//! A cycle takes one natural-language request for a project and drives a
//! collaborator through modify, build and fix steps until the build passes
//! or no step can make progress. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (conditions, step catalogue,
//!   selection, build classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, child processes,
//!   audit log). Isolated behind traits to enable scripted doubles in tests.
//!
//! Orchestration modules ([`steps`], [`cycle`], [`focus`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod focus;
pub mod io;
pub mod logging;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

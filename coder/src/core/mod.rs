//! Deterministic, pure logic for the modification cycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod catalogue;
pub mod classifier;
pub mod conditions;
pub mod names;
pub mod selector;
pub mod types;

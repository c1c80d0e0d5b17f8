//! I/O helpers for coder commands.

pub mod audit;
pub mod builder;
pub mod collaborator;
pub mod config;
pub mod focus_store;
pub mod git;
pub mod process;
pub mod prompt;
pub mod root_lock;
pub mod tracker;

//! CLI command implementations.

pub mod change_stack;

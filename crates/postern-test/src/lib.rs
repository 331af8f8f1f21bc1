//! Test harnesses for the Postern compiler, runtime and CLI.
//!
//! Provides `TestProject` for on-disk compile-and-mount tests; the CLI
//! regression suite lives in `cli`.

#[cfg(test)]
pub mod cli;
pub mod project;

pub use project::{fixtures_dir, CompiledProject, TestError, TestProject};

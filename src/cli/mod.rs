//! Command-line interface for building and inspecting dictionaries

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

//! The one surface an operator touches directly: the `governor` CLI.

pub mod cli;

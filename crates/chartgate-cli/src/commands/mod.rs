//! CLI commands

pub mod download;
pub mod push;

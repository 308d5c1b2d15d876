//! CLI command modules.

pub mod files;

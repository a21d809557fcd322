//! CLI subcommands.

pub mod capture;
pub mod submit;

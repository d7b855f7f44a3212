//! CLI command implementations.

pub mod advise;
pub mod check;
pub mod config;
pub mod links;

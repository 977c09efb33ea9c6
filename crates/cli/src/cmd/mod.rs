//! CLI command implementations

pub mod algorithms;
pub mod data;
pub mod file;
pub mod stamp;

//! CLI command implementations.

pub mod check;
pub mod records;
pub mod serve;

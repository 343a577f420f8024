//! CLI command implementations.

pub mod check;
pub mod doctor;
pub mod replay;

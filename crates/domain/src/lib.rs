//! Shared configuration, error and trace types for the nodegate crates.

pub mod config;
pub mod error;
pub mod trace;

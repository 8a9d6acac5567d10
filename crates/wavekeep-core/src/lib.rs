//! Core library for wavekeep — foundational data model, layered configuration,
//! and SQLite-backed persistence shared by every other crate in the workspace.

pub mod config;
pub mod persistence;
pub mod types;

//! Configuration and shared types
//!
//! Limit sets, launch specs, policies and the error taxonomy.

pub mod loader;
pub mod types;

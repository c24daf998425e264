//! FileSync Common - Shared types and configuration
//!
//! This crate provides the domain types and configuration structures
//! used across the FileSync components.

pub mod config;
pub mod types;

pub use config::{IdScheme, StoreConfig};
pub use types::*;

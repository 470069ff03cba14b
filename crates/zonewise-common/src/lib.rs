//! zonewise Common - Shared types and utilities
//!
//! This crate provides the identifiers, error definitions and configuration
//! types used across all zonewise components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ClusterConfig, Config, LedgerConfig, LoggingConfig, PlacementConfig, PolicyKind,
    ResolverConfig, WindowMode,
};
pub use error::{Error, Result};
pub use types::*;

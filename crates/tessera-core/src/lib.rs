//! Tessera Core - Shared configuration and utilities
//!
//! This crate provides the ambient pieces the engine is built on:
//! - World configuration loaded from TOML
//! - A type-keyed buffer pool handed to component pool hooks

pub mod config;
pub mod pool;

pub use config::{ConfigError, ScanStrategy, WorldConfig};
pub use pool::BufferPool;

//! Database configuration and shared connection management.
//!
//! This crate provides the MySQL pool setup and a process-wide
//! [`ConnectionManager`] that connects lazily, once, and hands the same
//! handle to every caller.

mod config;
mod connection;
mod pool;

pub use config::DbConfig;
pub use connection::{ConnectionManager, ConnectionStatus, Connector, MySqlConnector};
pub use pool::{create_pool, health_check, DbPool};

// Re-export sqlx types for convenience
pub use sqlx::{self, MySql, Row};

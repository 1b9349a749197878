//! Persistence layer modules.

pub mod db;
pub mod history_repo;
pub mod retention;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

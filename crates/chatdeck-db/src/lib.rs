//! Database layer for chatdeck.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations for the three persisted tables: `chatbots`,
//! `conversations` and `messages`.
//!
//! Foreign keys are enabled on every pooled connection so that deleting a
//! chatbot removes its conversations and messages in the same statement.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_memory_pool, create_pool, DbPool, DbRuntimeSettings, PoolError};

// Conductor Infrastructure - SQLite Adapter
// Implements: QueueBackend (durable), RecordRetention, reference domain services

mod connection;
mod error;
mod migration;
mod queue_backend;
mod records;
mod reference;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue_backend::SqliteQueueBackend;
pub use records::SqliteRecordStore;
pub use reference::{ReferenceServices, STATUS_RECORDED};
pub use sqlx::SqlitePool;

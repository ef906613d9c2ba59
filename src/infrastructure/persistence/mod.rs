//! SQLite persistence: connection/schema setup plus one adapter per
//! repository/cache trait the domain and application layers declare.

pub mod database;
pub mod governor_repository;
pub mod snapshot_repository;
pub mod sqlite_cache;

pub use database::Database;
pub use governor_repository::SqliteGovernorRepository;
pub use snapshot_repository::SqliteSnapshotRepository;
pub use sqlite_cache::SqliteCache;

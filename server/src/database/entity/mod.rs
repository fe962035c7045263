//! Database entities.
//!
//! We use SeaORM and target PostgreSQL (production) and SQLite
//! (development). The relational store is the single source of truth for
//! placement metadata and the only synchronization point between the
//! tracker, the storage nodes and the reconciler.

pub mod device;
pub mod file;
pub mod file_on;
pub mod host;
pub mod tempfile;

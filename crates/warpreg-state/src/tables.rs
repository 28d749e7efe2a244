//! redb table definitions for the worker store.
//!
//! Values are JSON-serialized `WorkerRecord`s. The key is the worker id,
//! which is what makes ids unique at the storage layer.

use redb::TableDefinition;

/// Worker records keyed by `{worker_id}`.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

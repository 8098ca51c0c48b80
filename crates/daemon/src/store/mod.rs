// Persistence: SQLite-backed key/value store shared by every context.

pub mod draft;
pub mod kv;
pub mod meta_db;

pub use draft::DraftStore;
pub use kv::{KvStore, KvTxn, StorageChange, Write};

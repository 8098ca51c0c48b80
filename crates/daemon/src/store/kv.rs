// Key/value access over the `kv` table with change notifications.
//
// All contexts share one `KvStore`. Read-modify-write sequences go through
// `transaction`/`update`, which run under the connection lock and never
// suspend, so no other writer can interleave between the read and the write.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clipnote_common::protocol::keys::StorageArea;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::meta_db::MetaDb;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Published after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub area: StorageArea,
    pub key: String,
    pub removed: bool,
}

/// Decision returned by an `update` closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Write<T> {
    Keep,
    Set(T),
    Remove,
}

#[derive(Debug, Clone)]
pub struct KvStore {
    db: Arc<Mutex<MetaDb>>,
    changes: broadcast::Sender<StorageChange>,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_db(MetaDb::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_db(MetaDb::open_in_memory()?))
    }

    fn from_db(db: MetaDb) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { db: Arc::new(Mutex::new(db)), changes }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    pub fn get<T: DeserializeOwned>(&self, area: StorageArea, key: &str) -> Result<Option<T>> {
        let db = self.lock()?;
        read_typed(db.connection(), area, key)
    }

    /// Values for every present key; absent keys are omitted.
    pub fn get_many(&self, area: StorageArea, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let db = self.lock()?;
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = read_raw(db.connection(), area, key)? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    pub fn set<T: Serialize>(&self, area: StorageArea, key: &str, value: &T) -> Result<()> {
        self.transaction(|txn| txn.set(area, key, value))
    }

    pub fn set_many(&self, area: StorageArea, entries: &[(&str, Value)]) -> Result<()> {
        self.transaction(|txn| {
            for (key, value) in entries {
                txn.set(area, key, value)?;
            }
            Ok(())
        })
    }

    pub fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        self.transaction(|txn| txn.remove(area, key))
    }

    pub fn remove_many(&self, area: StorageArea, keys: &[&str]) -> Result<()> {
        self.transaction(|txn| {
            for key in keys {
                txn.remove(area, key)?;
            }
            Ok(())
        })
    }

    /// Atomic read-modify-write of a single key.
    pub fn update<T, R, F>(&self, area: StorageArea, key: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> (Write<T>, R),
    {
        self.transaction(|txn| {
            let current = txn.get(area, key)?;
            let (write, result) = f(current);
            match write {
                Write::Keep => {}
                Write::Set(value) => txn.set(area, key, &value)?,
                Write::Remove => txn.remove(area, key)?,
            }
            Ok(result)
        })
    }

    /// Run `f` inside one SQLite transaction. Changes are published only
    /// after the commit succeeds; an `Err` from `f` rolls everything back.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut KvTxn<'_>) -> Result<R>) -> Result<R> {
        let (result, changed) = {
            let mut db = self.lock()?;
            let tx = db
                .connection_mut()
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to start kv transaction")?;
            let mut txn = KvTxn { tx, changed: Vec::new() };
            let result = f(&mut txn)?;
            let KvTxn { tx, changed } = txn;
            tx.commit().context("failed to commit kv transaction")?;
            (result, changed)
        };

        for change in changed {
            debug!(area = change.area.as_str(), key = %change.key, removed = change.removed, "storage changed");
            // No subscribers is fine.
            let _ = self.changes.send(change);
        }
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MetaDb>> {
        self.db.lock().map_err(|_| anyhow!("kv store lock poisoned"))
    }
}

/// Handle passed to `KvStore::transaction` closures.
pub struct KvTxn<'a> {
    tx: rusqlite::Transaction<'a>,
    changed: Vec<StorageChange>,
}

impl KvTxn<'_> {
    pub fn get<T: DeserializeOwned>(&self, area: StorageArea, key: &str) -> Result<Option<T>> {
        read_typed(&self.tx, area, key)
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, area: StorageArea, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)
            .with_context(|| format!("failed to encode value for `{key}`"))?;
        self.tx
            .execute(
                "INSERT INTO kv (area, key, value, updated_at) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(area, key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
                params![area.as_str(), key, encoded, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write `{key}` to {} storage", area.as_str()))?;
        self.changed.push(StorageChange { area, key: key.to_string(), removed: false });
        Ok(())
    }

    pub fn remove(&mut self, area: StorageArea, key: &str) -> Result<()> {
        let deleted = self
            .tx
            .execute("DELETE FROM kv WHERE area = ?1 AND key = ?2", params![area.as_str(), key])
            .with_context(|| format!("failed to remove `{key}` from {} storage", area.as_str()))?;
        if deleted > 0 {
            self.changed.push(StorageChange { area, key: key.to_string(), removed: true });
        }
        Ok(())
    }
}

fn read_raw(conn: &Connection, area: StorageArea, key: &str) -> Result<Option<Value>> {
    let encoded: Option<String> = conn
        .query_row(
            "SELECT value FROM kv WHERE area = ?1 AND key = ?2",
            params![area.as_str(), key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read `{key}` from {} storage", area.as_str()))?;

    encoded
        .map(|encoded| {
            serde_json::from_str(&encoded)
                .with_context(|| format!("stored value for `{key}` is not valid JSON"))
        })
        .transpose()
}

fn read_typed<T: DeserializeOwned>(
    conn: &Connection,
    area: StorageArea,
    key: &str,
) -> Result<Option<T>> {
    read_raw(conn, area, key)?
        .map(|value| {
            serde_json::from_value(value)
                .with_context(|| format!("stored value for `{key}` has an unexpected shape"))
        })
        .transpose()
}

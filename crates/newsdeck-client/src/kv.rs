use std::collections::BTreeMap;
use std::sync::Mutex;

use newsdeck_db::Database;
use newsdeck_util_error::BoxedError;
use snafu::{ResultExt as _, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PersistenceError {
    #[snafu(display("Storage unavailable"))]
    Unavailable,
    #[snafu(display("Storage backend error"))]
    Backend { source: BoxedError },
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Durable string key-value storage local to this client
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> PersistenceResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PersistenceResult<()>;

    async fn delete(&self, key: &str) -> PersistenceResult<()>;

    /// Entries whose key starts with `prefix`, in key order
    async fn entries_with_prefix(&self, prefix: &str) -> PersistenceResult<Vec<(String, String)>>;
}

/// Process-local [`KvStore`], gone when dropped
#[derive(Debug, Default)]
pub struct MemKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemKvStore {
    async fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("Locking failed")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.entries
            .lock()
            .expect("Locking failed")
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> PersistenceResult<()> {
        self.entries.lock().expect("Locking failed").remove(key);
        Ok(())
    }

    async fn entries_with_prefix(&self, prefix: &str) -> PersistenceResult<Vec<(String, String)>> {
        Ok(self
            .entries
            .lock()
            .expect("Locking failed")
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[async_trait::async_trait]
impl KvStore for Database {
    async fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        self.kv_get(key)
            .await
            .map_err(BoxedError::from)
            .context(BackendSnafu)
    }

    async fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.kv_set(key, value)
            .await
            .map_err(BoxedError::from)
            .context(BackendSnafu)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> PersistenceResult<()> {
        self.kv_delete(key)
            .await
            .map_err(BoxedError::from)
            .context(BackendSnafu)?;
        Ok(())
    }

    async fn entries_with_prefix(&self, prefix: &str) -> PersistenceResult<Vec<(String, String)>> {
        self.kv_entries_with_prefix(prefix)
            .await
            .map_err(BoxedError::from)
            .context(BackendSnafu)
    }
}

use tracing::debug;

use crate::{Database, DbResult, LOG_TARGET, kv};

impl Database {
    pub fn kv_get_tx(key: &str, table: &impl kv::ReadableTable) -> DbResult<Option<String>> {
        Ok(table.get(&key.to_owned())?.map(|g| g.value()))
    }

    /// Returns the previous value, if any
    pub fn kv_set_tx(key: &str, value: &str, table: &mut kv::Table) -> DbResult<Option<String>> {
        Ok(table
            .insert(&key.to_owned(), &value.to_owned())?
            .map(|g| g.value()))
    }

    /// Returns `true` if the key was present
    pub fn kv_delete_tx(key: &str, table: &mut kv::Table) -> DbResult<bool> {
        Ok(table.remove(&key.to_owned())?.is_some())
    }

    /// All entries whose key starts with `prefix`, in key order
    ///
    /// Keys are bincode-encoded (length first), so the table order is not
    /// lexicographic and a prefix can't be turned into a range; this scans.
    pub fn kv_entries_with_prefix_tx(
        prefix: &str,
        table: &impl kv::ReadableTable,
    ) -> DbResult<Vec<(String, String)>> {
        let mut entries = vec![];

        for entry in table.range::<String>(..)? {
            let (k, v) = entry?;
            let k = k.value();
            if k.starts_with(prefix) {
                entries.push((k, v.value()));
            }
        }

        entries.sort();
        Ok(entries)
    }

    pub async fn kv_get(&self, key: &str) -> DbResult<Option<String>> {
        self.read_with(|tx| {
            let table = tx.open_table(&kv::TABLE)?;
            Self::kv_get_tx(key, &table)
        })
        .await
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> DbResult<Option<String>> {
        self.write_with(|tx| {
            let mut table = tx.open_table(&kv::TABLE)?;
            let prev = Self::kv_set_tx(key, value, &mut table)?;
            debug!(target: LOG_TARGET, %key, %value, "Stored value");
            Ok(prev)
        })
        .await
    }

    pub async fn kv_delete(&self, key: &str) -> DbResult<bool> {
        self.write_with(|tx| {
            let mut table = tx.open_table(&kv::TABLE)?;
            let existed = Self::kv_delete_tx(key, &mut table)?;
            debug!(target: LOG_TARGET, %key, existed, "Deleted value");
            Ok(existed)
        })
        .await
    }

    pub async fn kv_entries_with_prefix(&self, prefix: &str) -> DbResult<Vec<(String, String)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&kv::TABLE)?;
            Self::kv_entries_with_prefix_tx(prefix, &table)
        })
        .await
    }
}

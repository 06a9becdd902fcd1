use std::sync::{Arc, RwLock};

use super::SchemaSnapshot;

/// Holder of the current schema snapshot.
///
/// A refresh swaps the whole `Arc`, so a call that already took a snapshot
/// keeps reading the version it started with.
#[derive(Debug, Default)]
pub struct SchemaStore {
    current: RwLock<Option<VersionedSnapshot>>,
}

#[derive(Debug, Clone)]
struct VersionedSnapshot {
    version: u64,
    snapshot: Arc<SchemaSnapshot>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SchemaSnapshot) -> Self {
        let store = Self::new();
        store.replace(snapshot);
        store
    }

    /// Install a new snapshot and return its version
    pub fn replace(&self, snapshot: SchemaSnapshot) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let version = guard.as_ref().map_or(1, |c| c.version + 1);
        *guard = Some(VersionedSnapshot {
            version,
            snapshot: Arc::new(snapshot),
        });
        tracing::debug!(version, "schema snapshot replaced");
        version
    }

    /// Current snapshot and its version, if one is loaded
    pub fn current(&self) -> Option<(u64, Arc<SchemaSnapshot>)> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|c| (c.version, Arc::clone(&c.snapshot)))
    }

    pub fn version(&self) -> Option<u64> {
        self.current().map(|(version, _)| version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, TableSchema};

    fn snapshot(table: &str) -> SchemaSnapshot {
        SchemaSnapshot::single(
            "db",
            vec![TableSchema::new(table, vec![ColumnSchema::new("id", "int")])],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_store() {
        let store = SchemaStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.version(), None);
    }

    #[test]
    fn test_replace_keeps_earlier_reader_consistent() {
        let store = SchemaStore::with_snapshot(snapshot("old_table"));
        let (v1, held) = store.current().unwrap();

        let v2 = store.replace(snapshot("new_table"));
        assert_eq!(v2, v1 + 1);

        // The earlier reader still sees the version it took
        assert!(held.find_table(None, "old_table").is_some());
        let (_, latest) = store.current().unwrap();
        assert!(latest.find_table(None, "new_table").is_some());
        assert!(latest.find_table(None, "old_table").is_none());
    }
}

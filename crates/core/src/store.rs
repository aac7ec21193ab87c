//! Storage collaborators: structured items and media blobs.
//!
//! The protocol engine never touches SQL directly. It persists structured
//! records through [`ItemStore`] (keyed by store name and owner) and media
//! bytes through [`BlobStore`] (keyed by content id, released only against
//! the per-object capability token).

use crate::error::CoreResult;
use rusqlite::Connection;
use std::path::Path;

/// Persistent store for structured records, keyed by store name and owner.
///
/// Items are opaque JSON values; the engine owns their shape.
pub trait ItemStore: Send {
    /// Insert or replace one item.
    fn save(&self, store: &str, id: &str, item: &serde_json::Value, owner: &str) -> CoreResult<()>;

    /// Load every item in a store for an owner.
    fn get_all(&self, store: &str, owner: &str) -> CoreResult<Vec<serde_json::Value>>;

    /// Delete one item by id.
    fn delete(&self, store: &str, id: &str) -> CoreResult<()>;

    /// Replace the full item set for an owner (replace-set semantics).
    fn sync_all(&self, store: &str, items: &[(String, serde_json::Value)], owner: &str)
        -> CoreResult<()>;
}

/// Persistent store for media bytes with capability-token access control.
pub trait BlobStore: Send {
    /// Store bytes under an id, guarded by an access token.
    fn save(&self, id: &str, bytes: &[u8], token: &str) -> CoreResult<()>;

    /// Fetch bytes by id.
    fn get(&self, id: &str) -> CoreResult<Option<Vec<u8>>>;

    /// Whether bytes for this id are held locally.
    fn has(&self, id: &str) -> bool;

    /// Delete bytes by id.
    fn delete(&self, id: &str) -> CoreResult<()>;

    /// Check a capability token against the stored one.
    fn verify_access(&self, id: &str, token: &str) -> bool;
}

/// SQLite-backed item store.
#[derive(Debug)]
pub struct SqliteItemStore {
    db: Connection,
}

impl SqliteItemStore {
    /// Open (or create) an item store at the given path.
    pub fn open<P: AsRef<Path>>(db_path: P) -> CoreResult<Self> {
        let db = Connection::open(db_path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS items (
                store TEXT NOT NULL,
                id TEXT NOT NULL,
                owner TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (store, id)
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_owner ON items(store, owner)",
            [],
        )?;

        Ok(Self { db })
    }

    /// Open an in-memory store (tests).
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(":memory:")
    }
}

impl ItemStore for SqliteItemStore {
    fn save(&self, store: &str, id: &str, item: &serde_json::Value, owner: &str) -> CoreResult<()> {
        let body = serde_json::to_string(item)?;
        self.db.execute(
            "INSERT OR REPLACE INTO items (store, id, owner, body) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![store, id, owner, body],
        )?;
        Ok(())
    }

    fn get_all(&self, store: &str, owner: &str) -> CoreResult<Vec<serde_json::Value>> {
        let mut stmt = self
            .db
            .prepare("SELECT body FROM items WHERE store = ?1 AND owner = ?2")?;

        let bodies = stmt
            .query_map(rusqlite::params![store, owner], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(bodies.len());
        for body in bodies {
            items.push(serde_json::from_str(&body)?);
        }
        Ok(items)
    }

    fn delete(&self, store: &str, id: &str) -> CoreResult<()> {
        self.db.execute(
            "DELETE FROM items WHERE store = ?1 AND id = ?2",
            rusqlite::params![store, id],
        )?;
        Ok(())
    }

    fn sync_all(
        &self,
        store: &str,
        items: &[(String, serde_json::Value)],
        owner: &str,
    ) -> CoreResult<()> {
        self.db.execute(
            "DELETE FROM items WHERE store = ?1 AND owner = ?2",
            rusqlite::params![store, owner],
        )?;
        for (id, item) in items {
            self.save(store, id, item, owner)?;
        }
        Ok(())
    }
}

/// SQLite-backed blob store with capability tokens.
#[derive(Debug)]
pub struct SqliteBlobStore {
    db: Connection,
}

impl SqliteBlobStore {
    /// Open (or create) a blob store at the given path.
    pub fn open<P: AsRef<Path>>(db_path: P) -> CoreResult<Self> {
        let db = Connection::open(db_path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                bytes BLOB NOT NULL,
                token TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { db })
    }

    /// Open an in-memory store (tests).
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(":memory:")
    }
}

impl BlobStore for SqliteBlobStore {
    fn save(&self, id: &str, bytes: &[u8], token: &str) -> CoreResult<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO blobs (id, bytes, token) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, bytes, token],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> CoreResult<Option<Vec<u8>>> {
        let mut stmt = self.db.prepare("SELECT bytes FROM blobs WHERE id = ?1")?;
        let mut rows = stmt.query_map([id], |row| row.get::<_, Vec<u8>>(0))?;
        match rows.next() {
            Some(bytes) => Ok(Some(bytes?)),
            None => Ok(None),
        }
    }

    fn has(&self, id: &str) -> bool {
        self.db
            .query_row("SELECT 1 FROM blobs WHERE id = ?1", [id], |_| Ok(()))
            .is_ok()
    }

    fn delete(&self, id: &str) -> CoreResult<()> {
        self.db.execute("DELETE FROM blobs WHERE id = ?1", [id])?;
        Ok(())
    }

    fn verify_access(&self, id: &str, token: &str) -> bool {
        self.db
            .query_row(
                "SELECT 1 FROM blobs WHERE id = ?1 AND token = ?2",
                rusqlite::params![id, token],
                |_| Ok(()),
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_store_save_and_get() {
        let store = SqliteItemStore::in_memory().unwrap();
        store
            .save("posts", "p1", &json!({"id": "p1", "content": "hello"}), "me")
            .unwrap();

        let items = store.get_all("posts", "me").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["content"], "hello");
    }

    #[test]
    fn test_item_store_owner_isolation() {
        let store = SqliteItemStore::in_memory().unwrap();
        store.save("posts", "p1", &json!({"id": "p1"}), "alice").unwrap();
        store.save("posts", "p2", &json!({"id": "p2"}), "bob").unwrap();

        assert_eq!(store.get_all("posts", "alice").unwrap().len(), 1);
        assert_eq!(store.get_all("posts", "bob").unwrap().len(), 1);
    }

    #[test]
    fn test_item_store_sync_all_replaces() {
        let store = SqliteItemStore::in_memory().unwrap();
        store.save("peers", "a", &json!({"id": "a"}), "me").unwrap();
        store.save("peers", "b", &json!({"id": "b"}), "me").unwrap();

        store
            .sync_all("peers", &[("c".to_string(), json!({"id": "c"}))], "me")
            .unwrap();

        let items = store.get_all("peers", "me").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "c");
    }

    #[test]
    fn test_blob_store_roundtrip() {
        let store = SqliteBlobStore::in_memory().unwrap();
        store.save("m1", &[1, 2, 3, 4], "token-1").unwrap();

        assert!(store.has("m1"));
        assert!(!store.has("m2"));
        assert_eq!(store.get("m1").unwrap().unwrap(), vec![1, 2, 3, 4]);
        assert!(store.get("m2").unwrap().is_none());
    }

    #[test]
    fn test_blob_store_capability_token() {
        let store = SqliteBlobStore::in_memory().unwrap();
        store.save("m1", &[9, 9], "secret").unwrap();

        assert!(store.verify_access("m1", "secret"));
        assert!(!store.verify_access("m1", "wrong"));
        assert!(!store.verify_access("missing", "secret"));
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bfx_core::config::EngineConfig;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

const SCHEMA_VERSION: u32 = 1;

/// An ordered, duplicate-key store: a key may hold many values, returned
/// in insertion order. This is the engine's substitute for the original's
/// B-tree duplicate-key cursor semantics.
pub trait DupStore {
    /// Append `value` under `key`, after any values already stored there.
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// All values stored under `key`, oldest first. Empty if the key is
    /// absent.
    fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StorageError>;

    /// The first (oldest) value stored under `key`, if any.
    fn get_first(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove every value stored under `key`.
    fn delete_key(&mut self, key: &[u8]) -> Result<(), StorageError>;

    /// Every distinct key currently populated, in ascending byte order.
    fn keys(&self) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Keys whose bytes start with `prefix`, in ascending order. Used by
    /// the shard router and by `find_key`-style prefix lookups.
    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError>;

    fn set_meta(&mut self, name: &str, value: &[u8]) -> Result<(), StorageError>;
    fn get_meta(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a named meta entry, if present. A no-op if absent.
    fn delete_meta(&mut self, name: &str) -> Result<(), StorageError>;

    fn flush(&mut self) -> Result<(), StorageError>;
}

/// Path for shard `index` alongside the primary store at `path`:
/// `<path>.<index>`, per the data model's shard file naming (`<path>`,
/// `<path>.0` … `<path>.(subcount-1)`).
pub fn shard_path(path: &Path, index: u32) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".{index}"));
    PathBuf::from(os)
}

/// SQLite-backed [`DupStore`]. Duplicate keys are modeled with a composite
/// `(key, seq)` primary key; `seq` is a monotonically increasing per-key
/// counter that preserves insertion order under an ascending scan.
pub struct SqliteDupStore {
    conn: Connection,
    read_only: bool,
}

impl SqliteDupStore {
    /// Open (creating if absent) with the workspace-default tuning.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_config(path, &EngineConfig::default())
    }

    /// Open (creating if absent) applying `config`'s `page_size` and
    /// `cache_size_bytes` as the connection's pragmas. Page size is a
    /// one-time-effective `PRAGMA page_size` on first creation of the
    /// database file; cache size is per-connection and re-applied on
    /// every open.
    pub fn open_with_config(path: &Path, config: &EngineConfig) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, false, config)
    }

    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        Self::open_read_only_with_config(path, &EngineConfig::default().read_only())
    }

    pub fn open_read_only_with_config(
        path: &Path,
        config: &EngineConfig,
    ) -> Result<Self, StorageError> {
        if !path.exists() {
            return Err(StorageError::NotFound);
        }
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        configure_pragmas(&conn, true, config)?;
        let stored = get_user_version(&conn)?;
        if stored != 0 && stored != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch { expected: SCHEMA_VERSION, actual: stored });
        }
        Ok(Self { conn, read_only: true })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, false, &EngineConfig::default())
    }

    fn from_connection(
        conn: Connection,
        read_only: bool,
        config: &EngineConfig,
    ) -> Result<Self, StorageError> {
        configure_pragmas(&conn, read_only, config)?;
        let stored = get_user_version(&conn)?;
        if stored != 0 && stored != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch { expected: SCHEMA_VERSION, actual: stored });
        }
        create_schema(&conn)?;
        set_user_version(&conn, SCHEMA_VERSION)?;
        Ok(Self { conn, read_only })
    }

    fn next_seq(&self, key: &[u8]) -> Result<i64, StorageError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM postings WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(max.map(|m| m + 1).unwrap_or(0))
    }
}

impl DupStore for SqliteDupStore {
    #[tracing::instrument(skip(self, value), fields(key_len = key.len(), value_len = value.len()))]
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let seq = self.next_seq(key)?;
        self.conn.execute(
            "INSERT INTO postings (key, seq, value) VALUES (?1, ?2, ?3)",
            params![key, seq, value],
        )?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM postings WHERE key = ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, Vec<u8>>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn get_first(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.conn
            .query_row(
                "SELECT value FROM postings WHERE key = ?1 ORDER BY seq ASC LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)
    }

    fn delete_key(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.conn.execute("DELETE FROM postings WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT key FROM postings ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.keys()?.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    fn set_meta(&mut self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.conn.execute(
            "INSERT INTO meta (name, value) VALUES (?1, ?2) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    fn get_meta(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.conn
            .query_row("SELECT value FROM meta WHERE name = ?1", params![name], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)
    }

    fn delete_meta(&mut self, name: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.conn.execute("DELETE FROM meta WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn configure_pragmas(
    conn: &Connection,
    read_only: bool,
    config: &EngineConfig,
) -> Result<(), StorageError> {
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    if !read_only {
        conn.pragma_update(None, "page_size", config.page_size)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA synchronous = NORMAL;",
        )?;
    }
    // A negative `cache_size` is a KiB budget in SQLite's own pragma
    // convention; the engine's cache budget is expressed in bytes, so a
    // byte count of 0 (the read-write library default) leaves the
    // pragma untouched rather than pinning the cache to zero pages.
    if config.cache_size_bytes != 0 {
        conn.pragma_update(None, "cache_size", -(config.cache_size_bytes / 1024))?;
    }
    Ok(())
}

fn get_user_version(conn: &Connection) -> Result<u32, StorageError> {
    let v: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

fn set_user_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS postings (
            key   BLOB NOT NULL,
            seq   INTEGER NOT NULL,
            value BLOB NOT NULL,
            PRIMARY KEY (key, seq)
        ) WITHOUT ROWID;
         CREATE TABLE IF NOT EXISTS meta (
            name  TEXT PRIMARY KEY,
            value BLOB NOT NULL
         );",
    )?;
    Ok(())
}

/// In-memory [`DupStore`] test double. Mirrors [`SqliteDupStore`]'s
/// insertion-order and read-only semantics without touching disk.
#[derive(Default)]
pub struct MemDupStore {
    postings: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
    meta: BTreeMap<String, Vec<u8>>,
    read_only: bool,
}

impl MemDupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl DupStore for MemDupStore {
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.postings.entry(key.to_vec()).or_default().push(value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.postings.get(key).cloned().unwrap_or_default())
    }

    fn get_first(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.postings.get(key).and_then(|v| v.first().cloned()))
    }

    fn delete_key(&mut self, key: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.postings.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.postings.keys().cloned().collect())
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.postings.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn set_meta(&mut self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.meta.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.meta.get(name).cloned())
    }

    fn delete_meta(&mut self, name: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.meta.remove(name);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_preserves_insertion_order() {
        let mut store = MemDupStore::new();
        store.insert(b"k", b"a").unwrap();
        store.insert(b"k", b"b").unwrap();
        store.insert(b"k", b"c").unwrap();
        assert_eq!(store.get(b"k").unwrap(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(store.get_first(b"k").unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn mem_store_read_only_rejects_writes() {
        let mut store = MemDupStore::new().read_only();
        assert!(matches!(store.insert(b"k", b"v"), Err(StorageError::ReadOnly)));
    }

    #[test]
    fn sqlite_store_preserves_insertion_order() {
        let mut store = SqliteDupStore::open_in_memory().unwrap();
        store.insert(b"\xA4\xA4\x00", b"one").unwrap();
        store.insert(b"\xA4\xA4\x00", b"two").unwrap();
        let got = store.get(b"\xA4\xA4\x00").unwrap();
        assert_eq!(got, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn sqlite_store_distinct_keys_sorted() {
        let mut store = SqliteDupStore::open_in_memory().unwrap();
        store.insert(b"zz", b"1").unwrap();
        store.insert(b"aa", b"2").unwrap();
        store.insert(b"aa", b"3").unwrap();
        assert_eq!(store.keys().unwrap(), vec![b"aa".to_vec(), b"zz".to_vec()]);
    }

    #[test]
    fn sqlite_store_meta_round_trip() {
        let mut store = SqliteDupStore::open_in_memory().unwrap();
        assert_eq!(store.get_meta("_idxcount").unwrap(), None);
        store.set_meta("_idxcount", b"42").unwrap();
        store.set_meta("_idxcount", b"43").unwrap();
        assert_eq!(store.get_meta("_idxcount").unwrap(), Some(b"43".to_vec()));
    }

    #[test]
    fn sqlite_store_meta_delete() {
        let mut store = SqliteDupStore::open_in_memory().unwrap();
        store.set_meta("_subcount", b"4").unwrap();
        store.delete_meta("_subcount").unwrap();
        assert_eq!(store.get_meta("_subcount").unwrap(), None);
    }

    #[test]
    fn shard_path_appends_index_after_the_full_path() {
        let base = Path::new("/var/data/index.db");
        assert_eq!(shard_path(base, 0), Path::new("/var/data/index.db.0"));
        assert_eq!(shard_path(base, 3), Path::new("/var/data/index.db.3"));
    }

    #[test]
    fn sqlite_store_prefix_scan() {
        let mut store = SqliteDupStore::open_in_memory().unwrap();
        store.insert(b"ab", b"1").unwrap();
        store.insert(b"ac", b"2").unwrap();
        store.insert(b"bb", b"3").unwrap();
        assert_eq!(store.keys_with_prefix(b"a").unwrap(), vec![b"ab".to_vec(), b"ac".to_vec()]);
    }
}

//! Generic record storage: SQLite for data + secondary indexes, a JSONL
//! append log per collection for audit/replay, and a best-effort git
//! snapshot commit on `sync`.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, FilterOp};
use crate::git;
use crate::record::{IndexValue, Record, now_ms};

/// Opened persistent store. One `Store` multiplexes every `Record` type
/// that is passed to it — each type's rows are keyed by its
/// `Record::collection_name()`.
///
/// Holds an exclusive advisory lock on `{dir}/store.lock` for as long as
/// it's open, so a second process opening the same directory fails fast
/// instead of racing the first on the sqlite file.
pub struct Store {
    dir: PathBuf,
    conn: Connection,
    _lock: File,
}

impl Store {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        debug!(?dir, "Store::open: called");
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(dir.join("jsonl"))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(dir.join("store.lock"))?;
        lock_file.try_lock_exclusive().map_err(|e| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("store at {dir:?} is already open by another process: {e}"),
            ))
        })?;

        let conn = Connection::open(dir.join("store.db"))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS record_index (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (collection, id, field)
            );
            CREATE INDEX IF NOT EXISTS record_index_lookup
                ON record_index (collection, field, value);
            ",
        )?;

        debug!(?dir, "Store::open: ready");
        Ok(Self {
            dir,
            conn,
            _lock: lock_file,
        })
    }

    /// Insert a new record. Fails with `AlreadyExists` if the id is already
    /// present in this collection.
    pub fn create<T: Record>(&mut self, record: T) -> StoreResult<String> {
        let collection = T::collection_name();
        let id = record.id().to_string();
        debug!(collection, %id, "Store::create: called");

        if self.get::<T>(&id)?.is_some() {
            return Err(StoreError::AlreadyExists(id));
        }

        self.write_record(collection, &id, &record)?;
        self.append_jsonl(collection, &serde_json::to_value(&record)?)?;
        debug!(collection, %id, "Store::create: inserted");
        Ok(id)
    }

    /// Replace an existing record (or insert it, if absent — last-write-wins).
    pub fn update<T: Record>(&mut self, record: T) -> StoreResult<()> {
        let collection = T::collection_name();
        let id = record.id().to_string();
        debug!(collection, %id, "Store::update: called");

        self.write_record(collection, &id, &record)?;
        self.append_jsonl(collection, &serde_json::to_value(&record)?)?;
        debug!(collection, %id, "Store::update: replaced");
        Ok(())
    }

    /// Fetch one record by id.
    pub fn get<T: Record>(&self, id: &str) -> StoreResult<Option<T>> {
        let collection = T::collection_name();
        debug!(collection, %id, "Store::get: called");
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Delete a record by id. Not an error if it doesn't exist.
    pub fn delete<T: Record>(&mut self, id: &str) -> StoreResult<()> {
        let collection = T::collection_name();
        debug!(collection, %id, "Store::delete: called");
        self.conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        self.conn.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        self.append_jsonl(collection, &serde_json::json!({"_deleted": true, "id": id}))?;
        Ok(())
    }

    /// List every record of type `T` matching all of `filters` (AND'd).
    /// An empty filter slice returns the whole collection.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let collection = T::collection_name();
        debug!(collection, filters = filters.len(), "Store::list: called");

        let ids = if filters.is_empty() {
            None
        } else {
            let mut matched: Option<HashSet<String>> = None;
            for filter in filters {
                let set = self.ids_matching(collection, filter)?;
                matched = Some(match matched {
                    Some(existing) => existing.intersection(&set).cloned().collect(),
                    None => set,
                });
            }
            Some(matched.unwrap_or_default())
        };

        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((id, data))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, data) = row?;
            if let Some(ids) = &ids {
                if !ids.contains(&id) {
                    continue;
                }
            }
            out.push(serde_json::from_str(&data)?);
        }
        debug!(collection, count = out.len(), "Store::list: returning");
        Ok(out)
    }

    fn ids_matching(&self, collection: &str, filter: &Filter) -> StoreResult<HashSet<String>> {
        match filter.op {
            FilterOp::Eq => {
                let mut stmt = self.conn.prepare(
                    "SELECT id FROM record_index WHERE collection = ?1 AND field = ?2 AND value = ?3",
                )?;
                let rows = stmt.query_map(
                    params![collection, filter.field, filter.value.as_sql_text()],
                    |row| row.get::<_, String>(0),
                )?;
                Ok(rows.collect::<Result<_, _>>()?)
            }
            FilterOp::Ne => {
                let mut stmt = self.conn.prepare(
                    "SELECT id FROM record_index WHERE collection = ?1 AND field = ?2 AND value != ?3
                     UNION
                     SELECT id FROM records WHERE collection = ?1 AND id NOT IN
                        (SELECT id FROM record_index WHERE collection = ?1 AND field = ?2)",
                )?;
                let rows = stmt.query_map(
                    params![collection, filter.field, filter.value.as_sql_text()],
                    |row| row.get::<_, String>(0),
                )?;
                Ok(rows.collect::<Result<_, _>>()?)
            }
        }
    }

    /// Recompute the secondary index for every stored record of type `T`
    /// from its current JSON blob. Returns the number of records reindexed.
    /// Call this once at startup after `open`, before serving reads.
    pub fn rebuild_indexes<T: Record>(&mut self) -> StoreResult<usize> {
        let collection = T::collection_name();
        debug!(collection, "Store::rebuild_indexes: called");
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM records WHERE collection = ?1")?;
        let rows: Vec<(String, String)> = stmt
            .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut count = 0;
        for (id, data) in rows {
            let record: T = serde_json::from_str(&data)?;
            self.write_index(collection, &id, &record)?;
            count += 1;
        }
        debug!(collection, count, "Store::rebuild_indexes: done");
        Ok(count)
    }

    /// Flush pending writes and take a best-effort git snapshot of the
    /// store directory. Safe to call even when the directory isn't a git
    /// repository.
    pub fn sync(&mut self) -> StoreResult<()> {
        debug!("Store::sync: called");
        self.conn
            .pragma_update(None, "wal_checkpoint", "TRUNCATE")
            .map_err(StoreError::from)?;
        git::snapshot(&self.dir, "taskdaemon store sync");
        Ok(())
    }

    fn write_record<T: Record>(&mut self, collection: &'static str, id: &str, record: &T) -> StoreResult<()> {
        let data = serde_json::to_string(record)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![collection, id, data, record.updated_at()],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        for (field, value) in record.indexed_fields() {
            tx.execute(
                "INSERT INTO record_index (collection, id, field, value) VALUES (?1, ?2, ?3, ?4)",
                params![collection, id, field, value.as_sql_text()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn write_index<T: Record>(&self, collection: &'static str, id: &str, record: &T) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        for (field, value) in record.indexed_fields() {
            self.conn.execute(
                "INSERT INTO record_index (collection, id, field, value) VALUES (?1, ?2, ?3, ?4)",
                params![collection, id, field, value.as_sql_text()],
            )?;
        }
        Ok(())
    }

    fn append_jsonl(&self, collection: &str, value: &serde_json::Value) -> StoreResult<()> {
        let path = self.dir.join("jsonl").join(format!("{collection}.jsonl"));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut entry = value.clone();
        if let Some(obj) = entry.as_object_mut() {
            obj.insert("_synced_at".to_string(), serde_json::json!(now_ms()));
        }
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }
}

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::database::schema::{CREATED_NOW, SCHEMA};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{op}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("record store connection poisoned by a panicked writer")]
    Poisoned,
}

fn ctx(op: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { op, source }
}

/// Store-assigned creation time, unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Timestamp),
    /// A record already exists under that name; nothing was written.
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureRecord {
    pub name: String,
    pub labels: Vec<String>,
    pub color: String,
    pub created: Timestamp,
}

/// Metadata for admitted pictures. Records are create-once and totally
/// ordered by arrival.
pub trait RecordStore: Send + Sync {
    fn create_if_absent(
        &self,
        name: &str,
        labels: &[String],
        color: &str,
    ) -> Result<CreateOutcome, StoreError>;

    /// Up to `n` records, newest first.
    fn most_recent(&self, n: usize) -> Result<Vec<PictureRecord>, StoreError>;

    fn get(&self, name: &str) -> Result<Option<PictureRecord>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(ctx("Failed to open database"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(ctx("Failed to set busy timeout"))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(ctx("Failed to open database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(ctx("Failed to initialize schema"))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn load_labels(conn: &Connection, picture_id: i64) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT t.name FROM picture_tags pt
             JOIN tags t ON t.id = pt.tag_id
             WHERE pt.picture_id = ?1
             ORDER BY pt.position",
        )
        .map_err(ctx("Failed to prepare label query"))?;
    let rows = stmt
        .query_map(params![picture_id], |row| row.get(0))
        .map_err(ctx("Failed to read labels"))?;
    let labels = rows
        .collect::<Result<Vec<String>, _>>()
        .map_err(ctx("Failed to read labels"))?;
    Ok(labels)
}

struct PictureRow {
    id: i64,
    name: String,
    color: String,
    created: i64,
}

impl PictureRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            created: row.get(3)?,
        })
    }

    fn into_record(self, conn: &Connection) -> Result<PictureRecord, StoreError> {
        Ok(PictureRecord {
            labels: load_labels(conn, self.id)?,
            name: self.name,
            color: self.color,
            created: Timestamp(self.created),
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn create_if_absent(
        &self,
        name: &str,
        labels: &[String],
        color: &str,
    ) -> Result<CreateOutcome, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(ctx("Failed to begin transaction"))?;

        let inserted: Option<(i64, i64)> = tx
            .query_row(
                &format!(
                    "INSERT INTO pictures (name, color, created)
                     VALUES (?1, ?2, {CREATED_NOW})
                     ON CONFLICT(name) DO NOTHING
                     RETURNING id, created"
                ),
                params![name, color],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(ctx("Failed to insert picture"))?;

        // Dropping the transaction rolls back, though nothing was written.
        let Some((picture_id, created)) = inserted else {
            return Ok(CreateOutcome::AlreadyExists);
        };

        {
            let mut stmt_tag = tx
                .prepare("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
                .map_err(ctx("Failed to prepare tag insert"))?;
            let mut stmt_get_tag_id = tx
                .prepare("SELECT id FROM tags WHERE name = ?1")
                .map_err(ctx("Failed to prepare tag lookup"))?;
            let mut stmt_picture_tag = tx
                .prepare(
                    "INSERT INTO picture_tags (picture_id, position, tag_id) VALUES (?1, ?2, ?3)",
                )
                .map_err(ctx("Failed to prepare label insert"))?;

            for (position, label) in labels.iter().enumerate() {
                stmt_tag
                    .execute(params![label])
                    .map_err(ctx("Failed to insert tag"))?;
                let tag_id: i64 = stmt_get_tag_id
                    .query_row(params![label], |row| row.get(0))
                    .map_err(ctx("Failed to get tag id after insert"))?;
                stmt_picture_tag
                    .execute(params![picture_id, position as i64, tag_id])
                    .map_err(ctx("Failed to insert label"))?;
            }
        }

        tx.commit().map_err(ctx("Failed to commit transaction"))?;
        Ok(CreateOutcome::Created(Timestamp(created)))
    }

    fn most_recent(&self, n: usize) -> Result<Vec<PictureRecord>, StoreError> {
        let conn = self.lock()?;
        let rows: Vec<PictureRow> = {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, color, created FROM pictures
                     ORDER BY created DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(ctx("Failed to prepare recent query"))?;
            let limit = i64::try_from(n).unwrap_or(i64::MAX);
            let mapped = stmt
                .query_map(params![limit], PictureRow::from_row)
                .map_err(ctx("Failed to query recent pictures"))?;
            let rows = mapped
                .collect::<Result<_, _>>()
                .map_err(ctx("Failed to query recent pictures"))?;
            rows
        };
        rows.into_iter().map(|row| row.into_record(&conn)).collect()
    }

    fn get(&self, name: &str) -> Result<Option<PictureRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, color, created FROM pictures WHERE name = ?1",
                params![name],
                PictureRow::from_row,
            )
            .optional()
            .map_err(ctx("Failed to get picture"))?;
        row.map(|row| row.into_record(&conn)).transpose()
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pictures", [], |row| row.get(0))
            .map_err(ctx("Failed to count pictures"))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use std::thread;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fill(store: &SqliteRecordStore, count: usize) -> Result<()> {
        for i in 0..count {
            store.create_if_absent(&format!("pic-{i}.jpg"), &labels(&["x"]), "#000000")?;
        }
        Ok(())
    }

    #[test]
    fn test_duplicate_create_keeps_first_record() -> Result<()> {
        let store = SqliteRecordStore::in_memory()?;
        let first = store.create_if_absent("cat.jpg", &labels(&["Cat", "Pet"]), "#aabbcc")?;
        let CreateOutcome::Created(created) = first else {
            panic!("first create should succeed");
        };

        let second = store.create_if_absent("cat.jpg", &labels(&["Dog"]), "#000000")?;
        assert_eq!(second, CreateOutcome::AlreadyExists);

        let record = store.get("cat.jpg")?.expect("record exists");
        assert_eq!(record.labels, labels(&["Cat", "Pet"]));
        assert_eq!(record.color, "#aabbcc");
        assert_eq!(record.created, created);
        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_label_order_survives_shared_tags() -> Result<()> {
        let store = SqliteRecordStore::in_memory()?;
        store.create_if_absent("a.jpg", &labels(&["Sky", "Tree", "Cloud"]), "#ffffff")?;
        store.create_if_absent("b.jpg", &labels(&["Cloud", "Sky"]), "#ffffff")?;

        assert_eq!(store.get("a.jpg")?.unwrap().labels, labels(&["Sky", "Tree", "Cloud"]));
        assert_eq!(store.get("b.jpg")?.unwrap().labels, labels(&["Cloud", "Sky"]));
        Ok(())
    }

    #[test]
    fn test_empty_labels_round_trip() -> Result<()> {
        let store = SqliteRecordStore::in_memory()?;
        store.create_if_absent("blank.png", &[], "#ffffff")?;
        assert!(store.get("blank.png")?.unwrap().labels.is_empty());
        assert!(store.get("missing.png")?.is_none());
        Ok(())
    }

    #[test]
    fn test_most_recent_quorum_sizes() -> Result<()> {
        for (stored, expected) in [(3, 3), (4, 4), (5, 4)] {
            let store = SqliteRecordStore::in_memory()?;
            fill(&store, stored)?;
            let recent = store.most_recent(4)?;
            assert_eq!(recent.len(), expected, "{stored} stored");

            let names: Vec<_> = recent.iter().map(|r| r.name.clone()).collect();
            let newest: Vec<_> = (0..stored)
                .rev()
                .take(expected)
                .map(|i| format!("pic-{i}.jpg"))
                .collect();
            assert_eq!(names, newest);
        }
        Ok(())
    }

    #[test]
    fn test_created_is_monotonic() -> Result<()> {
        let store = SqliteRecordStore::in_memory()?;
        fill(&store, 10)?;
        let recent = store.most_recent(10)?;
        for pair in recent.windows(2) {
            assert!(pair[0].created >= pair[1].created);
        }
        Ok(())
    }

    #[test]
    fn test_concurrent_creates_pick_one_winner() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(SqliteRecordStore::open(dir.path().join("pictures.db"))?);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.create_if_absent("race.jpg", &[format!("label-{i}")], "#123456")
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let CreateOutcome::Created(_) = handle.join().unwrap()? {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.count()?, 1);
        Ok(())
    }
}

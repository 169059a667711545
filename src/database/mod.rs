pub mod repo;
pub mod schema;

pub use repo::{CreateOutcome, PictureRecord, RecordStore, SqliteRecordStore, StoreError, Timestamp};

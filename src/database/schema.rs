pub const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS pictures (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        color TEXT NOT NULL,
        created INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    );

    CREATE TABLE IF NOT EXISTS picture_tags (
        picture_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        FOREIGN KEY(picture_id) REFERENCES pictures(id),
        FOREIGN KEY(tag_id) REFERENCES tags(id),
        PRIMARY KEY(picture_id, position)
    );

    CREATE INDEX IF NOT EXISTS idx_pictures_created ON pictures (created DESC, id DESC);
";

/// Store-side clock in unix milliseconds, never behind the newest record.
pub const CREATED_NOW: &str = "MAX(
    CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER),
    COALESCE((SELECT MAX(created) FROM pictures), 0)
)";

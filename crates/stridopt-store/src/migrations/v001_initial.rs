//! v001: the key-value table backing the session cache.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL              -- RFC-3339
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}

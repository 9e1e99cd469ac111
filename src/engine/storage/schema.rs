use rusqlite::{Connection, Result};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS window_switches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    window_title TEXT NOT NULL,
    process_name TEXT,
    display_id INTEGER,
    category TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_window_switches_timestamp
ON window_switches(timestamp);

CREATE INDEX IF NOT EXISTS idx_window_switches_category
ON window_switches(category);
"#;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
}

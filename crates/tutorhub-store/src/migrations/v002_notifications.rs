use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Persisted notification records (the in-app inbox)
CREATE TABLE IF NOT EXISTS notifications (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_id      TEXT NOT NULL,               -- FK -> users(id)
    kind         TEXT NOT NULL,               -- event type tag
    message      TEXT NOT NULL,
    action_url   TEXT,
    action_label TEXT,
    data         TEXT NOT NULL DEFAULT '{}',  -- JSON object
    created_at   TEXT NOT NULL,
    read_at      TEXT,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_created
    ON notifications(user_id, created_at DESC);

-- Per-user channel switches; a missing row means everything enabled
CREATE TABLE IF NOT EXISTS notification_preferences (
    user_id TEXT PRIMARY KEY NOT NULL,
    email   INTEGER NOT NULL DEFAULT 1,
    push    INTEGER NOT NULL DEFAULT 1,
    in_app  INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

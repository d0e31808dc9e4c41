//! v001 -- Initial schema creation.
//!
//! Creates the marketplace tables: `users`, `tutor_profiles`, `offerings`,
//! `messages` and `earnings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name       TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    role       TEXT NOT NULL,                 -- student | tutor | admin
    created_at TEXT NOT NULL                  -- RFC-3339, UTC, micros
);

-- ----------------------------------------------------------------
-- Tutor profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tutor_profiles (
    id                  TEXT PRIMARY KEY NOT NULL,
    user_id             TEXT NOT NULL UNIQUE,
    verification_status TEXT NOT NULL DEFAULT 'pending',
    is_verified         INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    verified_at         TEXT,
    verification_note   TEXT,
    documents           TEXT NOT NULL DEFAULT '[]',  -- JSON array of paths
    subjects            TEXT NOT NULL DEFAULT '[]',  -- JSON array
    hourly_rate_cents   INTEGER NOT NULL DEFAULT 0,
    available_weekdays  INTEGER NOT NULL DEFAULT 1,
    available_weekends  INTEGER NOT NULL DEFAULT 0,
    accepts_urgent      INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Offerings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS offerings (
    id                    TEXT PRIMARY KEY NOT NULL,
    student_id            TEXT NOT NULL,              -- FK -> users(id)
    tutor_id              TEXT,                       -- nullable FK -> users(id)
    title                 TEXT NOT NULL,
    description           TEXT NOT NULL,
    budget_cents          INTEGER NOT NULL CHECK (budget_cents >= 0),
    deadline              TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'pending',
    attachments           TEXT NOT NULL DEFAULT '[]', -- JSON array
    attachment_count      INTEGER NOT NULL DEFAULT 0,
    total_attachment_size INTEGER NOT NULL DEFAULT 0,
    last_activity_at      TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    deleted_at            TEXT,

    FOREIGN KEY (student_id) REFERENCES users(id),
    FOREIGN KEY (tutor_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_offerings_status ON offerings(status);
CREATE INDEX IF NOT EXISTS idx_offerings_created ON offerings(created_at);
CREATE INDEX IF NOT EXISTS idx_offerings_student ON offerings(student_id);
CREATE INDEX IF NOT EXISTS idx_offerings_tutor ON offerings(tutor_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,
    offering_id TEXT NOT NULL,                -- FK -> offerings(id)
    sender_id   TEXT NOT NULL,                -- FK -> users(id)
    content     TEXT NOT NULL,
    attachments TEXT NOT NULL DEFAULT '[]',   -- JSON array of paths
    read_at     TEXT,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT,

    FOREIGN KEY (offering_id) REFERENCES offerings(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_offering_created
    ON messages(offering_id, created_at DESC);

-- ----------------------------------------------------------------
-- Earnings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS earnings (
    id               TEXT PRIMARY KEY NOT NULL,
    tutor_id         TEXT NOT NULL,             -- FK -> users(id)
    offering_id      TEXT NOT NULL UNIQUE,      -- one earning per offering
    amount_cents     INTEGER NOT NULL,
    commission_cents INTEGER NOT NULL,
    status           TEXT NOT NULL DEFAULT 'pending',
    paid_at          TEXT,
    created_at       TEXT NOT NULL,
    deleted_at       TEXT,

    FOREIGN KEY (tutor_id) REFERENCES users(id),
    FOREIGN KEY (offering_id) REFERENCES offerings(id)
);

CREATE INDEX IF NOT EXISTS idx_earnings_tutor ON earnings(tutor_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `peers`, `messages` and `session`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Peers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS peers (
    id        TEXT PRIMARY KEY NOT NULL,
    username  TEXT NOT NULL,
    avatar    TEXT NOT NULL,
    status    TEXT NOT NULL DEFAULT 'offline', -- 'online' | 'offline'
    last_seen TEXT                             -- ISO-8601 / RFC-3339, nullable
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,     -- PKT-XXXXXXXXX
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    content     TEXT NOT NULL,
    kind        TEXT NOT NULL DEFAULT 'text',  -- 'text' | 'image'
    media_url   TEXT,                          -- data URL for image messages
    sent_at     TEXT NOT NULL,                 -- ISO-8601
    status      TEXT NOT NULL DEFAULT 'sent'   -- 'sent' | 'delivered' | 'read'
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_messages_receiver_status
    ON messages(receiver_id, status);

-- ----------------------------------------------------------------
-- Session (single-row slot for the signed-in user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS session (
    slot     INTEGER PRIMARY KEY CHECK (slot = 0),
    peer_id  TEXT NOT NULL,
    saved_at TEXT NOT NULL,

    FOREIGN KEY (peer_id) REFERENCES peers(id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

use chrono::{DateTime, Utc};
use rusqlite::params;

use aura_shared::types::{Peer, PeerStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

fn status_str(status: PeerStatus) -> &'static str {
    match status {
        PeerStatus::Online => "online",
        PeerStatus::Offline => "offline",
    }
}

fn parse_status(s: &str) -> PeerStatus {
    match s {
        "online" => PeerStatus::Online,
        _ => PeerStatus::Offline,
    }
}

impl Database {
    /// Insert or refresh a peer profile.
    pub fn upsert_peer(&self, peer: &Peer) -> Result<()> {
        self.conn().execute(
            "INSERT INTO peers (id, username, avatar, status, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 avatar = excluded.avatar,
                 status = excluded.status,
                 last_seen = excluded.last_seen",
            params![
                peer.id.as_str(),
                peer.username,
                peer.avatar,
                status_str(peer.status),
                peer.last_seen.map(|ts| ts.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_peer(&self, id: &UserId) -> Result<Peer> {
        self.conn()
            .query_row(
                "SELECT id, username, avatar, status, last_seen FROM peers WHERE id = ?1",
                params![id.as_str()],
                row_to_peer,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_peers(&self) -> Result<Vec<Peer>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, username, avatar, status, last_seen FROM peers ORDER BY username")?;

        let rows = stmt.query_map([], row_to_peer)?;

        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    let id: String = row.get(0)?;
    let username: String = row.get(1)?;
    let avatar: String = row.get(2)?;
    let status: String = row.get(3)?;
    let last_seen_str: Option<String> = row.get(4)?;

    let last_seen: Option<DateTime<Utc>> = match last_seen_str {
        Some(ts) => Some(
            DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        ),
        None => None,
    };

    Ok(Peer {
        id: UserId::new(id),
        username,
        avatar,
        status: parse_status(&status),
        last_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_upsert_and_get() {
        let (_dir, db) = open_db();

        let mut peer = Peer::new(UserId::new("u1"), "alice", "avatar://u1");
        db.upsert_peer(&peer).unwrap();

        peer.status = PeerStatus::Online;
        peer.last_seen = Some(Utc::now());
        db.upsert_peer(&peer).unwrap();

        let stored = db.get_peer(&UserId::new("u1")).unwrap();
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.status, PeerStatus::Online);
        assert!(stored.last_seen.is_some());
    }

    #[test]
    fn test_list_ordered_by_username() {
        let (_dir, db) = open_db();

        db.upsert_peer(&Peer::new(UserId::new("u1"), "zoe", "a"))
            .unwrap();
        db.upsert_peer(&Peer::new(UserId::new("u2"), "amir", "b"))
            .unwrap();

        let peers = db.list_peers().unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].username, "amir");
        assert_eq!(peers[1].username, "zoe");
    }

    #[test]
    fn test_get_missing_peer() {
        let (_dir, db) = open_db();
        assert!(matches!(
            db.get_peer(&UserId::new("ghost")),
            Err(StoreError::NotFound)
        ));
    }
}

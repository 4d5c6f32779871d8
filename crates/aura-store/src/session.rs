//! The signed-in session slot.
//!
//! A single-row table keeps the identity of the signed-in user so the app
//! can restore the session on relaunch without a fresh login.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use aura_shared::types::{Peer, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Persist the signed-in user. The profile itself is upserted first so
    /// the session row always references a known peer.
    pub fn save_session(&self, peer: &Peer) -> Result<()> {
        self.upsert_peer(peer)?;
        self.conn().execute(
            "INSERT INTO session (slot, peer_id, saved_at) VALUES (0, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET
                 peer_id = excluded.peer_id,
                 saved_at = excluded.saved_at",
            params![peer.id.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The signed-in user, if any.
    pub fn load_session(&self) -> Result<Option<Peer>> {
        let peer_id: Option<String> = self
            .conn()
            .query_row("SELECT peer_id FROM session WHERE slot = 0", [], |row| {
                row.get(0)
            })
            .optional()?;

        match peer_id {
            Some(id) => Ok(Some(self.get_peer(&UserId::new(id))?)),
            None => Ok(None),
        }
    }

    /// Forget the signed-in user (logout).
    pub fn clear_session(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM session WHERE slot = 0", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        assert!(db.load_session().unwrap().is_none());

        let peer = Peer::new(UserId::new("u1"), "alice", "avatar://u1");
        db.save_session(&peer).unwrap();

        let restored = db.load_session().unwrap().unwrap();
        assert_eq!(restored.id, UserId::new("u1"));

        db.clear_session().unwrap();
        assert!(db.load_session().unwrap().is_none());
    }

    #[test]
    fn test_session_slot_is_single() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        db.save_session(&Peer::new(UserId::new("u1"), "alice", "a"))
            .unwrap();
        db.save_session(&Peer::new(UserId::new("u2"), "bob", "b"))
            .unwrap();

        let restored = db.load_session().unwrap().unwrap();
        assert_eq!(restored.id, UserId::new("u2"));
    }
}

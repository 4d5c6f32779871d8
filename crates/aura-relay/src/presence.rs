//! Presence directory.
//!
//! Mirrors the relay's live roster: every registered peer with online
//! status and last-seen marker. Peers are never deleted, logout is a
//! soft-offline. The built-in assistant contact is always present and
//! always online.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use aura_shared::constants::{ASSISTANT_AVATAR, ASSISTANT_USERNAME, ASSISTANT_USER_ID};
use aura_shared::types::{Peer, PeerStatus, UserId};

#[derive(Clone)]
pub struct PresenceDirectory {
    peers: Arc<Mutex<HashMap<UserId, Peer>>>,
    roster_tx: Arc<watch::Sender<Vec<Peer>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        let assistant = Peer {
            id: UserId::new(ASSISTANT_USER_ID),
            username: ASSISTANT_USERNAME.to_string(),
            avatar: ASSISTANT_AVATAR.to_string(),
            status: PeerStatus::Online,
            last_seen: None,
        };

        let mut peers = HashMap::new();
        peers.insert(assistant.id.clone(), assistant.clone());

        let (roster_tx, _) = watch::channel(vec![assistant]);

        Self {
            peers: Arc::new(Mutex::new(peers)),
            roster_tx: Arc::new(roster_tx),
        }
    }

    /// Register or re-announce a peer as online.
    pub fn announce(&self, mut peer: Peer) {
        peer.status = PeerStatus::Online;
        peer.last_seen = Some(Utc::now());

        info!(peer = %peer.id.short(), name = %peer.username, "Peer online");

        let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        peers.insert(peer.id.clone(), peer);
        self.broadcast(&peers);
    }

    /// Mark a peer offline. The record is kept with its last-seen marker.
    pub fn set_offline(&self, id: &UserId) {
        let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(peer) = peers.get_mut(id) {
            if peer.id.is_assistant() {
                return;
            }
            peer.status = PeerStatus::Offline;
            peer.last_seen = Some(Utc::now());
            debug!(peer = %id.short(), "Peer offline");
        }
        self.broadcast(&peers);
    }

    pub fn get(&self, id: &UserId) -> Option<Peer> {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Everyone except the viewer, assistant pinned first.
    pub fn roster(&self, viewer: &UserId) -> Vec<Peer> {
        let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        Self::view(&peers, viewer)
    }

    /// Live roster updates. The broadcast value is the unfiltered peer
    /// list; apply [`PresenceDirectory::roster`]-style filtering per viewer.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Peer>> {
        self.roster_tx.subscribe()
    }

    pub fn peer_count(&self) -> usize {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn view(peers: &HashMap<UserId, Peer>, viewer: &UserId) -> Vec<Peer> {
        let mut others: Vec<Peer> = peers
            .values()
            .filter(|p| &p.id != viewer && !p.id.is_assistant())
            .cloned()
            .collect();
        others.sort_by(|a, b| a.username.cmp(&b.username));

        let mut roster = Vec::with_capacity(others.len() + 1);
        if let Some(assistant) = peers.get(&UserId::new(ASSISTANT_USER_ID)) {
            roster.push(assistant.clone());
        }
        roster.extend(others);
        roster
    }

    fn broadcast(&self, peers: &HashMap<UserId, Peer>) {
        let mut all: Vec<Peer> = peers.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        let _ = self.roster_tx.send(all);
    }
}

impl Default for PresenceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

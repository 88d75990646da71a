//! Server session registry.
//!
//! Tracks every inbound peer's authentication status plus the display name
//! it introduced itself with, and answers capacity questions.

use std::collections::HashMap;

use crate::state::player::{PlayerEntry, PlayerStatus};
use crate::types::PeerId;

/// Peer → status mapping owned by a server.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    /// Entries keyed by peer. No ordering guarantee.
    entries: HashMap<PeerId, PlayerEntry>,

    /// Display names captured during introduction.
    names: HashMap<PeerId, String>,

    max_players: usize,
}

impl SessionRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            entries: HashMap::new(),
            names: HashMap::new(),
            max_players,
        }
    }

    // ── Capacity ──────────────────────────────────────────────────

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn set_max_players(&mut self, max_players: usize) {
        self.max_players = max_players;
    }

    /// Returns `true` if admitting `peer` would exceed capacity, counting
    /// every entry except `peer`'s own.
    pub fn is_full_for(&self, peer: PeerId) -> bool {
        let others = self.entries.keys().filter(|&&p| p != peer).count();
        others >= self.max_players
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.entries.contains_key(&peer)
    }

    pub fn get(&self, peer: PeerId) -> Option<&PlayerEntry> {
        self.entries.get(&peer)
    }

    pub fn status(&self, peer: PeerId) -> Option<PlayerStatus> {
        self.entries.get(&peer).map(|e| e.status)
    }

    pub fn name(&self, peer: PeerId) -> Option<&str> {
        self.names.get(&peer).map(String::as_str)
    }

    /// Number of entries with `status`.
    pub fn count(&self, status: PlayerStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.entries.keys().copied().collect()
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> Vec<(PeerId, PlayerEntry)> {
        self.entries.iter().map(|(&p, &e)| (p, e)).collect()
    }

    // ── Mutation ──────────────────────────────────────────────────

    /// Insert `peer` as `Pending` unless it already has an entry.
    /// Returns `true` if an entry was created.
    pub fn insert_pending(&mut self, peer: PeerId) -> bool {
        if self.entries.contains_key(&peer) {
            return false;
        }
        self.entries.insert(peer, PlayerEntry::pending());
        true
    }

    /// Record that `peer`'s ticket was handed to the backend. Creates a
    /// `Pending` entry if needed.
    pub fn mark_ticket_submitted(&mut self, peer: PeerId) {
        self.entries
            .entry(peer)
            .or_insert_with(PlayerEntry::pending)
            .ticket_submitted = true;
    }

    /// `Pending` → `InServer`. Returns `false` if `peer` has no entry.
    pub fn promote(&mut self, peer: PeerId) -> bool {
        match self.entries.get_mut(&peer) {
            Some(entry) => {
                entry.status = PlayerStatus::InServer;
                true
            }
            None => false,
        }
    }

    /// Overwrites any previous name.
    pub fn set_name(&mut self, peer: PeerId, name: impl Into<String>) {
        self.names.insert(peer, name.into());
    }

    /// Remove `peer` and its name.
    pub fn remove(&mut self, peer: PeerId) -> Option<PlayerEntry> {
        self.names.remove(&peer);
        self.entries.remove(&peer)
    }

    /// Remove everything, returning the entries.
    pub fn drain(&mut self) -> Vec<(PeerId, PlayerEntry)> {
        self.names.clear();
        self.entries.drain().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_PLAYERS)
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_promote_remove() {
        let mut reg = SessionRegistry::new(4);
        let p = PeerId(1);

        assert!(reg.insert_pending(p));
        assert!(!reg.insert_pending(p));
        assert_eq!(reg.status(p), Some(PlayerStatus::Pending));
        assert!(!reg.get(p).unwrap().ticket_submitted);

        reg.mark_ticket_submitted(p);
        assert!(reg.get(p).unwrap().ticket_submitted);

        assert!(reg.promote(p));
        assert_eq!(reg.status(p), Some(PlayerStatus::InServer));
        assert_eq!(reg.count(PlayerStatus::InServer), 1);

        assert!(reg.remove(p).is_some());
        assert!(reg.is_empty());
        assert!(!reg.promote(p));
    }

    #[test]
    fn capacity_excludes_own_entry() {
        let mut reg = SessionRegistry::new(1);
        let a = PeerId(1);
        let b = PeerId(2);

        reg.insert_pending(a);
        assert!(!reg.is_full_for(a));
        assert!(reg.is_full_for(b));

        reg.insert_pending(b);
        assert!(reg.is_full_for(b));

        reg.set_max_players(2);
        assert!(!reg.is_full_for(b));
    }

    #[test]
    fn names_are_overwritten_and_cleared() {
        let mut reg = SessionRegistry::new(4);
        let p = PeerId(7);
        reg.insert_pending(p);
        reg.set_name(p, "Nova");
        reg.set_name(p, "Nova2");
        assert_eq!(reg.name(p), Some("Nova2"));
        reg.remove(p);
        assert_eq!(reg.name(p), None);
    }

    #[test]
    fn mark_ticket_creates_entry() {
        let mut reg = SessionRegistry::new(4);
        reg.mark_ticket_submitted(PeerId(3));
        let entry = reg.get(PeerId(3)).unwrap();
        assert_eq!(entry.status, PlayerStatus::Pending);
        assert!(entry.ticket_submitted);
    }

    #[test]
    fn counts_and_drain() {
        let mut reg = SessionRegistry::new(8);
        for id in 1..=3 {
            reg.insert_pending(PeerId(id));
        }
        reg.promote(PeerId(2));
        reg.set_name(PeerId(2), "Ash");
        assert_eq!(reg.count(PlayerStatus::Pending), 2);
        assert_eq!(reg.count(PlayerStatus::InServer), 1);
        assert_eq!(reg.snapshot().len(), 3);

        let drained = reg.drain();
        assert_eq!(drained.len(), 3);
        assert!(reg.is_empty());
        assert_eq!(reg.name(PeerId(2)), None);
    }
}

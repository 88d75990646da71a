//! Server-side per-peer status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Authentication status of a remote peer. Absence from the registry
/// means the peer is not connected at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    /// Session accepted or ticket submitted; validation not finished.
    Pending,
    /// Ticket validated.
    InServer,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InServer => write!(f, "InServer"),
        }
    }
}

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub status: PlayerStatus,
    /// Whether the backend holds an auth session for this peer.
    pub ticket_submitted: bool,
}

impl PlayerEntry {
    pub fn pending() -> Self {
        Self {
            status: PlayerStatus::Pending,
            ticket_submitted: false,
        }
    }

    pub fn is_in_server(&self) -> bool {
        self.status == PlayerStatus::InServer
    }
}

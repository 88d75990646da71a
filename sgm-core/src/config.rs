//! Role configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SgmError};

/// Capacity applied when none is configured.
pub const DEFAULT_MAX_PLAYERS: usize = 32;

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in session info replies.
    pub name: String,
    /// Maximum number of registry entries.
    pub max_players: usize,
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name sent with the introduction.
    pub display_name: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "SGMulti Server".into(),
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: "Player".into(),
        }
    }
}

// ── Validation ───────────────────────────────────────────────────

impl ServerConfig {
    /// Reject settings no server can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_players == 0 {
            return Err(SgmError::Config("max_players must be at least 1".into()));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

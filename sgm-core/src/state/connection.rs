//! Client connection status.
//!
//! Provides a `ConnectionStatus` enum that models one outbound connection
//! attempt, with validated transitions that return `Result` instead of
//! panicking.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{Result, SgmError};

// ── ConnectionStatus ─────────────────────────────────────────────

/// The current status of a client's connection.
///
/// ```text
///  Unknown ──► Connecting ──► Connected
///     ▲            │              │
///     │            ▼              ▼
///     └───────── Failed ◄─────────┘
/// ```
///
/// `connect_to` may restart from any status, so `Failed` and `Connected`
/// can also go straight back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Never connected, or left gracefully.
    #[default]
    Unknown,

    /// Introduction sent; waiting for the echo and the auth verdict.
    Connecting,

    /// The server accepted our ticket.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// The last attempt or connection ended with an error.
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// How long the connection has been in the `Connected` state.
    ///
    /// Returns `None` for any other status.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`. Valid from any status.
    pub fn begin_connect(&mut self) {
        *self = Self::Connecting;
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_auth(&mut self) -> Result<()> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(SgmError::ProtocolViolation(
                "cannot complete auth: not in Connecting state",
            )),
        }
    }

    /// Force `Failed` regardless of the current status.
    pub fn fail(&mut self) {
        *self = Self::Failed;
    }

    /// Back to `Unknown` after a graceful leave.
    pub fn reset(&mut self) {
        *self = Self::Unknown;
    }
}

// ── Tests ────────────────────────────────────────────────────────

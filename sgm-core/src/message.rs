//! Protocol identifiers and wire enums.
//!
//! Uses proper enums with `TryFrom`, so unknown wire values become errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SgmError;

// ── PacketKind ───────────────────────────────────────────────────

/// Message kinds reserved by the protocol.
///
/// Organized by category:
/// - `0x0000`: Invalid (reserved)
/// - `0x0011..0x00FF`: Remote objects (payload opaque to the core)
/// - `0x0101`: Introduction / nonce echo
/// - `0xFAxx`: Authentication
/// - `0xFBxx`: Disconnection
/// - `0xFCxx`: Session queries
///
/// Any other tag is an application kind and is legal on a packet; it
/// simply does not map onto this enum.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Invalid = 0x0000,

    // ── Remote objects (0x00xx) ──────────────────────────────────
    /// Spawn an object on every peer.
    InstantiateRemoteObject = 0x0011,
    /// Application payload describing a spawned object.
    RemoteObjectInfo = 0x0012,

    // ── Handshake (0x01xx) ───────────────────────────────────────
    /// Client → server: nonce and display name. Server → client: nonce echo.
    Introduction = 0x0101,

    // ── Auth (0xFAxx) ────────────────────────────────────────────
    /// Client → server: auth ticket.
    DoAuth = 0xFAFA,
    /// Server → client: error code and optional reason.
    AuthFailed = 0xFAFB,
    /// Server → client: ticket accepted.
    AuthSuccess = 0xFAFC,

    // ── Disconnect (0xFBxx) ──────────────────────────────────────
    /// Client → server: graceful leave.
    UserDisconnected = 0xFBFA,
    /// Server → client: removed by the server.
    UserKicked = 0xFBFB,

    // ── Session (0xFCxx) ─────────────────────────────────────────
    /// Request (empty) and response (id, secure flag, name).
    SessionInfo = 0xFCFA,
}

impl TryFrom<u64> for PacketKind {
    type Error = SgmError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(PacketKind::Invalid),
            0x0011 => Ok(PacketKind::InstantiateRemoteObject),
            0x0012 => Ok(PacketKind::RemoteObjectInfo),
            0x0101 => Ok(PacketKind::Introduction),
            0xFAFA => Ok(PacketKind::DoAuth),
            0xFAFB => Ok(PacketKind::AuthFailed),
            0xFAFC => Ok(PacketKind::AuthSuccess),
            0xFBFA => Ok(PacketKind::UserDisconnected),
            0xFBFB => Ok(PacketKind::UserKicked),
            0xFCFA => Ok(PacketKind::SessionInfo),
            _ => Err(SgmError::UnknownVariant {
                type_name: "PacketKind",
                value: value as i64,
            }),
        }
    }
}

impl From<PacketKind> for u64 {
    fn from(kind: PacketKind) -> u64 {
        kind as u64
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── ConnectionError ──────────────────────────────────────────────

/// Why a connection ended. Travels on the wire as an `i32`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionError {
    Unknown = -1,
    AuthenticationError = 0,
    ServerFull = 1,
}

impl TryFrom<i32> for ConnectionError {
    type Error = SgmError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ConnectionError::Unknown),
            0 => Ok(ConnectionError::AuthenticationError),
            1 => Ok(ConnectionError::ServerFull),
            _ => Err(SgmError::UnknownVariant {
                type_name: "ConnectionError",
                value: value as i64,
            }),
        }
    }
}

impl From<ConnectionError> for i32 {
    fn from(error: ConnectionError) -> i32 {
        error as i32
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── SendType ─────────────────────────────────────────────────────

/// Delivery guarantee requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SendType {
    /// Fire and forget; may be dropped or reordered.
    Unreliable,
    /// Unreliable and sent immediately without batching.
    UnreliableNoDelay,
    /// Retransmitted until acknowledged.
    #[default]
    Reliable,
    /// Reliable, but small messages may be coalesced.
    ReliableWithBuffering,
}

// ── SessionError ─────────────────────────────────────────────────

/// Transport-level reason a P2P session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionError {
    #[default]
    None,
    /// The remote peer is not running the application.
    NotRunningApp,
    /// The remote peer does not own the application.
    NoRightsToApp,
    /// The remote user is not logged in to the platform.
    DestinationNotLoggedIn,
    Timeout,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::None => write!(f, "no error"),
            SessionError::NotRunningApp => write!(f, "target is not running the app"),
            SessionError::NoRightsToApp => write!(f, "local user does not own the app"),
            SessionError::DestinationNotLoggedIn => write!(f, "target user is not logged in"),
            SessionError::Timeout => write!(f, "connection timed out"),
        }
    }
}

// ── AuthResponse ─────────────────────────────────────────────────

/// Outcome of asynchronous ticket validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthResponse {
    Ok,
    UserNotConnected,
    NoLicenseOrExpired,
    VacBanned,
    LoggedInElsewhere,
    VacCheckTimedOut,
    TicketCanceled,
    TicketAlreadyUsed,
    TicketInvalid,
    PublisherIssuedBan,
}

impl AuthResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, AuthResponse::Ok)
    }
}

impl fmt::Display for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── BeginAuthResult ──────────────────────────────────────────────

/// Immediate answer of the auth backend when a ticket is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeginAuthResult {
    Ok,
    InvalidTicket,
    DuplicateRequest,
    InvalidVersion,
    GameMismatch,
    ExpiredTicket,
}

impl BeginAuthResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, BeginAuthResult::Ok)
    }
}

impl fmt::Display for BeginAuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

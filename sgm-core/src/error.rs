//! Domain-specific error types for the SGMulti core.
//!
//! All fallible operations return `Result<T, SgmError>`.
//! Codec contract violations are returned to the caller immediately;
//! authentication and capacity outcomes are not errors, they travel as
//! [`ConnectionError`](crate::message::ConnectionError) through observers.

use thiserror::Error;

use crate::packet::PacketMode;
use crate::types::PeerId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SgmError>;

/// The canonical error type for the SGMulti core.
#[derive(Debug, Error)]
pub enum SgmError {
    // ── Packet Contract Errors ───────────────────────────────────
    /// A read was attempted on a writable packet, or a write on a readable one.
    #[error("mode violation: cannot {op} a {mode} packet")]
    ModeViolation { op: &'static str, mode: PacketMode },

    /// The packet was disposed (sent, delivered, or explicitly disposed).
    #[error("packet is disposed")]
    Disposed,

    /// The packet was built without an owning client or server context.
    #[error("invalid packet: no owning client or server context")]
    InvalidPacket,

    // ── Decode Errors ────────────────────────────────────────────
    /// The buffer ended before the field could be decoded.
    #[error("unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A 7-bit encoded length prefix was malformed or out of range.
    #[error("invalid string length prefix")]
    InvalidLengthPrefix,

    /// A decimal scale or mantissa outside the representable range.
    #[error("decimal out of range")]
    DecimalOutOfRange,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: i64 },

    // ── Send Errors ──────────────────────────────────────────────
    /// Tried to send a packet with no data.
    #[error("tried to send a packet with no data")]
    EmptyPacket,

    /// The sealed packet exceeds the transport's message limit.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The transport refused to send a message.
    #[error("transport refused send to {peer} on channel {channel}")]
    TransportFailure { peer: PeerId, channel: i32 },

    /// The client has no target peer to send to.
    #[error("not connected to any peer")]
    NotConnected,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A control message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Configuration ────────────────────────────────────────────
    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SgmError {
    /// Returns `true` for errors that indicate caller misuse of a packet
    /// rather than bad input from the network.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            SgmError::ModeViolation { .. } | SgmError::Disposed | SgmError::InvalidPacket
        )
    }
}

//! Handshake, authentication and disconnect messages (channel 0).
//!
//! # Wire Protocol
//!
//! ```text
//! Client ──[Introduction]──────► Server   nonce, display name
//! Server ──[Introduction]──────► Client   nonce (echo)
//! Client ──[DoAuth]────────────► Server   i32 ticket length, ticket bytes
//! Server ──[AuthSuccess]───────► Client
//! Server ──[AuthFailed]────────► Client   i32 error code [, reason]
//! Client ──[UserDisconnected]──► Server
//! Server ──[UserKicked]────────► Client   [reason]
//! ```

use crate::error::{Result, SgmError};
use crate::message::{ConnectionError, PacketKind};
use crate::packet::Packet;

use super::{Message, read_trailing_string};

/// Largest ticket a client may submit.
pub const MAX_TICKET_LEN: usize = 1024;

// ── Introduction ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    pub nonce: String,
    /// Sent by clients only; the server echo carries the nonce alone.
    pub display_name: Option<String>,
}

impl Introduction {
    pub fn new(nonce: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            display_name: Some(display_name.into()),
        }
    }

    pub fn echo(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            display_name: None,
        }
    }
}

impl Message for Introduction {
    const KIND: PacketKind = PacketKind::Introduction;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        packet.write(self.nonce.as_str())?;
        if let Some(name) = &self.display_name {
            packet.write(name.as_str())?;
        }
        Ok(())
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        let nonce = packet.read::<String>()?;
        let display_name = read_trailing_string(packet)?;
        Ok(Self {
            nonce,
            display_name,
        })
    }
}

// ── DoAuth ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoAuth {
    pub ticket: Vec<u8>,
}

impl Message for DoAuth {
    const KIND: PacketKind = PacketKind::DoAuth;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        if self.ticket.len() > MAX_TICKET_LEN {
            return Err(SgmError::ProtocolViolation("auth ticket too long"));
        }
        packet.write(self.ticket.len() as i32)?;
        packet.write(self.ticket.as_slice())
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        let len = packet.read::<i32>()?;
        if len < 0 || len as usize > MAX_TICKET_LEN {
            return Err(SgmError::ProtocolViolation("auth ticket length out of range"));
        }
        let ticket = packet.read_bytes(len as usize)?;
        Ok(Self { ticket })
    }
}

// ── AuthFailed ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailed {
    pub error: ConnectionError,
    /// Written only when non-empty.
    pub reason: Option<String>,
}

impl AuthFailed {
    pub fn new(error: ConnectionError) -> Self {
        Self {
            error,
            reason: None,
        }
    }

    pub fn with_reason(error: ConnectionError, reason: impl Into<String>) -> Self {
        Self {
            error,
            reason: Some(reason.into()),
        }
    }

    /// Read only the error code. Unknown codes map to
    /// [`ConnectionError::AuthenticationError`].
    pub fn read_code(packet: &mut Packet) -> Result<ConnectionError> {
        let code = packet.read::<i32>()?;
        Ok(ConnectionError::try_from(code).unwrap_or(ConnectionError::AuthenticationError))
    }
}

impl Message for AuthFailed {
    const KIND: PacketKind = PacketKind::AuthFailed;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        packet.write(i32::from(self.error))?;
        match &self.reason {
            Some(reason) if !reason.is_empty() => packet.write(reason.as_str()),
            _ => Ok(()),
        }
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        let error = Self::read_code(packet)?;
        let reason = read_trailing_string(packet)?;
        Ok(Self { error, reason })
    }
}

// ── Empty messages ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSuccess;

impl Message for AuthSuccess {
    const KIND: PacketKind = PacketKind::AuthSuccess;

    fn encode(&self, _packet: &mut Packet) -> Result<()> {
        Ok(())
    }

    fn decode(_packet: &mut Packet) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserDisconnected;

impl Message for UserDisconnected {
    const KIND: PacketKind = PacketKind::UserDisconnected;

    fn encode(&self, _packet: &mut Packet) -> Result<()> {
        Ok(())
    }

    fn decode(_packet: &mut Packet) -> Result<Self> {
        Ok(Self)
    }
}

// ── UserKicked ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserKicked {
    pub reason: Option<String>,
}

impl Message for UserKicked {
    const KIND: PacketKind = PacketKind::UserKicked;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        match &self.reason {
            Some(reason) => packet.write(reason.as_str()),
            None => Ok(()),
        }
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            reason: read_trailing_string(packet)?,
        })
    }
}

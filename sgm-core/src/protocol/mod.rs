//! Field layouts of the protocol messages.
//!
//! Each sub-module defines the structured payloads for one part of the
//! protocol. A payload knows its [`PacketKind`] and how to write its fields
//! after the kind header of a [`Packet`], or read them back.
//!
//! [`Packet`]: crate::packet::Packet

pub mod control;
pub mod session;
pub mod spawn;

use crate::error::Result;
use crate::message::PacketKind;
use crate::packet::{Packet, PacketOrigin};

pub use control::{
    AuthFailed, AuthSuccess, DoAuth, Introduction, MAX_TICKET_LEN, UserDisconnected, UserKicked,
};
pub use session::{SessionInfo, SessionInfoRequest};
pub use spawn::InstantiateRemoteObject;

/// A payload with a fixed kind and field layout.
pub trait Message: Sized {
    const KIND: PacketKind;

    /// Append the fields to a writable packet whose kind is already set.
    fn encode(&self, packet: &mut Packet) -> Result<()>;

    /// Read the fields from a readable packet positioned after the kind.
    fn decode(packet: &mut Packet) -> Result<Self>;

    /// Build a writable packet carrying this payload.
    fn to_packet(&self, origin: PacketOrigin) -> Result<Packet> {
        let mut packet = Packet::writable(origin, Self::KIND);
        self.encode(&mut packet)?;
        Ok(packet)
    }
}

/// Read an optional trailing string: present only if bytes remain.
pub(crate) fn read_trailing_string(packet: &mut Packet) -> Result<Option<String>> {
    if packet.remaining() == 0 {
        return Ok(None);
    }
    packet.read::<String>().map(Some)
}

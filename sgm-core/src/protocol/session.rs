//! Session information query.
//!
//! The client sends an empty `SessionInfo`; the server answers on the same
//! kind with its identity, its secure flag and its display name.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::PacketKind;
use crate::packet::Packet;
use crate::types::PeerId;

use super::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionInfoRequest;

impl Message for SessionInfoRequest {
    const KIND: PacketKind = PacketKind::SessionInfo;

    fn encode(&self, _packet: &mut Packet) -> Result<()> {
        Ok(())
    }

    fn decode(_packet: &mut Packet) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub server_id: PeerId,
    pub secure: bool,
    pub name: String,
}

impl Message for SessionInfo {
    const KIND: PacketKind = PacketKind::SessionInfo;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        packet.write(self.server_id.as_u64())?;
        packet.write(self.secure)?;
        packet.write(self.name.as_str())
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            server_id: PeerId(packet.read::<u64>()?),
            secure: packet.read::<bool>()?,
            name: packet.read::<String>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketOrigin;

    #[test]
    fn response_roundtrip() {
        let info = SessionInfo {
            server_id: PeerId(76_561_198_000_000_001),
            secure: true,
            name: "Arena".into(),
        };
        let sent = info.to_packet(PacketOrigin::Server).unwrap();
        let mut inp = Packet::from_received(PacketOrigin::Client, sent.as_bytes().to_vec()).unwrap();
        assert_eq!(inp.packet_kind().unwrap(), PacketKind::SessionInfo);
        assert_eq!(SessionInfo::decode(&mut inp).unwrap(), info);
    }

    #[test]
    fn request_is_empty() {
        let packet = SessionInfoRequest.to_packet(PacketOrigin::Client).unwrap();
        assert_eq!(packet.as_bytes(), 0xFCFAu64.to_le_bytes());
    }

    #[test]
    fn truncated_response_fails() {
        let mut out = Packet::writable(PacketOrigin::Server, PacketKind::SessionInfo);
        out.write(1u64).unwrap();
        let mut inp = Packet::from_received(PacketOrigin::Client, out.as_bytes().to_vec()).unwrap();
        assert!(SessionInfo::decode(&mut inp).is_err());
    }
}

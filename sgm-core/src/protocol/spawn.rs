//! Remote object spawning.
//!
//! The core only frames this message; what a prefab name means is up to the
//! application that receives it through its data observer.

use crate::error::Result;
use crate::message::PacketKind;
use crate::packet::Packet;
use crate::types::{Quaternion, Vector3};

use super::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateRemoteObject {
    pub prefab: String,
    pub position: Vector3,
    pub rotation: Quaternion,
}

impl Message for InstantiateRemoteObject {
    const KIND: PacketKind = PacketKind::InstantiateRemoteObject;

    fn encode(&self, packet: &mut Packet) -> Result<()> {
        packet.write(self.prefab.as_str())?;
        packet.write(self.position)?;
        packet.write(self.rotation)
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            prefab: packet.read()?,
            position: packet.read()?,
            rotation: packet.read()?,
        })
    }
}

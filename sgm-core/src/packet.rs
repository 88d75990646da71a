//! The packet: a kind header followed by ordered typed fields.
//!
//! A packet is either *writable* (built locally, sent once) or *readable*
//! (assigned from received bytes, decoded once per consumer). Every
//! operation checks, in order: owning context, disposal, mode.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SgmError};
use crate::field::{self, ReadField, WriteField};
use crate::message::PacketKind;

/// Length of the message-kind header at the start of every packet.
pub const KIND_HEADER_LEN: usize = 8;

/// Largest sealed packet the transport will accept (reliable send limit).
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Whether a packet accepts writes or reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketMode {
    Writable,
    Readable,
}

impl fmt::Display for PacketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketMode::Writable => write!(f, "writable"),
            PacketMode::Readable => write!(f, "readable"),
        }
    }
}

/// The role that owns a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOrigin {
    Server,
    Client,
}

pub struct Packet {
    kind: u64,
    buf: BytesMut,
    pos: usize,
    mode: PacketMode,
    origin: Option<PacketOrigin>,
    disposed: bool,
}

impl Packet {
    /// A writable packet with `kind` already encoded as its first field.
    pub fn writable(origin: PacketOrigin, kind: impl Into<u64>) -> Self {
        let kind = kind.into();
        let mut buf = BytesMut::with_capacity(64);
        kind.write_to(&mut buf);
        Self {
            kind,
            buf,
            pos: 0,
            mode: PacketMode::Writable,
            origin: Some(origin),
            disposed: false,
        }
    }

    /// An empty readable packet awaiting [`assign_bytes`](Self::assign_bytes).
    pub fn readable(origin: PacketOrigin) -> Self {
        Self {
            kind: PacketKind::Invalid.into(),
            buf: BytesMut::new(),
            pos: 0,
            mode: PacketMode::Readable,
            origin: Some(origin),
            disposed: false,
        }
    }

    /// A packet with no owning context. Every read and write fails with
    /// [`SgmError::InvalidPacket`].
    pub fn invalid() -> Self {
        Self {
            kind: PacketKind::Invalid.into(),
            buf: BytesMut::new(),
            pos: 0,
            mode: PacketMode::Readable,
            origin: None,
            disposed: false,
        }
    }

    /// Shorthand for a readable packet with `bytes` assigned.
    pub fn from_received(origin: PacketOrigin, bytes: Vec<u8>) -> Result<Self> {
        let mut packet = Self::readable(origin);
        packet.assign_bytes(bytes)?;
        Ok(packet)
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The raw message-kind tag.
    pub fn kind(&self) -> u64 {
        self.kind
    }

    /// The kind mapped onto the protocol catalog.
    pub fn packet_kind(&self) -> Result<PacketKind> {
        PacketKind::try_from(self.kind)
    }

    pub fn mode(&self) -> PacketMode {
        self.mode
    }

    pub fn origin(&self) -> Option<PacketOrigin> {
        self.origin
    }

    pub fn is_valid(&self) -> bool {
        self.origin.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.mode == PacketMode::Writable
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Total encoded length, kind header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current read cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// The full encoded packet, kind header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── Checks ───────────────────────────────────────────────────

    fn check_live(&self) -> Result<()> {
        if self.origin.is_none() {
            return Err(SgmError::InvalidPacket);
        }
        if self.disposed {
            return Err(SgmError::Disposed);
        }
        Ok(())
    }

    fn check_mode(&self, op: &'static str, required: PacketMode) -> Result<()> {
        self.check_live()?;
        if self.mode != required {
            return Err(SgmError::ModeViolation {
                op,
                mode: self.mode,
            });
        }
        Ok(())
    }

    // ── Writing ──────────────────────────────────────────────────

    /// Append one typed field.
    pub fn write<T: WriteField>(&mut self, value: T) -> Result<()> {
        self.check_mode("write", PacketMode::Writable)?;
        value.write_to(&mut self.buf);
        Ok(())
    }

    // ── Reading ──────────────────────────────────────────────────

    /// Consume the next typed field. The cursor does not move on failure.
    pub fn read<T: ReadField>(&mut self) -> Result<T> {
        self.check_mode("read", PacketMode::Readable)?;
        let mut src = &self.buf[self.pos..];
        let before = src.len();
        let value = T::read_from(&mut src)?;
        self.pos += before - src.len();
        Ok(value)
    }

    /// Consume exactly `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.check_mode("read", PacketMode::Readable)?;
        let mut src = &self.buf[self.pos..];
        let bytes = field::read_raw(&mut src, count)?;
        self.pos += count;
        Ok(bytes)
    }

    /// Replace the buffer with received bytes and decode the kind header.
    pub fn assign_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.check_mode("assign bytes to", PacketMode::Readable)?;
        self.buf = BytesMut::from(&bytes.into()[..]);
        self.pos = 0;
        self.kind = PacketKind::Invalid.into();
        self.kind = self.read::<u64>()?;
        Ok(())
    }

    /// Move the read cursor to `offset` without touching the contents.
    /// `seek(0)` restores the unconsumed view, kind header included.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        self.check_live()?;
        if offset > self.buf.len() {
            return Err(SgmError::UnexpectedEof {
                needed: offset,
                remaining: self.buf.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Invalidate the packet and release its buffer.
    pub fn dispose(&mut self) {
        self.buf = BytesMut::new();
        self.pos = 0;
        self.disposed = true;
    }

    /// Take the encoded bytes for transmission and dispose the packet.
    ///
    /// The packet is disposed even when sealing fails on size, so a packet
    /// is never sent twice.
    pub(crate) fn seal(&mut self) -> Result<Bytes> {
        self.check_mode("send", PacketMode::Writable)?;
        if self.buf.is_empty() {
            self.dispose();
            return Err(SgmError::EmptyPacket);
        }
        let size = self.buf.len();
        if size > MAX_PACKET_SIZE {
            self.dispose();
            return Err(SgmError::PacketTooLarge {
                size,
                max: MAX_PACKET_SIZE,
            });
        }
        let bytes = self.buf.split().freeze();
        self.dispose();
        Ok(bytes)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("kind", &format_args!("{:#06x}", self.kind))
            .field("mode", &self.mode)
            .field("origin", &self.origin)
            .field("len", &self.buf.len())
            .field("pos", &self.pos)
            .field("disposed", &self.disposed)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decimal, Quaternion, Vector3};

    fn received(packet: &Packet) -> Packet {
        Packet::from_received(PacketOrigin::Client, packet.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn writable_packet_starts_with_kind() {
        let packet = Packet::writable(PacketOrigin::Server, PacketKind::DoAuth);
        assert_eq!(packet.as_bytes(), 0xFAFAu64.to_le_bytes());
        assert_eq!(packet.kind(), 0xFAFA);
        assert_eq!(packet.len(), KIND_HEADER_LEN);
    }

    #[test]
    fn assign_bytes_decodes_kind_first() {
        let mut out = Packet::writable(PacketOrigin::Server, PacketKind::Introduction);
        out.write("AB3K9").unwrap();

        let mut inp = received(&out);
        assert_eq!(inp.packet_kind().unwrap(), PacketKind::Introduction);
        assert_eq!(inp.position(), KIND_HEADER_LEN);
        assert_eq!(inp.read::<String>().unwrap(), "AB3K9");
        assert_eq!(inp.remaining(), 0);
    }

    #[test]
    fn every_field_type_roundtrips_in_order() {
        let decimal = Decimal::new(-123_456_789, 4).unwrap();
        let position = Vector3::new(1.5, -2.0, 3.25);
        let rotation = Quaternion::new(0.5, 0.5, -0.5, 0.5);

        let mut out = Packet::writable(PacketOrigin::Client, 0x7777u64);
        out.write(true).unwrap();
        out.write(0xABu8).unwrap();
        out.write(-5i8).unwrap();
        out.write(-300i16).unwrap();
        out.write(65_000u16).unwrap();
        out.write(-70_000i32).unwrap();
        out.write(4_000_000_000u32).unwrap();
        out.write(i64::MIN).unwrap();
        out.write(u64::MAX).unwrap();
        out.write(6.5f32).unwrap();
        out.write(decimal).unwrap();
        out.write("ünïcode").unwrap();
        out.write(position).unwrap();
        out.write(rotation).unwrap();
        out.write(&[1u8, 2, 3][..]).unwrap();

        let mut inp = received(&out);
        assert_eq!(inp.kind(), 0x7777);
        assert!(inp.read::<bool>().unwrap());
        assert_eq!(inp.read::<u8>().unwrap(), 0xAB);
        assert_eq!(inp.read::<i8>().unwrap(), -5);
        assert_eq!(inp.read::<i16>().unwrap(), -300);
        assert_eq!(inp.read::<u16>().unwrap(), 65_000);
        assert_eq!(inp.read::<i32>().unwrap(), -70_000);
        assert_eq!(inp.read::<u32>().unwrap(), 4_000_000_000);
        assert_eq!(inp.read::<i64>().unwrap(), i64::MIN);
        assert_eq!(inp.read::<u64>().unwrap(), u64::MAX);
        assert_eq!(inp.read::<f32>().unwrap(), 6.5);
        assert_eq!(inp.read::<Decimal>().unwrap(), decimal);
        assert_eq!(inp.read::<String>().unwrap(), "ünïcode");
        assert_eq!(inp.read::<Vector3>().unwrap(), position);
        assert_eq!(inp.read::<Quaternion>().unwrap(), rotation);
        assert_eq!(inp.read_bytes(3).unwrap(), [1, 2, 3]);
        assert_eq!(inp.remaining(), 0);
    }

    #[test]
    fn write_on_readable_is_mode_violation() {
        let mut inp = Packet::readable(PacketOrigin::Server);
        let err = inp.write(1i32).unwrap_err();
        assert!(matches!(
            err,
            SgmError::ModeViolation {
                op: "write",
                mode: PacketMode::Readable
            }
        ));
        assert!(matches!(inp.write("x"), Err(SgmError::ModeViolation { .. })));
        assert!(matches!(inp.write(Vector3::ZERO), Err(SgmError::ModeViolation { .. })));
    }

    #[test]
    fn read_on_writable_is_mode_violation() {
        let mut out = Packet::writable(PacketOrigin::Server, PacketKind::AuthSuccess);
        assert!(matches!(out.read::<u64>(), Err(SgmError::ModeViolation { .. })));
        assert!(matches!(out.read::<String>(), Err(SgmError::ModeViolation { .. })));
        assert!(matches!(out.read_bytes(1), Err(SgmError::ModeViolation { .. })));
        assert!(matches!(
            out.assign_bytes(vec![0u8; 8]),
            Err(SgmError::ModeViolation { .. })
        ));
    }

    #[test]
    fn every_field_type_respects_mode() {
        type Op = fn(&mut Packet) -> Result<()>;
        let decimal = Decimal::new(-12_345, 2).unwrap();
        let writes: [(&str, Op); 11] = [
            ("bool", |p| p.write(true)),
            ("u8", |p| p.write(1u8)),
            ("i8", |p| p.write(-1i8)),
            ("i16", |p| p.write(-2i16)),
            ("u16", |p| p.write(2u16)),
            ("u32", |p| p.write(3u32)),
            ("i64", |p| p.write(-4i64)),
            ("f32", |p| p.write(0.5f32)),
            ("Decimal", |p| p.write(Decimal::new(1, 0)?)),
            ("Quaternion", |p| p.write(Quaternion::IDENTITY)),
            ("raw", |p| p.write(&[1u8, 2, 3][..])),
        ];
        let reads: [(&str, Op); 11] = [
            ("bool", |p| p.read::<bool>().map(drop)),
            ("u8", |p| p.read::<u8>().map(drop)),
            ("i8", |p| p.read::<i8>().map(drop)),
            ("i16", |p| p.read::<i16>().map(drop)),
            ("u16", |p| p.read::<u16>().map(drop)),
            ("u32", |p| p.read::<u32>().map(drop)),
            ("i64", |p| p.read::<i64>().map(drop)),
            ("f32", |p| p.read::<f32>().map(drop)),
            ("Decimal", |p| p.read::<Decimal>().map(drop)),
            ("Quaternion", |p| p.read::<Quaternion>().map(drop)),
            ("raw", |p| p.read_bytes(3).map(drop)),
        ];

        for (name, write) in writes {
            let mut inp = Packet::readable(PacketOrigin::Server);
            assert!(
                matches!(
                    write(&mut inp),
                    Err(SgmError::ModeViolation {
                        op: "write",
                        mode: PacketMode::Readable
                    })
                ),
                "write {name}"
            );
        }
        for (name, read) in reads {
            let mut out = Packet::writable(PacketOrigin::Server, PacketKind::AuthSuccess);
            out.write(decimal).unwrap();
            assert!(
                matches!(
                    read(&mut out),
                    Err(SgmError::ModeViolation {
                        op: "read",
                        mode: PacketMode::Writable
                    })
                ),
                "read {name}"
            );
        }
    }

    #[test]
    fn disposed_packet_rejects_everything() {
        let mut out = Packet::writable(PacketOrigin::Client, PacketKind::DoAuth);
        out.dispose();
        assert!(matches!(out.write(1u8), Err(SgmError::Disposed)));
        assert!(matches!(out.seal(), Err(SgmError::Disposed)));
        assert!(matches!(out.seek(0), Err(SgmError::Disposed)));

        let mut inp = received(&Packet::writable(PacketOrigin::Server, PacketKind::AuthSuccess));
        inp.dispose();
        assert!(matches!(inp.read::<u8>(), Err(SgmError::Disposed)));
        // Disposal wins over mode.
        assert!(matches!(inp.write(1u8), Err(SgmError::Disposed)));
    }

    #[test]
    fn invalid_packet_rejects_everything() {
        let mut packet = Packet::invalid();
        assert!(!packet.is_valid());
        assert!(matches!(packet.write(1u8), Err(SgmError::InvalidPacket)));
        assert!(matches!(packet.read::<u8>(), Err(SgmError::InvalidPacket)));
        assert!(matches!(packet.assign_bytes(vec![0u8; 8]), Err(SgmError::InvalidPacket)));
        packet.dispose();
        // Invalid takes precedence over disposed.
        assert!(matches!(packet.read::<u8>(), Err(SgmError::InvalidPacket)));
    }

    #[test]
    fn seek_zero_replays_from_kind() {
        let mut out = Packet::writable(PacketOrigin::Server, PacketKind::SessionInfo);
        out.write(76_561_198_000_000_000u64).unwrap();
        out.write(true).unwrap();
        out.write("Arena").unwrap();

        let mut inp = received(&out);
        let first = (
            inp.read::<u64>().unwrap(),
            inp.read::<bool>().unwrap(),
            inp.read::<String>().unwrap(),
        );

        inp.seek(0).unwrap();
        assert_eq!(inp.read::<u64>().unwrap(), 0xFCFA);
        let second = (
            inp.read::<u64>().unwrap(),
            inp.read::<bool>().unwrap(),
            inp.read::<String>().unwrap(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn seek_past_end_fails() {
        let mut inp = received(&Packet::writable(PacketOrigin::Server, PacketKind::AuthSuccess));
        assert!(inp.seek(KIND_HEADER_LEN).is_ok());
        assert!(inp.seek(KIND_HEADER_LEN + 1).is_err());
    }

    #[test]
    fn failed_read_does_not_move_cursor() {
        let mut out = Packet::writable(PacketOrigin::Server, PacketKind::AuthFailed);
        out.write(1u16).unwrap();
        let mut inp = received(&out);
        assert!(inp.read::<u32>().is_err());
        assert_eq!(inp.position(), KIND_HEADER_LEN);
        assert_eq!(inp.read::<u16>().unwrap(), 1);
    }

    #[test]
    fn short_buffer_fails_kind_decode() {
        let err = Packet::from_received(PacketOrigin::Client, vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, SgmError::UnexpectedEof { needed: 8, remaining: 3 }));
    }

    #[test]
    fn seal_disposes_and_returns_bytes() {
        let mut out = Packet::writable(PacketOrigin::Client, PacketKind::UserDisconnected);
        let bytes = out.seal().unwrap();
        assert_eq!(&bytes[..], 0xFBFAu64.to_le_bytes());
        assert!(out.is_disposed());
        assert!(matches!(out.seal(), Err(SgmError::Disposed)));
    }

    #[test]
    fn seal_rejects_oversized() {
        let mut out = Packet::writable(PacketOrigin::Server, 0x0012u64);
        out.write(&vec![0u8; MAX_PACKET_SIZE][..]).unwrap();
        assert!(matches!(out.seal(), Err(SgmError::PacketTooLarge { .. })));
        assert!(out.is_disposed());
    }
}

//! Inbound channel demultiplexer.
//!
//! One [`pump`] drains every pending message of a role: channel 0 first,
//! then each registered channel in registration order. Channel 0 packets
//! go through the role's control handler before observers see them; all
//! other channels go straight to observers. Either way the packet is
//! rewound to offset 0 for delivery and disposed afterwards.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::packet::{KIND_HEADER_LEN, Packet, PacketOrigin};
use crate::transport::{CONTROL_CHANNEL, Channel};
use crate::types::PeerId;

// ── ChannelSet ───────────────────────────────────────────────────

/// Channels polled in addition to the control channel, in registration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    extra: Vec<Channel>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel`. Returns `false` for channel 0 and duplicates.
    pub fn register(&mut self, channel: Channel) -> bool {
        if channel == CONTROL_CHANNEL || self.extra.contains(&channel) {
            return false;
        }
        self.extra.push(channel);
        true
    }

    /// Channel 0 is always polled.
    pub fn contains(&self, channel: Channel) -> bool {
        channel == CONTROL_CHANNEL || self.extra.contains(&channel)
    }

    /// Registered channels, excluding channel 0.
    pub fn registered(&self) -> &[Channel] {
        &self.extra
    }

    /// Poll order: channel 0, then registration order.
    pub fn poll_order(&self) -> impl Iterator<Item = Channel> + '_ {
        std::iter::once(CONTROL_CHANNEL).chain(self.extra.iter().copied())
    }
}

// ── Pump ─────────────────────────────────────────────────────────

/// The role side of a pump.
pub trait InboundSink {
    /// Context stamped on received packets.
    fn origin(&self) -> PacketOrigin;

    /// Next pending message on `channel`.
    fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)>;

    /// Internal handling of a channel 0 packet, positioned after its kind.
    fn handle_control(&mut self, sender: PeerId, packet: &mut Packet) -> Result<()>;

    /// External notification. The packet is positioned at offset 0.
    fn deliver(&mut self, sender: PeerId, packet: &mut Packet, channel: Channel);
}

/// Counters for one pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    /// Channel 0 packets handled.
    pub control: usize,
    /// Packets delivered from registered channels.
    pub data: usize,
    /// Buffers too short to carry a kind.
    pub dropped: usize,
}

impl PumpStats {
    pub fn total(&self) -> usize {
        self.control + self.data + self.dropped
    }
}

impl std::ops::AddAssign for PumpStats {
    fn add_assign(&mut self, other: Self) {
        self.control += other.control;
        self.data += other.data;
        self.dropped += other.dropped;
    }
}

/// Drain every pending message of `sink` across `channels`.
pub fn pump<S: InboundSink + ?Sized>(channels: &ChannelSet, sink: &mut S) -> PumpStats {
    let mut stats = PumpStats::default();

    for channel in channels.poll_order() {
        while let Some((bytes, sender)) = sink.receive(channel) {
            if bytes.len() < KIND_HEADER_LEN {
                warn!(
                    %sender,
                    channel,
                    len = bytes.len(),
                    "dropping inbound buffer shorter than the kind header"
                );
                stats.dropped += 1;
                continue;
            }

            let mut packet = match Packet::from_received(sink.origin(), bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(%sender, channel, "dropping undecodable buffer: {e}");
                    stats.dropped += 1;
                    continue;
                }
            };
            debug!(%sender, channel, kind = packet.kind(), len = packet.len(), "packet received");

            if channel == CONTROL_CHANNEL {
                stats.control += 1;
                if let Err(e) = sink.handle_control(sender, &mut packet) {
                    if e.is_contract_violation() {
                        error!(%sender, kind = packet.kind(), "control handler misused packet: {e}");
                    } else {
                        warn!(%sender, kind = packet.kind(), "control handler failed: {e}");
                    }
                }
            } else {
                stats.data += 1;
            }

            if rewind(&mut packet) {
                sink.deliver(sender, &mut packet, channel);
            }
            packet.dispose();
        }
    }

    stats
}

/// Seek a delivered packet back to offset 0. Returns `false` once an
/// earlier consumer has disposed it.
pub(crate) fn rewind(packet: &mut Packet) -> bool {
    match packet.seek(0) {
        Ok(()) => true,
        Err(e) => {
            debug!("packet no longer deliverable: {e}");
            false
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SgmError;
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct Recorder {
        inbound: HashMap<Channel, VecDeque<(Vec<u8>, PeerId)>>,
        polled: Vec<Channel>,
        handled: Vec<u64>,
        delivered: Vec<(Channel, u64, usize)>,
        fail_control: bool,
    }

    impl Recorder {
        fn push(&mut self, channel: Channel, kind: u64, extra: &[u8]) {
            let mut bytes = kind.to_le_bytes().to_vec();
            bytes.extend_from_slice(extra);
            self.inbound
                .entry(channel)
                .or_default()
                .push_back((bytes, PeerId(9)));
        }
    }

    impl InboundSink for Recorder {
        fn origin(&self) -> PacketOrigin {
            PacketOrigin::Client
        }

        fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)> {
            if self.polled.last() != Some(&channel) {
                self.polled.push(channel);
            }
            self.inbound.get_mut(&channel)?.pop_front()
        }

        fn handle_control(&mut self, _sender: PeerId, packet: &mut Packet) -> Result<()> {
            self.handled.push(packet.kind());
            // Consume something so the rewind is observable.
            let _ = packet.read::<u8>();
            if self.fail_control {
                return Err(SgmError::ProtocolViolation("test failure"));
            }
            Ok(())
        }

        fn deliver(&mut self, _sender: PeerId, packet: &mut Packet, channel: Channel) {
            let kind = packet.read::<u64>().unwrap();
            self.delivered.push((channel, kind, packet.position()));
        }
    }

    #[test]
    fn register_ignores_zero_and_duplicates() {
        let mut set = ChannelSet::new();
        assert!(!set.register(0));
        assert!(set.register(3));
        assert!(set.register(1));
        assert!(!set.register(3));
        assert_eq!(set.registered(), [3, 1]);
        assert_eq!(set.poll_order().collect::<Vec<_>>(), [0, 3, 1]);
        assert!(set.contains(0));
        assert!(!set.contains(2));
    }

    #[test]
    fn control_first_then_registration_order() {
        let mut channels = ChannelSet::new();
        channels.register(5);
        channels.register(2);

        let mut sink = Recorder::default();
        sink.push(2, 0xA2, &[]);
        sink.push(5, 0xA5, &[]);
        sink.push(0, 0x0101, &[1]);
        sink.push(5, 0xB5, &[]);

        let stats = pump(&channels, &mut sink);
        assert_eq!(stats, PumpStats { control: 1, data: 3, dropped: 0 });
        assert_eq!(sink.polled, [0, 5, 2]);
        let order: Vec<_> = sink.delivered.iter().map(|d| (d.0, d.1)).collect();
        assert_eq!(order, [(0, 0x0101), (5, 0xA5), (5, 0xB5), (2, 0xA2)]);
    }

    #[test]
    fn unregistered_channels_are_never_polled() {
        let mut sink = Recorder::default();
        sink.push(7, 0x77, &[]);
        let stats = pump(&ChannelSet::new(), &mut sink);
        assert_eq!(stats.total(), 0);
        assert!(!sink.polled.contains(&7));
        assert_eq!(sink.inbound[&7].len(), 1);
    }

    #[test]
    fn observers_see_kind_first_even_after_handler_failure() {
        let mut sink = Recorder {
            fail_control: true,
            ..Default::default()
        };
        sink.push(0, 0xFAFA, &[1, 2, 3]);
        pump(&ChannelSet::new(), &mut sink);
        assert_eq!(sink.handled, [0xFAFA]);
        assert_eq!(sink.delivered, [(0, 0xFAFA, KIND_HEADER_LEN)]);
    }

    #[test]
    fn short_buffers_are_dropped() {
        let mut sink = Recorder::default();
        sink.inbound
            .entry(0)
            .or_default()
            .push_back((vec![1, 2, 3], PeerId(1)));
        sink.push(0, 0xFCFA, &[]);
        let stats = pump(&ChannelSet::new(), &mut sink);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.control, 1);
        assert_eq!(sink.handled, [0xFCFA]);
    }
}

//! The listening role.
//!
//! A [`Server`] accepts every transport session, tracks each peer in its
//! [`SessionRegistry`], forwards submitted tickets to the auth backend and
//! settles them when the backend's verdicts are drained.
//!
//! One [`Server::poll`] handles, in order: transport session events,
//! channel 0, registered channels, then validation results.

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::demux::{self, ChannelSet, InboundSink, PumpStats};
use crate::error::{Result, SgmError};
use crate::message::{ConnectionError, PacketKind, SendType, SessionError};
use crate::packet::{Packet, PacketOrigin};
use crate::protocol::{
    AuthFailed, AuthSuccess, DoAuth, InstantiateRemoteObject, Introduction, Message, SessionInfo,
};
use crate::registry::SessionRegistry;
use crate::state::{PlayerEntry, PlayerStatus};
use crate::transport::{AuthBackend, CONTROL_CHANNEL, Channel, SessionEvent, Transport, ValidationResult};
use crate::types::{PeerId, Quaternion, Vector3};

// ── Observer ─────────────────────────────────────────────────────

/// Server notifications. Every method defaults to a no-op; observers are
/// invoked in registration order.
pub trait ServerObserver {
    /// Every inbound packet, control traffic included, positioned at the
    /// kind header.
    fn on_data_received(&mut self, _sender: PeerId, _packet: &mut Packet, _channel: Channel) {}

    /// A transport session was accepted.
    fn on_player_connected(&mut self, _peer: PeerId) {}

    /// The backend validated the peer's ticket.
    fn on_player_authenticated(&mut self, _peer: PeerId) {}

    fn on_player_disconnected(&mut self, _peer: PeerId, _error: SessionError) {}

    fn on_shutdown(&mut self) {}
}

// ── Server ───────────────────────────────────────────────────────

pub struct Server<T: Transport, A: AuthBackend> {
    transport: T,
    auth: A,
    name: String,
    registry: SessionRegistry,
    channels: ChannelSet,
    observers: Vec<Box<dyn ServerObserver>>,
    running: bool,
}

impl<T: Transport, A: AuthBackend> Server<T, A> {
    pub fn new(transport: T, auth: A, config: ServerConfig) -> Self {
        Self {
            transport,
            auth,
            name: config.name,
            registry: SessionRegistry::new(config.max_players),
            channels: ChannelSet::new(),
            observers: Vec::new(),
            running: true,
        }
    }

    pub fn add_observer(&mut self, observer: impl ServerObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Poll `channel` in addition to channel 0. Returns `false` for channel
    /// 0 and channels already registered.
    pub fn add_channel(&mut self, channel: Channel) -> bool {
        self.channels.register(channel)
    }

    pub fn channels(&self) -> &[Channel] {
        self.channels.registered()
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn max_players(&self) -> usize {
        self.registry.max_players()
    }

    pub fn set_max_players(&mut self, max_players: usize) {
        self.registry.set_max_players(max_players);
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    pub fn player_status(&self, peer: PeerId) -> Option<PlayerStatus> {
        self.registry.status(peer)
    }

    /// Display name the peer introduced itself with.
    pub fn player_name(&self, peer: PeerId) -> Option<&str> {
        self.registry.name(peer)
    }

    /// Snapshot of every entry, ordered by peer.
    pub fn players(&self) -> Vec<(PeerId, PlayerStatus)> {
        let mut players: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(peer, entry)| (peer, entry.status))
            .collect();
        players.sort_by_key(|(peer, _)| *peer);
        players
    }

    /// Every peer with an entry, pending or in server, ordered by peer.
    pub fn connected_players(&self) -> Vec<PeerId> {
        let mut peers = self.registry.peers();
        peers.sort();
        peers
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn local_identity(&self) -> PeerId {
        self.auth.local_identity()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    // ── Packets ──────────────────────────────────────────────────

    /// A writable packet of `kind`, or an invalid one after shutdown.
    pub fn create_packet(&self, kind: impl Into<u64>) -> Packet {
        if !self.running {
            return Packet::invalid();
        }
        Packet::writable(PacketOrigin::Server, kind)
    }

    /// Send `packet` to `recipients`, or to every registered peer when
    /// `recipients` is empty. The packet is disposed even if a send fails.
    pub fn send(
        &mut self,
        packet: &mut Packet,
        send_type: SendType,
        channel: Channel,
        recipients: &[PeerId],
    ) -> Result<()> {
        let kind = packet.kind();
        let bytes = packet.seal()?;
        let targets = if recipients.is_empty() {
            self.connected_players()
        } else {
            recipients.to_vec()
        };

        let mut refused = None;
        for peer in targets {
            if self.transport.send(peer, &bytes, send_type, channel) {
                debug!(%peer, channel, kind, len = bytes.len(), "packet sent");
            } else {
                warn!(%peer, channel, kind, "transport refused send");
                refused.get_or_insert(peer);
            }
        }
        match refused {
            Some(peer) => Err(SgmError::TransportFailure { peer, channel }),
            None => Ok(()),
        }
    }

    /// Broadcast a spawn request on channel 0.
    pub fn instantiate(
        &mut self,
        prefab: impl Into<String>,
        position: Vector3,
        rotation: Quaternion,
    ) -> Result<()> {
        let spawn = InstantiateRemoteObject {
            prefab: prefab.into(),
            position,
            rotation,
        };
        let mut packet = spawn.to_packet(PacketOrigin::Server)?;
        self.send(&mut packet, SendType::Reliable, CONTROL_CHANNEL, &[])
    }

    /// [`instantiate`](Self::instantiate) with the identity rotation.
    pub fn instantiate_at(&mut self, prefab: impl Into<String>, position: Vector3) -> Result<()> {
        self.instantiate(prefab, position, Quaternion::IDENTITY)
    }

    // ── Player management ────────────────────────────────────────

    /// Send `AuthFailed(Unknown, reason)` to `peer`. The entry stays in the
    /// registry until the peer disconnects. Returns `false` if the peer is
    /// not registered.
    pub fn kick(&mut self, peer: PeerId, reason: &str) -> bool {
        if !self.registry.contains(peer) {
            return false;
        }
        info!(%peer, reason, "kicking player");
        self.send_control(peer, &AuthFailed::with_reason(ConnectionError::Unknown, reason));
        true
    }

    /// Notify observers, end every auth session, close every transport
    /// session and clear the registry. Later polls do nothing.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        info!(name = %self.name, players = self.registry.len(), "server shutting down");
        for observer in &mut self.observers {
            observer.on_shutdown();
        }
        for (peer, entry) in self.registry.drain() {
            if entry.ticket_submitted || entry.is_in_server() {
                self.auth.end_session(peer);
            }
            self.transport.close_session(peer);
        }
        self.running = false;
    }

    // ── Poll ─────────────────────────────────────────────────────

    pub fn poll(&mut self) -> PumpStats {
        if !self.running {
            return PumpStats::default();
        }
        for event in self.transport.drain_session_events() {
            self.handle_session_event(event);
        }
        let channels = self.channels.clone();
        let stats = demux::pump(&channels, self);
        for result in self.auth.drain_validation_results() {
            self.handle_validation(result);
        }
        stats
    }

    // ── Internals ────────────────────────────────────────────────

    /// Send a control message, logging failures. Returns `true` on success.
    fn send_control<M: Message>(&mut self, peer: PeerId, message: &M) -> bool {
        let result = message
            .to_packet(PacketOrigin::Server)
            .and_then(|mut packet| {
                self.send(&mut packet, SendType::Reliable, CONTROL_CHANNEL, &[peer])
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                let kind = M::KIND;
                warn!(%peer, %kind, "control send failed: {e}");
                false
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Requested(peer) => {
                if !self.transport.accept_session(peer) {
                    warn!(%peer, "failed to accept session");
                    return;
                }
                self.admit_pending(peer);
            }
            SessionEvent::Failed { peer, error } => {
                if let Some(entry) = self.registry.remove(peer) {
                    if entry.ticket_submitted {
                        self.auth.end_session(peer);
                    }
                }
                info!(%peer, %error, "player session failed");
                for observer in &mut self.observers {
                    observer.on_player_disconnected(peer, error);
                }
            }
        }
    }

    /// Create a `Pending` entry on first control contact.
    fn admit_pending(&mut self, peer: PeerId) {
        if self.registry.insert_pending(peer) {
            info!(%peer, "player connected");
            for observer in &mut self.observers {
                observer.on_player_connected(peer);
            }
        }
    }

    fn handle_validation(&mut self, result: ValidationResult) {
        let ValidationResult { peer, response } = result;
        if response.is_ok() {
            if !self.registry.promote(peer) {
                debug!(%peer, "validated peer is no longer registered");
                return;
            }
            info!(%peer, "player authenticated");
            for observer in &mut self.observers {
                observer.on_player_authenticated(peer);
            }
        } else {
            warn!(%peer, %response, "ticket validation failed");
            self.auth.end_session(peer);
            self.send_control(peer, &AuthFailed::new(ConnectionError::AuthenticationError));
            self.registry.remove(peer);
        }
    }

    fn handle_do_auth(&mut self, sender: PeerId, packet: &mut Packet) -> Result<()> {
        let request = DoAuth::decode(packet)?;

        if let Some(entry) = self.registry.get(sender) {
            if entry.ticket_submitted || entry.is_in_server() {
                debug!(%sender, "duplicate auth request ignored");
                return Ok(());
            }
        }

        if self.registry.is_full_for(sender) {
            info!(%sender, max = self.registry.max_players(), "server full; rejecting");
            self.send_control(sender, &AuthFailed::new(ConnectionError::ServerFull));
            self.registry.remove(sender);
            return Ok(());
        }

        let begin = self.auth.begin_validation(&request.ticket, sender);
        if !begin.is_ok() {
            warn!(%sender, result = %begin, "auth ticket refused");
            self.send_control(sender, &AuthFailed::new(ConnectionError::AuthenticationError));
            self.registry.remove(sender);
            return Ok(());
        }

        self.registry.mark_ticket_submitted(sender);
        debug!(%sender, "ticket submitted for validation");
        self.send_control(sender, &AuthSuccess);
        Ok(())
    }

    fn handle_user_disconnected(&mut self, sender: PeerId) {
        let Some(entry) = self.registry.get(sender).copied() else {
            warn!(%sender, "disconnect notice from unregistered peer");
            return;
        };
        match entry {
            PlayerEntry {
                status: PlayerStatus::Pending,
                ticket_submitted,
            } => {
                if ticket_submitted {
                    self.auth.end_session(sender);
                }
                self.transport.close_session(sender);
                self.registry.remove(sender);
                info!(%sender, "pending player left");
            }
            PlayerEntry {
                status: PlayerStatus::InServer,
                ..
            } => {
                self.auth.end_session(sender);
                self.registry.remove(sender);
                info!(%sender, "player left");
                for observer in &mut self.observers {
                    observer.on_player_disconnected(sender, SessionError::None);
                }
            }
        }
    }
}

impl<T: Transport, A: AuthBackend> InboundSink for Server<T, A> {
    fn origin(&self) -> PacketOrigin {
        PacketOrigin::Server
    }

    fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)> {
        self.transport.message_available(channel)?;
        self.transport.receive(channel)
    }

    fn handle_control(&mut self, sender: PeerId, packet: &mut Packet) -> Result<()> {
        let Ok(kind) = packet.packet_kind() else {
            return Ok(());
        };

        match kind {
            PacketKind::DoAuth => self.handle_do_auth(sender, packet),
            PacketKind::SessionInfo => {
                let info = SessionInfo {
                    server_id: self.auth.local_identity(),
                    secure: self.auth.is_secure(),
                    name: self.name.clone(),
                };
                self.send_control(sender, &info);
                Ok(())
            }
            PacketKind::UserDisconnected => {
                self.handle_user_disconnected(sender);
                Ok(())
            }
            PacketKind::Introduction => {
                let intro = Introduction::decode(packet)?;
                // A rejoining peer reuses its open session, so no request
                // event precedes this.
                self.admit_pending(sender);
                if let Some(name) = intro.display_name {
                    debug!(%sender, %name, "introduction");
                    self.registry.set_name(sender, name);
                }
                self.send_control(sender, &Introduction::echo(intro.nonce));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn deliver(&mut self, sender: PeerId, packet: &mut Packet, channel: Channel) {
        for observer in &mut self.observers {
            if !demux::rewind(packet) {
                break;
            }
            observer.on_data_received(sender, packet, channel);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackAuth, LoopbackNetwork, LoopbackTransport};
    use crate::message::AuthResponse;
    use crate::transport::AuthBackend;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SERVER: PeerId = PeerId(100);
    const ALICE: PeerId = PeerId(1);
    const BOB: PeerId = PeerId(2);

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Data(PeerId, u64, Channel),
        Connected(PeerId),
        Authenticated(PeerId),
        Disconnected(PeerId, SessionError),
        Shutdown,
    }

    #[derive(Clone, Default)]
    struct Log(Rc<RefCell<Vec<Event>>>);

    impl Log {
        fn events(&self) -> Vec<Event> {
            self.0.borrow().clone()
        }

        fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
            self.0.borrow().iter().filter(|e| f(e)).count()
        }
    }

    impl ServerObserver for Log {
        fn on_data_received(&mut self, sender: PeerId, packet: &mut Packet, channel: Channel) {
            let kind = packet.read::<u64>().unwrap();
            self.0.borrow_mut().push(Event::Data(sender, kind, channel));
        }

        fn on_player_connected(&mut self, peer: PeerId) {
            self.0.borrow_mut().push(Event::Connected(peer));
        }

        fn on_player_authenticated(&mut self, peer: PeerId) {
            self.0.borrow_mut().push(Event::Authenticated(peer));
        }

        fn on_player_disconnected(&mut self, peer: PeerId, error: SessionError) {
            self.0.borrow_mut().push(Event::Disconnected(peer, error));
        }

        fn on_shutdown(&mut self) {
            self.0.borrow_mut().push(Event::Shutdown);
        }
    }

    struct Rig {
        net: LoopbackNetwork,
        auth: LoopbackAuth,
        server: Server<LoopbackTransport, LoopbackAuth>,
        log: Log,
    }

    fn rig(max_players: usize) -> Rig {
        let net = LoopbackNetwork::new();
        let auth = LoopbackAuth::new(SERVER);
        let config = ServerConfig {
            name: "Arena".into(),
            max_players,
        };
        let mut server = Server::new(net.endpoint(SERVER), auth.clone(), config);
        let log = Log::default();
        server.add_observer(log.clone());
        Rig {
            net,
            auth,
            server,
            log,
        }
    }

    fn send_from<M: Message>(net: &LoopbackNetwork, from: PeerId, message: &M) {
        let packet = message.to_packet(PacketOrigin::Client).unwrap();
        net.endpoint(from)
            .send(SERVER, packet.as_bytes(), SendType::Reliable, CONTROL_CHANNEL);
    }

    fn ticket_for(peer: PeerId) -> DoAuth {
        let mut auth = LoopbackAuth::new(peer);
        DoAuth {
            ticket: auth.request_ticket().unwrap().data,
        }
    }

    #[test]
    fn session_request_creates_pending_entry() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        r.server.poll();

        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::Pending));
        assert_eq!(r.server.player_name(ALICE), Some("Nova"));
        assert_eq!(r.log.events()[0], Event::Connected(ALICE));
        assert!(r.net.has_session(SERVER, ALICE));
        assert_eq!(r.net.sent_kinds_to(ALICE), [0x0101]);
    }

    #[test]
    fn rejoin_over_open_session_recreates_entry() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::InServer));

        send_from(&r.net, ALICE, &crate::protocol::UserDisconnected);
        r.server.poll();
        assert_eq!(r.server.player_status(ALICE), None);
        assert!(r.net.has_session(SERVER, ALICE));

        send_from(&r.net, ALICE, &Introduction::new("Q1W2E", "Nova"));
        r.server.poll();
        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::Pending));
        assert_eq!(r.server.player_name(ALICE), Some("Nova"));
        assert_eq!(r.server.player_count(), 1);
        assert_eq!(r.log.count(|e| *e == Event::Connected(ALICE)), 2);
        assert!(r.server.kick(ALICE, "bye"));
    }

    #[test]
    fn repeated_introduction_connects_once() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        r.server.poll();
        assert_eq!(r.server.player_count(), 1);
        assert_eq!(r.log.count(|e| *e == Event::Connected(ALICE)), 1);
    }

    #[test]
    fn introduction_is_echoed_verbatim() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &Introduction::new("Q7Z2M", "Nova"));
        r.server.poll();

        let mut client = r.net.endpoint(ALICE);
        let (bytes, from) = client.receive(CONTROL_CHANNEL).unwrap();
        assert_eq!(from, SERVER);
        let mut packet = Packet::from_received(PacketOrigin::Client, bytes).unwrap();
        assert_eq!(Introduction::decode(&mut packet).unwrap(), Introduction::echo("Q7Z2M"));
    }

    #[test]
    fn do_auth_then_validation_promotes() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();

        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::InServer));
        assert!(r.server.registry().get(ALICE).unwrap().ticket_submitted);
        assert_eq!(r.net.sent_kinds_to(ALICE), [0xFAFC]);
        assert_eq!(r.log.count(|e| *e == Event::Authenticated(ALICE)), 1);
    }

    #[test]
    fn duplicate_do_auth_is_ignored() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        r.net.clear_sent();

        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        assert_eq!(r.server.player_count(), 1);
        assert!(r.net.sent_kinds_to(ALICE).is_empty());
        assert_eq!(r.auth.begun(), [ALICE]);
    }

    #[test]
    fn duplicate_do_auth_while_pending_is_ignored() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        // Both requests are handled before validation results are drained.
        r.server.poll();
        assert_eq!(r.net.sent_kinds_to(ALICE), [0xFAFC]);
        assert_eq!(r.auth.begun(), [ALICE]);
    }

    #[test]
    fn full_server_rejects_new_peer() {
        let mut r = rig(1);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();

        send_from(&r.net, BOB, &ticket_for(BOB));
        r.server.poll();

        assert_eq!(r.server.player_count(), 1);
        assert_eq!(r.server.player_status(BOB), None);
        assert_eq!(r.net.sent_kinds_to(BOB), [0xFAFB]);

        let mut bob = r.net.endpoint(BOB);
        let (bytes, _) = bob.receive(CONTROL_CHANNEL).unwrap();
        let mut packet = Packet::from_received(PacketOrigin::Client, bytes).unwrap();
        assert_eq!(
            AuthFailed::read_code(&mut packet).unwrap(),
            ConnectionError::ServerFull
        );
        // Bob's session request raised player-connected before the rejection.
        assert!(r.log.events().contains(&Event::Connected(BOB)));
        assert!(r.auth.begun().iter().all(|p| *p != BOB));
    }

    #[test]
    fn refused_ticket_sends_auth_failed() {
        let mut r = rig(4);
        r.auth.refuse_peer(ALICE);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        assert_eq!(r.net.sent_kinds_to(ALICE), [0xFAFB]);
        assert_eq!(r.server.player_status(ALICE), None);
    }

    #[test]
    fn failed_validation_ends_session_and_removes() {
        let mut r = rig(4);
        r.auth.reject_peer(ALICE);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();

        // Provisional success, then the asynchronous rejection.
        assert_eq!(r.net.sent_kinds_to(ALICE), [0xFAFC, 0xFAFB]);
        assert_eq!(r.server.player_status(ALICE), None);
        assert_eq!(r.auth.ended(), [ALICE]);
        assert_eq!(r.log.count(|e| matches!(e, Event::Authenticated(_))), 0);
    }

    #[test]
    fn pending_disconnect_is_silent() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        r.server.poll();
        send_from(&r.net, ALICE, &crate::protocol::UserDisconnected);
        r.server.poll();

        assert_eq!(r.server.player_count(), 0);
        assert!(!r.net.has_session(SERVER, ALICE));
        assert_eq!(r.log.count(|e| matches!(e, Event::Disconnected(..))), 0);
        assert!(r.auth.ended().is_empty());
    }

    #[test]
    fn in_server_disconnect_notifies_once() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        send_from(&r.net, ALICE, &crate::protocol::UserDisconnected);
        r.server.poll();

        assert_eq!(r.server.player_count(), 0);
        assert_eq!(
            r.log.count(|e| *e == Event::Disconnected(ALICE, SessionError::None)),
            1
        );
        assert_eq!(r.auth.ended(), [ALICE]);
    }

    #[test]
    fn session_failure_removes_and_notifies() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        r.net.fail_session(SERVER, ALICE, SessionError::Timeout);
        r.server.poll();

        assert_eq!(r.server.player_count(), 0);
        assert!(r
            .log
            .events()
            .contains(&Event::Disconnected(ALICE, SessionError::Timeout)));
        assert_eq!(r.auth.ended(), [ALICE]);
    }

    #[test]
    fn validation_for_departed_peer_is_dropped() {
        let mut r = rig(4);
        r.auth.push_result(BOB, AuthResponse::Ok);
        r.server.poll();
        assert_eq!(r.server.player_count(), 0);
        assert_eq!(r.log.count(|e| matches!(e, Event::Authenticated(_))), 0);
    }

    #[test]
    fn session_info_reply() {
        let mut r = rig(4);
        r.auth.set_secure(true);
        send_from(&r.net, ALICE, &crate::protocol::SessionInfoRequest);
        r.server.poll();

        let mut alice = r.net.endpoint(ALICE);
        let (bytes, _) = alice.receive(CONTROL_CHANNEL).unwrap();
        let mut packet = Packet::from_received(PacketOrigin::Client, bytes).unwrap();
        let info = SessionInfo::decode(&mut packet).unwrap();
        assert_eq!(info.server_id, SERVER);
        assert!(info.secure);
        assert_eq!(info.name, "Arena");
    }

    #[test]
    fn kick_keeps_entry() {
        let mut r = rig(4);
        assert!(!r.server.kick(ALICE, "nope"));
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        r.net.clear_sent();

        assert!(r.server.kick(ALICE, "afk"));
        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::InServer));
        let sent = r.net.sent();
        assert_eq!(sent.len(), 1);
        let mut packet = Packet::from_received(PacketOrigin::Client, sent[0].bytes.clone()).unwrap();
        let failed = AuthFailed::decode(&mut packet).unwrap();
        assert_eq!(failed.error, ConnectionError::Unknown);
        assert_eq!(failed.reason.as_deref(), Some("afk"));
    }

    #[test]
    fn broadcast_and_instantiate() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        send_from(&r.net, BOB, &ticket_for(BOB));
        r.server.poll();
        r.net.clear_sent();

        r.server
            .instantiate_at("Crate", Vector3::new(0.0, 1.0, 0.0))
            .unwrap();
        let sent = r.net.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.kind == Some(0x0011) && m.channel == 0));

        let mut packet = Packet::from_received(PacketOrigin::Client, sent[0].bytes.clone()).unwrap();
        let spawn = InstantiateRemoteObject::decode(&mut packet).unwrap();
        assert_eq!(spawn.rotation, Quaternion::IDENTITY);
    }

    #[test]
    fn send_reports_refusal_and_disposes() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        r.server.poll();
        r.net.set_link_down(ALICE, true);

        let mut packet = r.server.create_packet(0x4000u64);
        packet.write(1u8).unwrap();
        let err = r
            .server
            .send(&mut packet, SendType::Reliable, 3, &[ALICE])
            .unwrap_err();
        assert!(matches!(err, SgmError::TransportFailure { peer: ALICE, channel: 3 }));
        assert!(packet.is_disposed());
    }

    #[test]
    fn extra_channels_bypass_control() {
        let mut r = rig(4);
        r.server.add_channel(2);
        let mut alice = r.net.endpoint(ALICE);
        let packet = ticket_for(ALICE).to_packet(PacketOrigin::Client).unwrap();
        alice.send(SERVER, packet.as_bytes(), SendType::Reliable, 2);
        let stats = r.server.poll();

        assert_eq!(stats.data, 1);
        assert_eq!(stats.control, 0);
        // DoAuth on a data channel is never handled.
        assert_eq!(r.server.player_status(ALICE), Some(PlayerStatus::Pending));
        assert!(r.log.events().contains(&Event::Data(ALICE, 0xFAFA, 2)));
    }

    #[test]
    fn shutdown_clears_and_stops_polling() {
        let mut r = rig(4);
        send_from(&r.net, ALICE, &ticket_for(ALICE));
        send_from(&r.net, BOB, &Introduction::new("AB3K9", "Ash"));
        r.server.poll();

        r.server.shutdown();
        assert!(!r.server.is_running());
        assert_eq!(r.server.player_count(), 0);
        assert_eq!(r.auth.ended(), [ALICE]);
        assert!(!r.net.has_session(SERVER, ALICE));
        assert!(!r.net.has_session(SERVER, BOB));
        assert_eq!(r.log.count(|e| *e == Event::Shutdown), 1);

        send_from(&r.net, BOB, &ticket_for(BOB));
        assert_eq!(r.server.poll().total(), 0);
        assert!(!r.server.create_packet(0x4000u64).is_valid());

        r.server.shutdown();
        assert_eq!(r.log.count(|e| *e == Event::Shutdown), 1);
    }

    #[test]
    fn queries() {
        let mut r = rig(4);
        send_from(&r.net, BOB, &ticket_for(BOB));
        send_from(&r.net, ALICE, &Introduction::new("AB3K9", "Nova"));
        r.server.poll();

        assert_eq!(r.server.connected_players(), [ALICE, BOB]);
        assert_eq!(
            r.server.players(),
            [(ALICE, PlayerStatus::Pending), (BOB, PlayerStatus::InServer)]
        );
        assert_eq!(r.server.max_players(), 4);
        r.server.set_max_players(8);
        assert_eq!(r.server.max_players(), 8);
        r.server.set_name("Lobby");
        assert_eq!(r.server.name(), "Lobby");
        assert_eq!(r.server.local_identity(), SERVER);
    }
}

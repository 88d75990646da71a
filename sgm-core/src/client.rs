//! The initiating role.
//!
//! A [`Client`] drives one outbound connection at a time:
//!
//! ```text
//! connect_to ──[Introduction(nonce, name)]──► server
//!            ◄──[Introduction(nonce)]──────── echo, nonce checked
//!            ──[DoAuth(ticket)]─────────────►
//!            ◄──[AuthSuccess | AuthFailed]───
//! ```
//!
//! Everything inbound is drained from the transport inside [`Client::poll`];
//! nothing calls back into the client from outside.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::demux::{self, ChannelSet, InboundSink, PumpStats};
use crate::error::{Result, SgmError};
use crate::message::{ConnectionError, PacketKind, SendType};
use crate::packet::{Packet, PacketOrigin};
use crate::protocol::{
    AuthFailed, DoAuth, Introduction, Message, SessionInfo, SessionInfoRequest, UserDisconnected,
    UserKicked,
};
use crate::state::ConnectionStatus;
use crate::transport::{AuthBackend, CONTROL_CHANNEL, Channel, SessionEvent, TicketHandle, Transport};
use crate::types::PeerId;

/// Length of the correlation nonce sent with an introduction.
pub const NONCE_LEN: usize = 5;

const NONCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a fresh nonce uniformly from `A–Z0–9`.
pub fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}

// ── Observer ─────────────────────────────────────────────────────

/// Client notifications. Every method defaults to a no-op; observers are
/// invoked in registration order.
pub trait ClientObserver {
    fn on_connecting(&mut self, _server: PeerId) {}

    fn on_status_changed(&mut self, _status: ConnectionStatus) {}

    /// Every inbound packet, control traffic included, positioned at the
    /// kind header.
    fn on_data_received(&mut self, _sender: PeerId, _packet: &mut Packet, _channel: Channel) {}

    fn on_connection_closed(
        &mut self,
        _server: PeerId,
        _error: ConnectionError,
        _reason: Option<&str>,
    ) {
    }

    fn on_session_info(&mut self, _info: &SessionInfo) {}
}

// ── Client ───────────────────────────────────────────────────────

pub struct Client<T: Transport, A: AuthBackend> {
    transport: T,
    auth: A,
    config: ClientConfig,

    status: ConnectionStatus,
    /// The server we are connecting or connected to.
    target: Option<PeerId>,
    nonce: Option<String>,
    /// Ticket issued for the current attempt, until cancelled.
    ticket: Option<TicketHandle>,
    /// Whether a ticket was sent to the target.
    auth_session_begun: bool,
    session_info: Option<SessionInfo>,

    channels: ChannelSet,
    observers: Vec<Box<dyn ClientObserver>>,
    nonce_generator: Box<dyn FnMut() -> String>,
}

impl<T: Transport, A: AuthBackend> Client<T, A> {
    pub fn new(transport: T, auth: A, config: ClientConfig) -> Self {
        Self {
            transport,
            auth,
            config,
            status: ConnectionStatus::default(),
            target: None,
            nonce: None,
            ticket: None,
            auth_session_begun: false,
            session_info: None,
            channels: ChannelSet::new(),
            observers: Vec::new(),
            nonce_generator: Box::new(generate_nonce),
        }
    }

    /// Replace the nonce source.
    pub fn with_nonce_generator(mut self, generator: impl FnMut() -> String + 'static) -> Self {
        self.nonce_generator = Box::new(generator);
        self
    }

    pub fn add_observer(&mut self, observer: impl ClientObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Poll `channel` in addition to channel 0. Returns `false` for channel
    /// 0 and channels already registered.
    pub fn add_channel(&mut self, channel: Channel) -> bool {
        self.channels.register(channel)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn target(&self) -> Option<PeerId> {
        self.target
    }

    /// Nonce of the attempt in flight.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn has_ticket(&self) -> bool {
        self.ticket.is_some()
    }

    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session_info.as_ref()
    }

    pub fn channels(&self) -> &[Channel] {
        self.channels.registered()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn local_identity(&self) -> PeerId {
        self.auth.local_identity()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    // ── Connection ───────────────────────────────────────────────

    /// Start a connection attempt to `server`, replacing any attempt in
    /// flight.
    pub fn connect_to(&mut self, server: PeerId) -> Result<()> {
        if !server.is_valid() {
            return Err(SgmError::ProtocolViolation("cannot connect to the nil peer"));
        }
        self.release_auth();

        info!(%server, "connecting");
        self.target = Some(server);
        let mut next = self.status;
        next.begin_connect();
        self.set_status(next);
        for observer in &mut self.observers {
            observer.on_connecting(server);
        }

        let nonce = (self.nonce_generator)();
        self.nonce = Some(nonce.clone());
        let intro = Introduction::new(nonce, self.config.display_name.clone());
        let mut packet = intro.to_packet(PacketOrigin::Client)?;
        self.send_to(server, &mut packet, SendType::Reliable, CONTROL_CHANNEL)
    }

    /// Tear the current connection down and raise connection-closed.
    pub fn disconnect(&mut self, error: ConnectionError, reason: Option<&str>) {
        self.teardown(error, reason, ConnectionStatus::fail);
    }

    /// Tell the server we are leaving, then tear down into `Unknown`.
    pub fn leave(&mut self) -> Result<()> {
        let server = self.target.ok_or(SgmError::NotConnected)?;
        if !self.send_control(server, &UserDisconnected) {
            warn!(%server, "leave notice not delivered");
        }
        self.teardown(ConnectionError::Unknown, Some("left"), ConnectionStatus::reset);
        Ok(())
    }

    /// Ask the server for its session info. The answer arrives through
    /// [`ClientObserver::on_session_info`].
    pub fn request_session_info(&mut self) -> Result<()> {
        let server = self.target.ok_or(SgmError::NotConnected)?;
        let mut packet = SessionInfoRequest.to_packet(PacketOrigin::Client)?;
        self.send_to(server, &mut packet, SendType::Reliable, CONTROL_CHANNEL)
    }

    // ── Packets ──────────────────────────────────────────────────

    /// A writable packet of `kind`, or an invalid one while no server is
    /// targeted.
    pub fn create_packet(&self, kind: impl Into<u64>) -> Packet {
        if self.target.is_none() {
            return Packet::invalid();
        }
        Packet::writable(PacketOrigin::Client, kind)
    }

    /// Send `packet` to the server. The packet is disposed even if the
    /// transport refuses it.
    pub fn send(&mut self, packet: &mut Packet, send_type: SendType, channel: Channel) -> Result<()> {
        let Some(server) = self.target else {
            packet.dispose();
            return Err(SgmError::NotConnected);
        };
        self.send_to(server, packet, send_type, channel)
    }

    // ── Poll ─────────────────────────────────────────────────────

    /// Drain session events, then every inbound message.
    pub fn poll(&mut self) -> PumpStats {
        for event in self.transport.drain_session_events() {
            self.handle_session_event(event);
        }
        let channels = self.channels.clone();
        demux::pump(&channels, self)
    }

    // ── Internals ────────────────────────────────────────────────

    fn send_to(
        &mut self,
        peer: PeerId,
        packet: &mut Packet,
        send_type: SendType,
        channel: Channel,
    ) -> Result<()> {
        let kind = packet.kind();
        let bytes = packet.seal()?;
        if !self.transport.send(peer, &bytes, send_type, channel) {
            return Err(SgmError::TransportFailure { peer, channel });
        }
        debug!(%peer, channel, kind, len = bytes.len(), "packet sent");
        Ok(())
    }

    /// Send a control message, logging failures. Returns `true` on success.
    fn send_control<M: Message>(&mut self, peer: PeerId, message: &M) -> bool {
        let result = message
            .to_packet(PacketOrigin::Client)
            .and_then(|mut packet| self.send_to(peer, &mut packet, SendType::Reliable, CONTROL_CHANNEL));
        match result {
            Ok(()) => true,
            Err(e) => {
                let kind = M::KIND;
                warn!(%peer, %kind, "control send failed: {e}");
                false
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = std::mem::discriminant(&self.status) != std::mem::discriminant(&status);
        self.status = status;
        if changed {
            info!(%status, "client status changed");
            for observer in &mut self.observers {
                observer.on_status_changed(status);
            }
        }
    }

    /// Cancel the outstanding ticket and end the auth session with the
    /// current target, if any.
    fn release_auth(&mut self) {
        if let Some(handle) = self.ticket.take() {
            self.auth.cancel_ticket(handle);
        }
        if self.auth_session_begun {
            self.auth_session_begun = false;
            if let Some(server) = self.target {
                self.auth.end_session(server);
            }
        }
    }

    fn teardown(
        &mut self,
        error: ConnectionError,
        reason: Option<&str>,
        settle: fn(&mut ConnectionStatus),
    ) {
        if self.target.is_none() {
            debug!("no connection to tear down");
            return;
        }
        self.release_auth();
        let Some(server) = self.target.take() else {
            return;
        };
        if server.is_valid() {
            self.transport.close_session(server);
        }
        self.nonce = None;
        self.session_info = None;

        let uptime_ms = self
            .status
            .connected_duration()
            .map_or(0, |d| d.as_millis() as u64);
        info!(%server, %error, reason = reason.unwrap_or(""), uptime_ms, "connection closed");
        let mut next = self.status;
        settle(&mut next);
        self.set_status(next);
        for observer in &mut self.observers {
            observer.on_connection_closed(server, error, reason);
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Requested(peer) => {
                if !self.transport.accept_session(peer) {
                    warn!(%peer, "failed to accept session");
                }
            }
            SessionEvent::Failed { peer, error } => {
                if self.target == Some(peer) {
                    warn!(%peer, %error, "session with server failed");
                    self.disconnect(ConnectionError::Unknown, Some(&error.to_string()));
                } else {
                    debug!(%peer, %error, "session failure for unrelated peer");
                }
            }
        }
    }

    fn handle_introduction(&mut self, server: PeerId, packet: &mut Packet) -> Result<()> {
        if !self.status.is_connecting() {
            debug!(status = %self.status, "ignoring introduction outside Connecting");
            return Ok(());
        }
        let echo = Introduction::decode(packet)?;
        if self.nonce.as_deref() != Some(echo.nonce.as_str()) {
            warn!(%server, received = %echo.nonce, "introduction nonce mismatch");
            self.disconnect(ConnectionError::AuthenticationError, None);
            return Ok(());
        }
        if self.ticket.is_some() {
            debug!(%server, "ticket already submitted; ignoring repeated echo");
            return Ok(());
        }

        let Some(ticket) = self.auth.request_ticket() else {
            warn!("auth backend issued no ticket");
            self.disconnect(ConnectionError::AuthenticationError, None);
            return Ok(());
        };
        self.ticket = Some(ticket.handle);

        let request = DoAuth {
            ticket: ticket.data,
        };
        if !self.send_control(server, &request) {
            self.disconnect(ConnectionError::AuthenticationError, None);
            return Ok(());
        }
        self.auth_session_begun = true;
        debug!(%server, "auth ticket submitted");
        Ok(())
    }
}

impl<T: Transport, A: AuthBackend> InboundSink for Client<T, A> {
    fn origin(&self) -> PacketOrigin {
        PacketOrigin::Client
    }

    fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)> {
        self.transport.message_available(channel)?;
        self.transport.receive(channel)
    }

    fn handle_control(&mut self, sender: PeerId, packet: &mut Packet) -> Result<()> {
        if self.target != Some(sender) {
            debug!(%sender, "control packet from a peer other than the server");
            return Ok(());
        }
        let Ok(kind) = packet.packet_kind() else {
            return Ok(());
        };

        match kind {
            PacketKind::Introduction => self.handle_introduction(sender, packet),
            PacketKind::AuthSuccess => {
                if !self.status.is_connecting() {
                    debug!(status = %self.status, "ignoring AuthSuccess");
                    return Ok(());
                }
                let mut next = self.status;
                next.complete_auth()?;
                info!(server = %sender, "authenticated");
                self.set_status(next);
                Ok(())
            }
            PacketKind::AuthFailed => {
                let error = AuthFailed::read_code(packet)?;
                self.disconnect(error, None);
                Ok(())
            }
            PacketKind::UserKicked => {
                let kicked = UserKicked::decode(packet).unwrap_or_default();
                self.disconnect(ConnectionError::Unknown, kicked.reason.as_deref());
                Ok(())
            }
            PacketKind::SessionInfo => {
                let info = SessionInfo::decode(packet)?;
                debug!(server = %info.server_id, name = %info.name, "session info received");
                for observer in &mut self.observers {
                    observer.on_session_info(&info);
                }
                self.session_info = Some(info);
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

//! In-memory collaborators.
//!
//! [`LoopbackNetwork`] stands in for the P2P transport: every endpoint it
//! hands out shares one set of queues keyed by recipient and channel.
//! [`LoopbackAuth`] stands in for the ticket service: tickets name the
//! identity they were issued for, and validation verdicts are queued until
//! the owning role drains them.
//!
//! Both share state through `Rc<RefCell<_>>`, so clones observe and steer
//! the same instance while a role owns another clone.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::message::{AuthResponse, BeginAuthResult, SendType, SessionError};
use crate::packet::KIND_HEADER_LEN;
use crate::transport::{
    AuthBackend, AuthTicket, Channel, SessionEvent, TicketHandle, Transport, ValidationResult,
};
use crate::types::PeerId;

// ── Network ──────────────────────────────────────────────────────

/// One message accepted by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: PeerId,
    pub to: PeerId,
    pub channel: Channel,
    pub send_type: SendType,
    /// Kind header, or `None` for buffers shorter than a header.
    pub kind: Option<u64>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct NetworkState {
    queues: HashMap<(PeerId, Channel), VecDeque<(Vec<u8>, PeerId)>>,
    /// `(local, remote)`: local has an open session with remote.
    sessions: HashSet<(PeerId, PeerId)>,
    /// `(local, remote)`: remote is waiting for local to accept.
    requested: HashSet<(PeerId, PeerId)>,
    events: HashMap<PeerId, Vec<SessionEvent>>,
    down: HashSet<PeerId>,
    sent: Vec<SentMessage>,
}

/// Shared in-memory message fabric.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport endpoint for `id`.
    pub fn endpoint(&self, id: PeerId) -> LoopbackTransport {
        LoopbackTransport {
            id,
            network: self.clone(),
        }
    }

    /// Refuse every send to or from `peer` while `down` is set.
    pub fn set_link_down(&self, peer: PeerId, down: bool) {
        let mut state = self.state.borrow_mut();
        if down {
            state.down.insert(peer);
        } else {
            state.down.remove(&peer);
        }
    }

    /// Report to `local` that its session with `remote` broke.
    pub fn fail_session(&self, local: PeerId, remote: PeerId, error: SessionError) {
        let mut state = self.state.borrow_mut();
        state.sessions.remove(&(local, remote));
        state
            .events
            .entry(local)
            .or_default()
            .push(SessionEvent::Failed {
                peer: remote,
                error,
            });
    }

    /// Queue raw bytes for `to` without any session bookkeeping.
    pub fn inject(&self, from: PeerId, to: PeerId, channel: Channel, bytes: Vec<u8>) {
        self.state
            .borrow_mut()
            .queues
            .entry((to, channel))
            .or_default()
            .push_back((bytes, from));
    }

    pub fn has_session(&self, local: PeerId, remote: PeerId) -> bool {
        self.state.borrow().sessions.contains(&(local, remote))
    }

    /// Messages waiting for `peer` on `channel`.
    pub fn pending(&self, peer: PeerId, channel: Channel) -> usize {
        self.state
            .borrow()
            .queues
            .get(&(peer, channel))
            .map_or(0, VecDeque::len)
    }

    /// Every message accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.borrow().sent.clone()
    }

    /// Kinds of the messages sent to `peer`, in send order.
    pub fn sent_kinds_to(&self, peer: PeerId) -> Vec<u64> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter(|m| m.to == peer)
            .filter_map(|m| m.kind)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }
}

/// A [`Transport`] endpoint on a [`LoopbackNetwork`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    id: PeerId,
    network: LoopbackNetwork,
}

impl LoopbackTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn network(&self) -> &LoopbackNetwork {
        &self.network
    }
}

impl Transport for LoopbackTransport {
    fn message_available(&mut self, channel: Channel) -> Option<usize> {
        let state = self.network.state.borrow();
        state
            .queues
            .get(&(self.id, channel))
            .and_then(|q| q.front())
            .map(|(bytes, _)| bytes.len())
    }

    fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)> {
        let mut state = self.network.state.borrow_mut();
        state.queues.get_mut(&(self.id, channel))?.pop_front()
    }

    fn send(
        &mut self,
        recipient: PeerId,
        bytes: &[u8],
        send_type: SendType,
        channel: Channel,
    ) -> bool {
        let mut state = self.network.state.borrow_mut();
        if state.down.contains(&self.id) || state.down.contains(&recipient) {
            debug!(from = %self.id, to = %recipient, "loopback link down");
            return false;
        }

        state.sessions.insert((self.id, recipient));
        if !state.sessions.contains(&(recipient, self.id))
            && state.requested.insert((recipient, self.id))
        {
            state
                .events
                .entry(recipient)
                .or_default()
                .push(SessionEvent::Requested(self.id));
        }

        let kind = bytes
            .get(..KIND_HEADER_LEN)
            .and_then(|h| <[u8; 8]>::try_from(h).ok())
            .map(u64::from_le_bytes);
        state.sent.push(SentMessage {
            from: self.id,
            to: recipient,
            channel,
            send_type,
            kind,
            bytes: bytes.to_vec(),
        });
        state
            .queues
            .entry((recipient, channel))
            .or_default()
            .push_back((bytes.to_vec(), self.id));
        true
    }

    fn accept_session(&mut self, peer: PeerId) -> bool {
        let mut state = self.network.state.borrow_mut();
        state.requested.remove(&(self.id, peer));
        state.sessions.insert((self.id, peer));
        true
    }

    fn close_session(&mut self, peer: PeerId) -> bool {
        let mut state = self.network.state.borrow_mut();
        state.requested.remove(&(self.id, peer));
        state.sessions.remove(&(self.id, peer))
    }

    fn drain_session_events(&mut self) -> Vec<SessionEvent> {
        self.network
            .state
            .borrow_mut()
            .events
            .remove(&self.id)
            .unwrap_or_default()
    }
}

// ── Auth ─────────────────────────────────────────────────────────

const TICKET_MAGIC: &[u8; 3] = b"TKT";
const TICKET_LEN: usize = 3 + 8 + 4;

#[derive(Debug, Default)]
struct AuthState {
    identity: PeerId,
    secure: bool,
    tickets_unavailable: bool,
    next_handle: u32,
    /// Peers whose validation fails asynchronously.
    rejected: HashSet<PeerId>,
    /// Peers whose tickets are refused on submission.
    refused: HashSet<PeerId>,
    active: HashSet<PeerId>,
    results: VecDeque<ValidationResult>,
    issued: Vec<TicketHandle>,
    cancelled: Vec<TicketHandle>,
    begun: Vec<PeerId>,
    ended: Vec<PeerId>,
}

/// In-memory ticket service.
#[derive(Debug, Clone, Default)]
pub struct LoopbackAuth {
    state: Rc<RefCell<AuthState>>,
}

impl LoopbackAuth {
    pub fn new(identity: PeerId) -> Self {
        let auth = Self::default();
        {
            let mut state = auth.state.borrow_mut();
            state.identity = identity;
            state.next_handle = 1;
        }
        auth
    }

    /// The identity a loopback ticket was issued for.
    pub fn ticket_owner(ticket: &[u8]) -> Option<PeerId> {
        if ticket.len() != TICKET_LEN || !ticket.starts_with(TICKET_MAGIC) {
            return None;
        }
        let id: [u8; 8] = ticket[3..11].try_into().ok()?;
        Some(PeerId(u64::from_le_bytes(id)))
    }

    pub fn set_secure(&self, secure: bool) {
        self.state.borrow_mut().secure = secure;
    }

    /// When `false`, [`AuthBackend::request_ticket`] yields nothing.
    pub fn set_ticket_available(&self, available: bool) {
        self.state.borrow_mut().tickets_unavailable = !available;
    }

    /// Validation for `peer` will start but end with `TicketInvalid`.
    pub fn reject_peer(&self, peer: PeerId) {
        self.state.borrow_mut().rejected.insert(peer);
    }

    /// Tickets from `peer` are refused on submission.
    pub fn refuse_peer(&self, peer: PeerId) {
        self.state.borrow_mut().refused.insert(peer);
    }

    /// Queue a verdict as if the service had produced it.
    pub fn push_result(&self, peer: PeerId, response: AuthResponse) {
        self.state
            .borrow_mut()
            .results
            .push_back(ValidationResult { peer, response });
    }

    pub fn pending_results(&self) -> usize {
        self.state.borrow().results.len()
    }

    pub fn issued(&self) -> Vec<TicketHandle> {
        self.state.borrow().issued.clone()
    }

    pub fn cancelled(&self) -> Vec<TicketHandle> {
        self.state.borrow().cancelled.clone()
    }

    /// Peers whose validation was started, in order.
    pub fn begun(&self) -> Vec<PeerId> {
        self.state.borrow().begun.clone()
    }

    /// Peers whose auth session was ended, in order.
    pub fn ended(&self) -> Vec<PeerId> {
        self.state.borrow().ended.clone()
    }

    /// Peers with a validation session open.
    pub fn active_sessions(&self) -> usize {
        self.state.borrow().active.len()
    }
}

impl AuthBackend for LoopbackAuth {
    fn request_ticket(&mut self) -> Option<AuthTicket> {
        let mut state = self.state.borrow_mut();
        if state.tickets_unavailable {
            return None;
        }
        let handle = TicketHandle(state.next_handle);
        state.next_handle += 1;
        state.issued.push(handle);

        let mut data = Vec::with_capacity(TICKET_LEN);
        data.extend_from_slice(TICKET_MAGIC);
        data.extend_from_slice(&state.identity.as_u64().to_le_bytes());
        data.extend_from_slice(&handle.0.to_le_bytes());
        Some(AuthTicket { handle, data })
    }

    fn cancel_ticket(&mut self, handle: TicketHandle) {
        self.state.borrow_mut().cancelled.push(handle);
    }

    fn begin_validation(&mut self, ticket: &[u8], peer: PeerId) -> BeginAuthResult {
        let mut state = self.state.borrow_mut();
        if state.refused.contains(&peer) {
            return BeginAuthResult::InvalidTicket;
        }
        match Self::ticket_owner(ticket) {
            Some(owner) if owner == peer => {}
            _ => return BeginAuthResult::InvalidTicket,
        }
        if !state.active.insert(peer) {
            return BeginAuthResult::DuplicateRequest;
        }
        state.begun.push(peer);

        let response = if state.rejected.contains(&peer) {
            AuthResponse::TicketInvalid
        } else {
            AuthResponse::Ok
        };
        state.results.push_back(ValidationResult { peer, response });
        BeginAuthResult::Ok
    }

    fn end_session(&mut self, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        state.active.remove(&peer);
        state.ended.push(peer);
    }

    fn drain_validation_results(&mut self) -> Vec<ValidationResult> {
        self.state.borrow_mut().results.drain(..).collect()
    }

    fn local_identity(&self) -> PeerId {
        self.state.borrow().identity
    }

    fn is_secure(&self) -> bool {
        self.state.borrow().secure
    }
}

// ── Tests ────────────────────────────────────────────────────────

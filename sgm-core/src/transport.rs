//! Seams to the external collaborators: the P2P transport and the
//! ticket authentication backend.
//!
//! Both are polled, never called back into: whatever the platform reports
//! asynchronously is queued on the collaborator and drained by the owning
//! role during its `poll`.

use crate::message::{AuthResponse, BeginAuthResult, SendType, SessionError};
use crate::types::PeerId;

/// Integer tag separating message streams.
pub type Channel = i32;

/// The protocol control channel. Always polled, never registered.
pub const CONTROL_CHANNEL: Channel = 0;

// ── Transport ────────────────────────────────────────────────────

/// Something the transport reported since the last drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A remote peer wants to open a session with us.
    Requested(PeerId),
    /// The session with `peer` broke.
    Failed { peer: PeerId, error: SessionError },
}

/// Message-oriented P2P transport.
pub trait Transport {
    /// Size of the next pending message on `channel`, if any.
    fn message_available(&mut self, channel: Channel) -> Option<usize>;

    /// Pop the next pending message on `channel` together with its sender.
    fn receive(&mut self, channel: Channel) -> Option<(Vec<u8>, PeerId)>;

    /// Hand a message to the transport. Returns `false` if it was refused.
    fn send(&mut self, recipient: PeerId, bytes: &[u8], send_type: SendType, channel: Channel)
    -> bool;

    fn accept_session(&mut self, peer: PeerId) -> bool;

    fn close_session(&mut self, peer: PeerId) -> bool;

    fn drain_session_events(&mut self) -> Vec<SessionEvent>;
}

// ── Authentication ───────────────────────────────────────────────

/// Handle identifying an issued ticket so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketHandle(pub u32);

/// An opaque credential issued for the local identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    pub handle: TicketHandle,
    pub data: Vec<u8>,
}

/// Outcome of one asynchronous validation started with
/// [`AuthBackend::begin_validation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    pub peer: PeerId,
    pub response: AuthResponse,
}

/// External identity service issuing and validating tickets.
pub trait AuthBackend {
    /// Issue a ticket for the local identity. `None` if none is available.
    fn request_ticket(&mut self) -> Option<AuthTicket>;

    fn cancel_ticket(&mut self, handle: TicketHandle);

    /// Start validating `ticket` as belonging to `peer`. The final verdict
    /// arrives later through [`drain_validation_results`](Self::drain_validation_results).
    fn begin_validation(&mut self, ticket: &[u8], peer: PeerId) -> BeginAuthResult;

    fn end_session(&mut self, peer: PeerId);

    fn drain_validation_results(&mut self) -> Vec<ValidationResult>;

    fn local_identity(&self) -> PeerId;

    /// Whether the server enforces the backend's secure policy.
    fn is_secure(&self) -> bool;
}

//! # sgm-core
//!
//! Core library for SGMulti, a peer-to-peer game networking layer.
//!
//! This crate contains:
//! - **Codec**: `Packet`, typed field encoding (`WriteField` / `ReadField`),
//!   `Vector3`, `Quaternion`, `Decimal`
//! - **Catalog**: `PacketKind`, wire enums, and the protocol payloads
//! - **Demux**: channel registration and the inbound pump
//! - **Roles**: `Client` (connection state machine) and `Server` (session
//!   registry and ticket bookkeeping)
//! - **Collaborators**: the `Transport` and `AuthBackend` traits, plus an
//!   in-memory loopback implementation of both
//! - **Error**: `SgmError`, a typed, `thiserror`-based error hierarchy

pub mod client;
pub mod config;
pub mod demux;
pub mod error;
pub mod field;
pub mod loopback;
pub mod message;
pub mod packet;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod state;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, ClientObserver};
pub use config::{ClientConfig, DEFAULT_MAX_PLAYERS, ServerConfig};
pub use demux::{ChannelSet, PumpStats};
pub use error::{Result, SgmError};
pub use field::{ReadField, WriteField};
pub use loopback::{LoopbackAuth, LoopbackNetwork, LoopbackTransport};
pub use message::{
    AuthResponse, BeginAuthResult, ConnectionError, PacketKind, SendType, SessionError,
};
pub use packet::{KIND_HEADER_LEN, MAX_PACKET_SIZE, Packet, PacketMode, PacketOrigin};
pub use registry::SessionRegistry;
pub use server::{Server, ServerObserver};
pub use state::{ConnectionStatus, PlayerEntry, PlayerStatus};
pub use transport::{
    AuthBackend, AuthTicket, CONTROL_CHANNEL, Channel, SessionEvent, TicketHandle, Transport,
    ValidationResult,
};
pub use types::{Decimal, PeerId, Quaternion, Vector3};

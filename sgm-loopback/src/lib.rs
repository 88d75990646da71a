//! # sgm-loopback: SGMulti simulation
//!
//! Runs one server and a configurable set of clients over the in-memory
//! collaborators from `sgm-core`, then reports what each side observed.
//!
//! ## Rounds
//!
//! Every round polls the server, relays chat lines it collected on the
//! data channel, then polls each client. Session info is requested once a
//! client is connected; chat and a spawn broadcast fire on configured
//! rounds.

pub mod config;
pub mod sim;

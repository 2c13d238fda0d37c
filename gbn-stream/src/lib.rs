//! `gbn-stream` — a reliable, ordered byte stream over UDP.
//!
//! One side (the initiator) opens a connection with a three-way handshake,
//! streams a payload with Go-Back-N (sliding window, cumulative ACKs,
//! whole-window retransmission on timeout) and closes with a four-way
//! teardown.  The other side (the responder) accepts the connection and
//! writes the in-order stream to a sink.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────────────── gbn_connection ──────────────────────────┐
//!  │   transfer()  ──drives──▶ Initiator        Responder ◀──drives── serve()
//!  └───────────────────────────────┬────────────────┬───────────────────┘
//!                                  │                │
//!           ┌──────────────────────┼────────────────┼──────────────────┐
//!           │ Connection (phases)  │                │                  │
//!           │ SendWindow ◀─────────┘                └──▶ ReceiveAssembler
//!           │ RetransmitTimer / ControlTimer                            │
//!           └──────────────────────────────┬───────────────────────────┘
//!                                          │ Segment encode / decode
//!                                  ┌───────▼────────┐
//!                                  │   Transport    │ UdpTransport | SimTransport
//!                                  └────────────────┘
//! ```
//!
//! The engines never perform I/O and never read the clock; every step takes
//! `now` and returns the segments to send.  Only the drivers are async.
//!
//! Each module has a single responsibility:
//! - [`packet`]          — wire format (serialise / deserialise)
//! - [`state`]           — roles and connection phases
//! - [`config`]          — tuning parameters and reliability modes
//! - [`connection`]      — handshake / teardown state machine
//! - [`gbn_sender`]      — Go-Back-N send window over the payload
//! - [`gbn_receiver`]    — in-order receive assembler
//! - [`sender`]          — initiator engine (connection + send window)
//! - [`receiver`]        — responder engine (connection + assembler)
//! - [`gbn_connection`]  — async drivers over a transport
//! - [`timer`]           — retransmission and control retry timers
//! - [`stats`]           — counters for silently tolerated events
//! - [`error`]           — unrecoverable errors
//! - [`socket`]          — transport trait and UDP implementation
//! - [`simulator`]       — deterministic lossy in-memory transport

pub mod config;
pub mod connection;
pub mod error;
pub mod gbn_connection;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod timer;

pub use config::{ReliabilityMode, TransferConfig};
pub use error::ConnError;
pub use gbn_connection::{serve, transfer, TransferReport};
pub use packet::Segment;
pub use receiver::Responder;
pub use sender::Initiator;
pub use socket::{Transport, UdpTransport};
pub use state::Phase;
pub use stats::Stats;

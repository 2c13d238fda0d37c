//! Connection finite-state machine (FSM) types.
//!
//! This module defines every phase a [`crate::connection::Connection`] can
//! occupy.  Transitions live in [`crate::connection`]; keeping the types here
//! lets the engines, drivers and error types name phases without pulling in
//! the transition logic.
//!
//! ```text
//!  initiator:  SYN_SENT ──SYN|ACK──▶ ESTABLISHED ──all acked, FIN──▶ FIN_WAIT
//!                                                                       │
//!                                             ACK of FIN + peer FIN     │
//!                                                                       ▼
//!                                                                    CLOSED
//!
//!  responder:  LISTEN ──SYN──▶ SYN_RECEIVED ──ACK──▶ ESTABLISHED
//!                                                        │ FIN
//!                                                        ▼
//!                                  CLOSED ◀──ACK── LAST_ACK
//! ```

/// Which side of the connection a [`crate::connection::Connection`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Actively opens, sends the payload, starts teardown.
    Initiator,
    /// Passively opens, receives the payload, answers teardown.
    Responder,
}

/// All possible phases of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Terminal phase; also the phase after a completed teardown.
    #[default]
    Closed,
    /// Responder waiting for a SYN.
    Listen,
    /// Initiator has sent SYN; waiting for SYN|ACK.
    SynSent,
    /// Responder has answered SYN|ACK; waiting for the final handshake ACK.
    SynReceived,
    /// Handshake complete; data transfer in progress.
    Established,
    /// Initiator sent FIN; waiting for its ACK and the peer's FIN.
    FinWait,
    /// Responder sent its FIN; waiting for the final ACK.
    LastAck,
}

impl Phase {
    /// `true` while the three-way handshake is still in progress.
    pub fn is_handshake(self) -> bool {
        matches!(self, Phase::Listen | Phase::SynSent | Phase::SynReceived)
    }

    /// `true` while the four-way teardown is in progress.
    pub fn is_teardown(self) -> bool {
        matches!(self, Phase::FinWait | Phase::LastAck)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Closed => "CLOSED",
            Phase::Listen => "LISTEN",
            Phase::SynSent => "SYN_SENT",
            Phase::SynReceived => "SYN_RECEIVED",
            Phase::Established => "ESTABLISHED",
            Phase::FinWait => "FIN_WAIT",
            Phase::LastAck => "LAST_ACK",
        };
        f.write_str(name)
    }
}

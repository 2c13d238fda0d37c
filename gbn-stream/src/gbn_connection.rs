//! Async drivers: run an engine over a [`Transport`] until the connection
//! closes.
//!
//! # Architecture
//!
//! ```text
//!   transfer(payload)                       serve(sink)
//!        │                                       │
//!   ┌────▼──────┐   data / SYN / FIN      ┌──────▼─────┐
//!   │ Initiator │ ──────────────────────▶ │ Responder  │──▶ AsyncWrite
//!   │  engine   │ ◀────────────────────── │  engine    │
//!   └────┬──────┘   ACK / SYN|ACK / FIN   └──────┬─────┘
//!        │ encode / decode                       │
//!   ┌────▼──────────────────────────────────────▼─────┐
//!   │        Transport (UdpTransport | SimTransport)   │
//!   └─────────────────────────────────────────────────┘
//! ```
//!
//! Both drivers are the same single-task loop:
//!
//! 1. `poll(now)` the engine and transmit whatever it returns;
//! 2. block in `recv_timeout` for at most the engine's `poll_timeout`;
//! 3. decode and feed every datagram that is already queued, transmitting
//!    replies as they are produced;
//! 4. repeat until the engine reports `Closed`.
//!
//! The initiator then lingers for [`TransferConfig::linger`], re-acknowledging
//! the peer's FIN should the final ACK have been lost.
//!
//! The clock is read from [`tokio::time::Instant`], so a test running with
//! a paused runtime drives retransmission timers without real waiting.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::TransferConfig;
use crate::error::ConnError;
use crate::packet::Segment;
use crate::receiver::Responder;
use crate::sender::Initiator;
use crate::socket::Transport;
use crate::state::Phase;
use crate::stats::Stats;

/// Summary of a finished connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Stream bytes sent (initiator) or delivered to the sink (responder).
    pub bytes: u64,
    pub stats: Stats,
    pub final_phase: Phase,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn initial_seq(config: &TransferConfig) -> u32 {
    config.initial_seq.unwrap_or_else(|| rand::rng().random())
}

async fn send_all<T: Transport>(
    transport: &mut T,
    peer: SocketAddr,
    segments: &[Segment],
) -> Result<(), ConnError> {
    for seg in segments {
        log::trace!("-> {peer}: {seg}");
        transport.send_to(&seg.encode(), peer).await?;
    }
    Ok(())
}

/// Connect to `peer`, deliver `payload` reliably, then close.
///
/// Returns once both directions are shut down and the linger has passed,
/// or with [`ConnError::HandshakeFailed`] / [`ConnError::TeardownExhausted`]
/// when the peer stops answering.
pub async fn transfer<T: Transport>(
    transport: &mut T,
    peer: SocketAddr,
    payload: Bytes,
    config: &TransferConfig,
) -> Result<TransferReport, ConnError> {
    let mut engine = Initiator::new(initial_seq(config), peer, payload, config)?;
    let syn = engine.open(now());
    send_all(transport, peer, &syn).await?;

    while !engine.is_finished(now()) {
        let out = engine.poll(now())?;
        send_all(transport, peer, &out).await?;

        let wait = engine.poll_timeout(now());
        let mut next = transport.recv_timeout(wait).await?;
        while let Some((bytes, from)) = next {
            match Segment::decode(&bytes) {
                Ok(seg) => {
                    log::trace!("<- {from}: {seg}");
                    let replies = engine.on_segment(&seg, from, now());
                    send_all(transport, peer, &replies).await?;
                }
                Err(e) => {
                    log::debug!("discarding datagram from {from}: {e}");
                    engine.note_malformed();
                }
            }
            if engine.is_finished(now()) {
                break;
            }
            next = transport.recv_timeout(Duration::ZERO).await?;
        }
    }

    let stats = *engine.stats();
    log::info!(
        "sent {} bytes to {peer}: {} segments, {} retransmission rounds",
        engine.window().total_len(),
        stats.segments_sent,
        stats.retransmit_rounds
    );
    Ok(TransferReport {
        bytes: engine.window().total_len() as u64,
        stats,
        final_phase: engine.phase(),
    })
}

/// Accept one connection and write the received stream into `sink`.
///
/// Every accepted segment is written and flushed before it is acknowledged;
/// the sink is shut down when the peer's FIN arrives.
pub async fn serve<T, W>(
    transport: &mut T,
    sink: &mut W,
    config: &TransferConfig,
) -> Result<TransferReport, ConnError>
where
    T: Transport,
    W: AsyncWrite + Unpin,
{
    let mut engine = Responder::new(initial_seq(config), config)?;
    log::info!("listening on {}", transport.local_addr());

    while !engine.is_closed() {
        let out = engine.poll(now())?;
        if let Some(peer) = engine.peer() {
            send_all(transport, peer, &out).await?;
        }

        let wait = engine.poll_timeout(now());
        let mut next = transport.recv_timeout(wait).await?;
        while let Some((bytes, from)) = next {
            match Segment::decode(&bytes) {
                Ok(seg) => {
                    log::trace!("<- {from}: {seg}");
                    let inbound = engine.on_segment(&seg, from, now());
                    if let Some(data) = &inbound.delivered {
                        sink.write_all(data).await.map_err(ConnError::Sink)?;
                        sink.flush().await.map_err(ConnError::Sink)?;
                    }
                    if inbound.finished {
                        sink.shutdown().await.map_err(ConnError::Sink)?;
                    }
                    if let Some(peer) = engine.peer() {
                        send_all(transport, peer, &inbound.replies).await?;
                    }
                }
                Err(e) => {
                    log::debug!("discarding datagram from {from}: {e}");
                    engine.note_malformed();
                }
            }
            if engine.is_closed() {
                break;
            }
            next = transport.recv_timeout(Duration::ZERO).await?;
        }
    }

    let stats = *engine.stats();
    log::info!(
        "received {} bytes: {} accepted, {} duplicate, {} out of order, {} dropped",
        stats.bytes_delivered,
        stats.accepted_segments,
        stats.duplicate_segments,
        stats.out_of_order_segments,
        stats.dropped()
    );
    Ok(TransferReport {
        bytes: stats.bytes_delivered,
        stats,
        final_phase: engine.phase(),
    })
}

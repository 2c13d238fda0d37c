//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Words |  rsv  |   Flags   |        Window Size                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       Checksum (always 0)     |      Urgent (always 0)        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes.
//!
//! The `Words` nibble carries [`HEADER_WORDS`] on encode and is never read
//! back; the payload always starts at byte 16.  Checksum and urgent pointer
//! are written as zero and ignored on decode, so a corrupted but
//! well-formed header is accepted as genuine.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Bit-flag constants for the flags field.
pub mod flags {
    /// Finish: sender has no more data to send.
    pub const FIN: u8 = 0x01;
    /// Synchronise sequence numbers (handshake).
    pub const SYN: u8 = 0x02;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0x10;
    /// Bits of the 16-bit flags field that hold flags.
    pub const MASK: u16 = 0x3F;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Value written into the header-length nibble.  Vestigial: no decoder
/// uses it to locate the payload.
pub const HEADER_WORDS: u16 = 4;

/// Advertised window placed in every outbound segment.  Informational only.
pub const DEFAULT_WINDOW: u16 = 4096;

/// A complete protocol datagram: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Stream offset of the first payload byte, or the control sequence
    /// number for SYN/FIN.
    pub seq: u32,
    /// Next byte offset expected from the peer.
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Advertised window (not enforced by either side).
    pub window: u16,
    pub payload: Bytes,
}

impl Segment {
    /// A payload-free control segment (SYN, ACK, FIN or a combination).
    pub fn control(seq: u32, ack: u32, flags: u8) -> Self {
        Self {
            seq,
            ack,
            flags,
            window: DEFAULT_WINDOW,
            payload: Bytes::new(),
        }
    }

    /// A data segment.  Data segments always piggyback an ACK.
    pub fn data(seq: u32, ack: u32, payload: Bytes) -> Self {
        Self {
            seq,
            ack,
            flags: flags::ACK,
            window: DEFAULT_WINDOW,
            payload,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// `true` when the segment carries stream bytes.
    pub fn has_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Serialise this segment.  Always produces `HEADER_LEN + payload.len()`
    /// bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u16((HEADER_WORDS << 12) | (u16::from(self.flags) & flags::MASK));
        buf.put_u16(self.window);
        buf.put_u16(0); // checksum
        buf.put_u16(0); // urgent pointer
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Fails only when `buf` is shorter than [`HEADER_LEN`].  Every byte past
    /// the header is taken verbatim as payload, including none at all.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated { len: buf.len() });
        }

        let mut header = &buf[..HEADER_LEN];
        let seq = header.get_u32();
        let ack = header.get_u32();
        let flags_field = header.get_u16();
        let window = header.get_u16();
        // checksum and urgent pointer are not interpreted

        Ok(Segment {
            seq,
            ack,
            flags: (flags_field & flags::MASK) as u8,
            window,
            payload: Bytes::copy_from_slice(&buf[HEADER_LEN..]),
        })
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::with_capacity(3);
        if self.is_syn() {
            names.push("SYN");
        }
        if self.is_fin() {
            names.push("FIN");
        }
        if self.is_ack() {
            names.push("ACK");
        }
        write!(
            f,
            "[{}] seq={} ack={} len={}",
            names.join("|"),
            self.seq,
            self.ack,
            self.payload.len()
        )
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {}-byte header", HEADER_LEN)]
    Truncated { len: usize },
}

// ---------------------------------------------------------------------------
// Sequence-number arithmetic
// ---------------------------------------------------------------------------

/// Returns `true` when `a` precedes `b` in wrap-around sequence space.
///
/// Valid as long as the two values are less than `u32::MAX / 2` apart.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) <= u32::MAX / 2
}

/// Returns `true` when `a` is at or before `b` in wrap-around space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= u32::MAX / 2
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PFCP common message header (TS 29.244 Sec.7.2.2).
//!
//! Wire layout:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-------+-----+-+-+---------------+-------------------------------+
//! |version|spare|M|S| message type  |        message length         |
//! +-------+-----+-+-+---------------+-------------------------------+
//! |                   SEID (8 octets, present when S=1)             |
//! +-----------------------------------------------+---------------+
//! |          sequence number (3 octets)           | spare/MP prio |
//! +-----------------------------------------------+---------------+
//! ```
//!
//! The length field counts every octet *after* the length field itself.
//! Translators build full messages by appending IE bodies to
//! [`Header::encode`]; the stack itself never reads past the header.

use crate::error::{Error, Result};
use crate::proto::{MsgType, Seid, SeqNbr, SEQUENCE_MAX};

const FLAG_SEID: u8 = 0x01;
const FLAG_MP: u8 = 0x02;

/// Size of the fixed part of the header (up to and including the length field).
pub const FIXED_LEN: usize = 4;

/// Header size without SEID: flags + type + length + seq + spare.
pub const NODE_HEADER_LEN: usize = 8;

/// Header size with the 8-octet SEID.
pub const SESSION_HEADER_LEN: usize = 16;

/// Decoded PFCP common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// Message priority (4 bits), present when the MP flag is set.
    pub priority: Option<u8>,
    /// SEID, present in session-class messages (S flag).
    pub seid: Option<Seid>,
    pub msg_type: MsgType,
    pub seq_nbr: SeqNbr,
}

impl Header {
    /// Node-class header (no SEID).
    pub fn node(msg_type: MsgType, seq_nbr: SeqNbr) -> Self {
        Self { version: crate::proto::VERSION, priority: None, seid: None, msg_type, seq_nbr }
    }

    /// Session-class header carrying the target SEID.
    pub fn session(msg_type: MsgType, seid: Seid, seq_nbr: SeqNbr) -> Self {
        Self {
            version: crate::proto::VERSION,
            priority: None,
            seid: Some(seid),
            msg_type,
            seq_nbr,
        }
    }

    /// Encoded size of this header.
    pub fn encoded_len(&self) -> usize {
        if self.seid.is_some() { SESSION_HEADER_LEN } else { NODE_HEADER_LEN }
    }

    /// Encode the header followed by `body`, with the length field filled in.
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() + body.len());

        let mut flags = self.version << 5;
        if self.seid.is_some() {
            flags |= FLAG_SEID;
        }
        if self.priority.is_some() {
            flags |= FLAG_MP;
        }
        out.push(flags);
        out.push(self.msg_type);

        // length counts everything after the length field
        let length = (self.encoded_len() - FIXED_LEN + body.len()) as u16;
        out.extend_from_slice(&length.to_be_bytes());

        if let Some(seid) = self.seid {
            out.extend_from_slice(&seid.to_be_bytes());
        }

        let seq = self.seq_nbr & SEQUENCE_MAX;
        out.push((seq >> 16) as u8);
        out.push((seq >> 8) as u8);
        out.push(seq as u8);
        out.push(self.priority.map_or(0, |p| (p & 0x0F) << 4));

        out.extend_from_slice(body);
        out
    }

    /// Parse a header from the front of a datagram.
    ///
    /// Returns the header and the offset of the first IE octet. The length
    /// field is validated against the buffer; a short datagram is an error.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < NODE_HEADER_LEN {
            return Err(Error::MalformedHeader(format!(
                "datagram too short for PFCP header ({} octets)",
                data.len()
            )));
        }

        let flags = data[0];
        let version = flags >> 5;
        let has_seid = flags & FLAG_SEID != 0;
        let has_priority = flags & FLAG_MP != 0;
        let msg_type = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        if data.len() < FIXED_LEN + length {
            return Err(Error::MalformedHeader(format!(
                "length field says {} octets but only {} present",
                length,
                data.len() - FIXED_LEN
            )));
        }

        let hdr_len = if has_seid { SESSION_HEADER_LEN } else { NODE_HEADER_LEN };
        if data.len() < hdr_len {
            return Err(Error::MalformedHeader("header truncated before sequence number".into()));
        }

        let mut off = FIXED_LEN;
        let seid = if has_seid {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[off..off + 8]);
            off += 8;
            Some(Seid::from_be_bytes(raw))
        } else {
            None
        };

        let seq_nbr = (u32::from(data[off]) << 16)
            | (u32::from(data[off + 1]) << 8)
            | u32::from(data[off + 2]);
        let prio_octet = data[off + 3];
        off += 4;

        Ok((
            Self {
                version,
                priority: has_priority.then_some(prio_octet >> 4),
                seid,
                msg_type,
                seq_nbr,
            },
            off,
        ))
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by the PFCP stack.
//!
//! Cross-stage failures never unwind across a stage boundary: a stage-local
//! failure is caught at the handler and forwarded as the matching error
//! event (`on_snd_req_error` and friends on the application worker). This
//! enum is the payload those events carry, and the error type of the
//! fallible public API calls.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by PFCP stack operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration / lifecycle
    // ========================================================================
    /// Configuration value out of range (message explains which).
    Config(String),
    /// Operation attempted in the wrong lifecycle state.
    InvalidState(String),
    /// The stack has shut down; the target stage queue is gone.
    ChannelClosed,

    // ========================================================================
    // Transport
    // ========================================================================
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Failed to bind the local node socket.
    BindFailed(String),
    /// UDP send refused by the socket.
    SendFailed(String),

    // ========================================================================
    // Topology
    // ========================================================================
    /// Local SEID assigned twice on the same session.
    LocalSeidAlreadySet,
    /// Remote SEID assigned twice on the same session.
    RemoteSeidAlreadySet,
    /// No TEID range value left for a new remote node.
    TeidRangeExhausted,
    /// `create_remote_node` called for a peer that is already Started.
    RemoteNodeAlreadyStarted,
    /// The remote node for this operation is gone.
    RemoteNodeGone,

    // ========================================================================
    // Request / response machinery
    // ========================================================================
    /// An outbound request reused a sequence number still in flight.
    DuplicateSeqNbr(u32),
    /// The peer request this response answers is no longer known
    /// (reaped by the response window, or never existed).
    RequestUnknown(u32),

    // ========================================================================
    // Codec
    // ========================================================================
    /// Translator could not serialize a request.
    EncodeReq(String),
    /// Translator could not serialize a response.
    EncodeRsp(String),
    /// Translator could not decode an inbound request.
    DecodeReq(String),
    /// Translator could not decode an inbound response.
    DecodeRsp(String),
    /// The common header is malformed or truncated.
    MalformedHeader(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::ChannelClosed => write!(f, "Stack is shut down"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::LocalSeidAlreadySet => write!(f, "Local SEID is already set"),
            Error::RemoteSeidAlreadySet => write!(f, "Remote SEID is already set"),
            Error::TeidRangeExhausted => write!(f, "No TEID range value available"),
            Error::RemoteNodeAlreadyStarted => {
                write!(f, "Unable to start remote node, already started")
            }
            Error::RemoteNodeGone => write!(f, "Remote node is no longer registered"),
            Error::DuplicateSeqNbr(sn) => {
                write!(f, "Sequence number {} already in the retransmission table", sn)
            }
            Error::RequestUnknown(sn) => {
                write!(f, "No received request with sequence number {}", sn)
            }
            Error::EncodeReq(msg) => write!(f, "Request encode failed: {}", msg),
            Error::EncodeRsp(msg) => write!(f, "Response encode failed: {}", msg),
            Error::DecodeReq(msg) => write!(f, "Request decode failed: {}", msg),
            Error::DecodeRsp(msg) => write!(f, "Response decode failed: {}", msg),
            Error::MalformedHeader(msg) => write!(f, "Malformed PFCP header: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The pluggable per-release codec.
//!
//! The stack treats Information Element bodies as opaque: everything between
//! application structs and wire bytes goes through a [`Translator`]
//! implementation for the 3GPP release in use. The stack itself only relies
//! on [`Translator::get_msg_info`] (common header inspection) and the
//! message-type accessors captured at start.
//!
//! Translators are shared across the Communication and Translation stages,
//! so implementations must be `Send + Sync` and stateless per message.

use crate::error::Result;
use crate::msg::{AppMsgReq, AppMsgRsp, Payload};
use crate::node::{LocalNode, RemoteNode};
use crate::proto::{MsgClass, MsgType, MsgTypes, Seid, SeqNbr};
use crate::stack::{ReqIn, RspIn};
use std::sync::Arc;
use std::time::SystemTime;

/// Common-header summary of one inbound datagram.
///
/// Produced by [`Translator::get_msg_info`] before any other inspection; the
/// Communication stage routes on these fields alone.
#[derive(Debug, Clone, Copy)]
pub struct MsgInfo {
    pub version: u8,
    pub is_req: bool,
    pub msg_class: MsgClass,
    pub msg_type: MsgType,
    pub seq_nbr: SeqNbr,
    /// Target SEID for session-class messages, 0 otherwise.
    pub seid: Seid,
}

/// Result of decoding an inbound request.
pub struct DecodedReq {
    /// The typed message body, downcast by the application.
    pub payload: Payload,
    /// Peer's FSEID, when the message carries one (Session Establishment
    /// Request must; `None` there is a decode error surfaced by the stack).
    pub remote_seid: Option<Seid>,
    /// Peer's Recovery Time Stamp, when the message carries one.
    pub remote_start_time: Option<SystemTime>,
}

/// Result of decoding an inbound response.
pub struct DecodedRsp {
    pub payload: Payload,
    /// Peer's FSEID to record as the session's remote SEID. Translators set
    /// this for a Session Establishment Response with a success cause; a
    /// success response lacking its FSEID is a decode error the translator
    /// reports itself.
    pub remote_seid: Option<Seid>,
    /// Peer's Recovery Time Stamp, when the message carries one.
    pub remote_start_time: Option<SystemTime>,
}

/// Per-release PFCP codec.
///
/// Encoding failures are reported as [`Error::EncodeReq`](crate::Error) /
/// [`Error::EncodeRsp`](crate::Error), decoding failures as
/// [`Error::DecodeReq`](crate::Error) / [`Error::DecodeRsp`](crate::Error);
/// the stack converts them into the corresponding application or log events,
/// nothing unwinds across a stage.
pub trait Translator: Send + Sync {
    /// Inspect the common header of a raw datagram.
    fn get_msg_info(&self, data: &[u8]) -> Result<MsgInfo>;

    /// Whether this translator speaks the given protocol version.
    fn is_version_supported(&self, version: u8) -> bool;

    /// Message class for a type code. The default follows TS 29.244.
    fn msg_class(&self, msg_type: MsgType) -> MsgClass {
        crate::proto::msg_class_of(msg_type)
    }

    /// The type codes the stack's state machines branch on.
    fn msg_types(&self) -> MsgTypes {
        MsgTypes::default()
    }

    /// Serialize an application request, header included.
    fn encode_req(&self, req: &AppMsgReq) -> Result<Vec<u8>>;

    /// Serialize an application response, header included.
    fn encode_rsp(&self, rsp: &AppMsgRsp) -> Result<Vec<u8>>;

    /// Decode an inbound request into its typed body.
    fn decode_req(&self, req: &ReqIn) -> Result<DecodedReq>;

    /// Decode an inbound response into its typed body.
    fn decode_rsp(&self, rsp: &RspIn) -> Result<DecodedRsp>;

    /// Build a Heartbeat Request (carrying the local Recovery Time Stamp).
    fn encode_heartbeat_req(
        &self,
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        seq_nbr: SeqNbr,
    ) -> Result<Vec<u8>>;

    /// Build a Heartbeat Response answering sequence number `seq_nbr`.
    fn encode_heartbeat_rsp(
        &self,
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        seq_nbr: SeqNbr,
    ) -> Result<Vec<u8>>;

    /// Extract the Recovery Time Stamp from a Heartbeat Request.
    fn decode_heartbeat_req(&self, req: &ReqIn) -> Result<SystemTime>;

    /// Extract the Recovery Time Stamp from a Heartbeat Response.
    fn decode_heartbeat_rsp(&self, rsp: &RspIn) -> Result<SystemTime>;

    /// Build the canonical Version Not Supported Response for a message
    /// whose version failed [`Translator::is_version_supported`].
    fn encode_version_not_supported_rsp(&self, info: &MsgInfo) -> Result<Vec<u8>>;
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stage event enums.
//!
//! Inter-stage hand-off is exclusively by these queued events; no stage
//! reads another stage's state. Each stage's handler is one pattern match
//! over its enum.

use crate::error::Error;
use crate::msg::{AppMsg, AppMsgReq, AppMsgRsp};
use crate::node::{LocalNode, LocalNodeState, RemoteNode, RemoteNodeState, Session};
use crate::proto::SeqNbr;
use crate::stack::internal::{ReqIn, ReqOut, RspIn, RspOut};
use std::sync::Arc;
use std::time::SystemTime;

/// Events delivered to the application work group.
pub enum AppEvent {
    /// A decoded peer request.
    RcvdReq(AppMsgReq),
    /// A decoded peer response, carrying the original request.
    RcvdRsp(AppMsgRsp),
    /// Retransmissions exhausted; the original request is handed back.
    ReqTimeout(AppMsgReq),
    LocalNodeStateChange {
        ln: Arc<LocalNode>,
        old: LocalNodeState,
        new: LocalNodeState,
    },
    RemoteNodeStateChange {
        rn: Arc<RemoteNode>,
        old: RemoteNodeState,
        new: RemoteNodeState,
    },
    /// The peer reported a newer Recovery Time Stamp.
    RemoteNodeRestart {
        rn: Arc<RemoteNode>,
        restart_time: SystemTime,
    },
    SndReqError { req: AppMsgReq, err: Error },
    SndRspError { rsp: AppMsgRsp, err: Error },
    EncodeReqError { req: AppMsgReq, err: Error },
    EncodeRspError { rsp: AppMsgRsp, err: Error },
    /// One worker consumes this and exits its loop.
    Shutdown,
}

/// Events delivered to the Translation stage.
pub enum TranslationEvent {
    /// Application wants a message encoded and sent.
    SndMsg(AppMsg),
    /// Raw inbound request to decode.
    RcvdReq(ReqIn),
    /// Raw inbound response to decode.
    RcvdRsp(RspIn),
    /// Synthesize a Heartbeat Request for an idle peer.
    SndHeartbeatReq {
        ln: Arc<LocalNode>,
        rn: Arc<RemoteNode>,
    },
    /// Answer a received Heartbeat Request.
    SndHeartbeatRsp {
        ln: Arc<LocalNode>,
        rn: Arc<RemoteNode>,
        seq_nbr: SeqNbr,
    },
    Shutdown,
}

/// Events delivered to the Communication stage.
pub enum CommEvent {
    /// Encoded request ready for transmission and retransmission tracking.
    SndReq(ReqOut),
    /// Encoded response ready for transmission (gated on the received
    /// request still being known).
    SndRsp(RspOut),
    /// Decoded inbound Heartbeat Request (restart check + answer).
    HeartbeatReq {
        ln: Arc<LocalNode>,
        rn: Arc<RemoteNode>,
        seq_nbr: SeqNbr,
        start_time: SystemTime,
    },
    /// Decoded inbound Heartbeat Response (restart check).
    HeartbeatRsp {
        rn: Arc<RemoteNode>,
        seq_nbr: SeqNbr,
        start_time: SystemTime,
    },
    /// Translator failed to build a Heartbeat Request.
    SndHeartbeatReqError { rn: Arc<RemoteNode>, err: Error },
    /// Translator failed to build a Heartbeat Response.
    SndHeartbeatRspError { rn: Arc<RemoteNode>, err: Error },
    /// Translator failed to decode an inbound request; tracking state for it
    /// is removed and the message logged (not surfaced).
    RcvdReqError { req: ReqIn, err: Error },
    /// Translator failed to decode an inbound response.
    RcvdRspError { rsp: RspIn, err: Error },
    /// T1 expired for an outbound request.
    ReqTimeout { ln: Arc<LocalNode>, seq_nbr: SeqNbr },
    /// Register a session in its nodes' SEID maps.
    AddSession(Arc<Session>),
    /// Remove a session from both SEID maps.
    DelSession(Arc<Session>),
    /// Delete one session of the remote and re-enqueue until none are left.
    DelNxtRmtSession(Arc<RemoteNode>),
    /// Register a local node's socket with the poll loop and start it.
    AddLocalNode(Arc<LocalNode>),
    /// Stop one local node and release its socket.
    StopLocalNode(Arc<LocalNode>),
    /// Release every local node and exit the stage.
    Shutdown,
}

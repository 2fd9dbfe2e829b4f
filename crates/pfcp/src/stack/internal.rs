// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Internal message carriers passed between the stages.
//!
//! `ReqOut` / `RspOut` travel Translation -> Communication with encoded
//! bytes; `ReqIn` / `RspIn` travel Communication -> Translation with raw
//! bytes. `RspIn` additionally carries the original application request so
//! the decoded response reaches the application still attached to it.

use crate::msg::{AppMsgReq, AppMsgRsp};
use crate::node::{LocalNode, RemoteNode, Session};
use crate::proto::{MsgClass, MsgType, Seid, SeqNbr};
use crate::translator::MsgInfo;
use std::sync::Arc;
use std::time::Duration;

/// An inbound request on its way to the Translation stage.
pub struct ReqIn {
    pub ln: Arc<LocalNode>,
    pub rn: Arc<RemoteNode>,
    /// Resolved (or freshly created) session for session-class requests.
    pub session: Option<Arc<Session>>,
    pub msg_type: MsgType,
    pub msg_class: MsgClass,
    pub seq_nbr: SeqNbr,
    pub seid: Seid,
    pub version: u8,
    pub data: Vec<u8>,
}

impl ReqIn {
    pub(crate) fn new(
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        session: Option<Arc<Session>>,
        info: &MsgInfo,
        data: &[u8],
    ) -> Self {
        Self {
            ln: Arc::clone(ln),
            rn: Arc::clone(rn),
            session,
            msg_type: info.msg_type,
            msg_class: info.msg_class,
            seq_nbr: info.seq_nbr,
            seid: info.seid,
            version: info.version,
            data: data.to_vec(),
        }
    }
}

/// An inbound response matched to its outbound request.
pub struct RspIn {
    pub ln: Arc<LocalNode>,
    pub rn: Arc<RemoteNode>,
    pub msg_type: MsgType,
    pub msg_class: MsgClass,
    pub seq_nbr: SeqNbr,
    pub seid: Seid,
    pub version: u8,
    pub data: Vec<u8>,
    /// The application request this response answers; `None` only for
    /// stack-synthesized requests (heartbeats).
    pub req: Option<AppMsgReq>,
}

impl RspIn {
    pub(crate) fn new(
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        info: &MsgInfo,
        data: &[u8],
        req: Option<AppMsgReq>,
    ) -> Self {
        Self {
            ln: Arc::clone(ln),
            rn: Arc::clone(rn),
            msg_type: info.msg_type,
            msg_class: info.msg_class,
            seq_nbr: info.seq_nbr,
            seid: info.seid,
            version: info.version,
            data: data.to_vec(),
            req,
        }
    }
}

/// An encoded outbound request plus its retransmission state.
pub struct ReqOut {
    pub ln: Arc<LocalNode>,
    pub rn: Arc<RemoteNode>,
    pub msg_type: MsgType,
    pub msg_class: MsgClass,
    pub seq_nbr: SeqNbr,
    pub data: Vec<u8>,
    /// The original typed request, echoed back on timeout and errors.
    /// `None` for stack-synthesized heartbeats.
    pub app_msg: Option<AppMsgReq>,
    /// Send attempts remaining (including the next one).
    pub n1: u32,
    /// Retransmit interval for this message kind.
    pub t1: Duration,
    /// Armed T1 timer, 0 when none.
    pub timer_id: u64,
    /// Response-window tag; 0 until a response arrived.
    pub rsp_wnd: u8,
    /// A response has been consumed; later matches are duplicates.
    pub completed: bool,
}

impl ReqOut {
    /// Claim one send attempt. False when the budget is exhausted.
    pub(crate) fn ok_to_snd(&mut self) -> bool {
        if self.n1 < 1 {
            return false;
        }
        self.n1 -= 1;
        true
    }
}

/// An encoded outbound response.
pub struct RspOut {
    pub ln: Arc<LocalNode>,
    pub rn: Arc<RemoteNode>,
    pub msg_type: MsgType,
    pub msg_class: MsgClass,
    pub seq_nbr: SeqNbr,
    pub data: Vec<u8>,
    /// The application response, echoed back on send errors.
    /// `None` for stack-synthesized heartbeat responses.
    pub app_msg: Option<AppMsgRsp>,
}

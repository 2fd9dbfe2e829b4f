// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-facing message carriers.
//!
//! Instead of a deep inheritance tree of per-message classes, the stack
//! carries one request-side and one response-side struct tagged with message
//! class and type; the typed body travels as an opaque payload the
//! translator produced and the application downcasts.

use crate::node::{LocalNode, RemoteNode, Session};
use crate::proto::{MsgClass, MsgType, SeqNbr};
use std::any::Any;
use std::sync::Arc;

/// Typed message body produced by the translator.
///
/// Applications (and translators) downcast via [`AppMsgReq::body`] /
/// [`AppMsgRsp::body`].
pub type Payload = Box<dyn Any + Send>;

/// Either side of the application message union.
pub enum AppMsg {
    Req(AppMsgReq),
    Rsp(AppMsgRsp),
}

impl AppMsg {
    pub fn is_req(&self) -> bool {
        matches!(self, AppMsg::Req(_))
    }

    pub fn msg_type(&self) -> MsgType {
        match self {
            AppMsg::Req(m) => m.msg_type(),
            AppMsg::Rsp(m) => m.msg_type(),
        }
    }

    pub fn seq_nbr(&self) -> SeqNbr {
        match self {
            AppMsg::Req(m) => m.seq_nbr(),
            AppMsg::Rsp(m) => m.seq_nbr(),
        }
    }
}

/// A request message, outbound (application-built) or inbound (decoded).
///
/// Outbound requests allocate their sequence number at construction from the
/// owning local node; the number is echoed back to the application on
/// response, timeout, and every error path, so the request can always be
/// correlated.
pub struct AppMsgReq {
    ln: Arc<LocalNode>,
    rn: Arc<RemoteNode>,
    session: Option<Arc<Session>>,
    msg_type: MsgType,
    msg_class: MsgClass,
    seq_nbr: SeqNbr,
    payload: Payload,
}

impl AppMsgReq {
    /// Build a node-class request; allocates a sequence number from `ln`.
    pub fn node(
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        msg_type: MsgType,
        payload: Payload,
    ) -> Self {
        Self {
            ln: Arc::clone(ln),
            rn: Arc::clone(rn),
            session: None,
            msg_type,
            msg_class: MsgClass::Node,
            seq_nbr: ln.alloc_seq_nbr(),
            payload,
        }
    }

    /// Build a session-class request for `session`.
    ///
    /// Fails with `InvalidState` when the session's nodes are already gone.
    pub fn for_session(
        session: &Arc<Session>,
        msg_type: MsgType,
        payload: Payload,
    ) -> crate::Result<Self> {
        let ln = session.local_node().ok_or_else(|| {
            crate::Error::InvalidState("session's local node is gone".into())
        })?;
        let rn = session.remote_node().ok_or(crate::Error::RemoteNodeGone)?;
        let seq_nbr = ln.alloc_seq_nbr();
        Ok(Self {
            ln,
            rn,
            session: Some(Arc::clone(session)),
            msg_type,
            msg_class: MsgClass::Session,
            seq_nbr,
            payload,
        })
    }

    /// Carrier for a decoded inbound request (stack internal).
    pub(crate) fn from_inbound(
        ln: Arc<LocalNode>,
        rn: Arc<RemoteNode>,
        session: Option<Arc<Session>>,
        msg_type: MsgType,
        msg_class: MsgClass,
        seq_nbr: SeqNbr,
        payload: Payload,
    ) -> Self {
        Self { ln, rn, session, msg_type, msg_class, seq_nbr, payload }
    }

    pub fn local_node(&self) -> &Arc<LocalNode> {
        &self.ln
    }

    pub fn remote_node(&self) -> &Arc<RemoteNode> {
        &self.rn
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn msg_class(&self) -> MsgClass {
        self.msg_class
    }

    pub fn seq_nbr(&self) -> SeqNbr {
        self.seq_nbr
    }

    /// The typed body, when it is a `T`.
    pub fn body<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Consume the carrier and take the typed body.
    pub fn into_body<T: 'static>(self) -> Option<Box<T>> {
        self.payload.downcast::<T>().ok()
    }
}

/// A response message, outbound (answering a received request) or inbound
/// (decoded, carrying the original outbound request it answers).
pub struct AppMsgRsp {
    req: Box<AppMsgReq>,
    msg_type: MsgType,
    msg_class: MsgClass,
    seq_nbr: SeqNbr,
    payload: Payload,
}

impl AppMsgRsp {
    /// Build a response answering `req`; the sequence number is inherited.
    pub fn new(req: AppMsgReq, msg_type: MsgType, payload: Payload) -> Self {
        let msg_class = req.msg_class();
        let seq_nbr = req.seq_nbr();
        Self { req: Box::new(req), msg_type, msg_class, seq_nbr, payload }
    }

    /// The request this response answers.
    pub fn req(&self) -> &AppMsgReq {
        &self.req
    }

    /// Consume the carrier and recover the original request.
    pub fn into_req(self) -> AppMsgReq {
        *self.req
    }

    pub fn local_node(&self) -> &Arc<LocalNode> {
        self.req.local_node()
    }

    pub fn remote_node(&self) -> &Arc<RemoteNode> {
        self.req.remote_node()
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.req.session()
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn msg_class(&self) -> MsgClass {
        self.msg_class
    }

    pub fn seq_nbr(&self) -> SeqNbr {
        self.seq_nbr
    }

    pub fn body<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn into_body<T: 'static>(self) -> Option<Box<T>> {
        self.payload.downcast::<T>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::node_pair_fixture;
    use crate::proto;

    #[test]
    fn test_node_req_allocates_increasing_seq() {
        let fix = node_pair_fixture();
        let a = AppMsgReq::node(&fix.ln, &fix.rn, proto::ASSOCIATION_SETUP_REQ, Box::new(()));
        let b = AppMsgReq::node(&fix.ln, &fix.rn, proto::ASSOCIATION_SETUP_REQ, Box::new(()));
        assert_eq!(a.msg_class(), MsgClass::Node);
        assert!(b.seq_nbr() > a.seq_nbr());
    }

    #[test]
    fn test_session_req_tags_session_class() {
        let fix = node_pair_fixture();
        let session = fix.ln.create_session(&fix.rn).expect("session should be created");
        let req = AppMsgReq::for_session(&session, proto::SESSION_MODIFICATION_REQ, Box::new(42u32))
            .expect("session request should build");
        assert_eq!(req.msg_class(), MsgClass::Session);
        assert!(req.session().is_some());
        assert_eq!(req.body::<u32>(), Some(&42));
    }

    #[test]
    fn test_rsp_inherits_seq_nbr() {
        let fix = node_pair_fixture();
        let req = AppMsgReq::node(&fix.ln, &fix.rn, proto::NODE_REPORT_REQ, Box::new(()));
        let seq = req.seq_nbr();
        let rsp = AppMsgRsp::new(req, proto::NODE_REPORT_RSP, Box::new("ok"));
        assert_eq!(rsp.seq_nbr(), seq);
        assert_eq!(rsp.req().msg_type(), proto::NODE_REPORT_REQ);
    }

    #[test]
    fn test_body_downcast_mismatch_is_none() {
        let fix = node_pair_fixture();
        let req = AppMsgReq::node(&fix.ln, &fix.rn, proto::NODE_REPORT_REQ, Box::new(7u8));
        assert!(req.body::<String>().is_none());
        assert_eq!(req.into_body::<u8>().as_deref(), Some(&7));
    }
}

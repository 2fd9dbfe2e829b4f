// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the end-to-end tests: a minimal fixed-layout
//! translator, a recording application worker, and a scripted plain-UDP
//! peer driven from the test body.

#![allow(dead_code)]

use crossbeam::channel::{unbounded, Receiver, Sender};
use pfcp::proto::{self, Header};
use pfcp::{
    AppMsgReq, AppMsgRsp, ApplicationWorker, Config, DecodedReq, DecodedRsp, Error, LocalNode,
    LocalNodeState, MsgInfo, RemoteNode, RemoteNodeState, ReqIn, RspIn, Result, Stack,
    StackHandle, Translator,
};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Opaque message body used by the test translator for generic messages.
pub struct TestBody(pub Vec<u8>);

/// Body of an establishment exchange: the sender's FSEID plus free bytes.
pub struct EstBody {
    pub fseid: u64,
    pub extra: Vec<u8>,
}

pub fn ts_secs(ts: SystemTime) -> u64 {
    ts.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

pub fn secs_ts(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Fixed-layout test codec.
///
/// Wire format is the real PFCP common header followed by:
/// - heartbeat / association setup: 8-octet recovery timestamp (seconds)
/// - session establishment request: 8-octet FSEID + free bytes
/// - session establishment response: 1-octet cause (1 = accepted) +
///   8-octet FSEID + free bytes
/// - everything else: free bytes
///
/// A body starting with `BAD!` fails decoding, for the error-path tests.
pub struct TestTranslator;

const BAD_MAGIC: &[u8] = b"BAD!";

impl TestTranslator {
    fn body_of(data: &[u8]) -> Result<(Header, &[u8])> {
        let (hdr, off) = Header::parse(data)?;
        Ok((hdr, &data[off..]))
    }

    fn recovery_body(ts: SystemTime) -> Vec<u8> {
        ts_secs(ts).to_be_bytes().to_vec()
    }

    fn parse_recovery(body: &[u8], what: &str) -> Result<SystemTime> {
        if body.len() < 8 {
            return Err(Error::DecodeReq(format!("{} recovery timestamp missing", what)));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&body[..8]);
        Ok(secs_ts(u64::from_be_bytes(raw)))
    }
}

impl Translator for TestTranslator {
    fn get_msg_info(&self, data: &[u8]) -> Result<MsgInfo> {
        let (hdr, _) = Header::parse(data)?;
        Ok(MsgInfo {
            version: hdr.version,
            is_req: proto::is_req_type(hdr.msg_type),
            msg_class: proto::msg_class_of(hdr.msg_type),
            msg_type: hdr.msg_type,
            seq_nbr: hdr.seq_nbr,
            seid: hdr.seid.unwrap_or(0),
        })
    }

    fn is_version_supported(&self, version: u8) -> bool {
        version == proto::VERSION
    }

    fn encode_req(&self, req: &AppMsgReq) -> Result<Vec<u8>> {
        if req.msg_type() == proto::SESSION_ESTABLISHMENT_REQ {
            let session = req
                .session()
                .ok_or_else(|| Error::EncodeReq("establishment without session".into()))?;
            let extra = req.body::<TestBody>().map(|b| b.0.clone()).unwrap_or_default();
            let mut body = session.local_seid().to_be_bytes().to_vec();
            body.extend_from_slice(&extra);
            return Ok(Header::session(req.msg_type(), 0, req.seq_nbr()).encode(&body));
        }

        let body = req
            .body::<TestBody>()
            .ok_or_else(|| Error::EncodeReq("unexpected request body type".into()))?;
        match req.msg_class() {
            proto::MsgClass::Session => {
                let seid = req.session().map_or(0, |s| s.remote_seid());
                Ok(Header::session(req.msg_type(), seid, req.seq_nbr()).encode(&body.0))
            }
            _ => Ok(Header::node(req.msg_type(), req.seq_nbr()).encode(&body.0)),
        }
    }

    fn encode_rsp(&self, rsp: &AppMsgRsp) -> Result<Vec<u8>> {
        if rsp.msg_type() == proto::SESSION_ESTABLISHMENT_RSP {
            let session = rsp
                .session()
                .ok_or_else(|| Error::EncodeRsp("establishment without session".into()))?;
            let mut body = vec![1u8];
            body.extend_from_slice(&session.local_seid().to_be_bytes());
            let seid = session.remote_seid();
            return Ok(Header::session(rsp.msg_type(), seid, rsp.seq_nbr()).encode(&body));
        }

        let body = rsp
            .body::<TestBody>()
            .ok_or_else(|| Error::EncodeRsp("unexpected response body type".into()))?;
        match rsp.msg_class() {
            proto::MsgClass::Session => {
                let seid = rsp.session().map_or(0, |s| s.remote_seid());
                Ok(Header::session(rsp.msg_type(), seid, rsp.seq_nbr()).encode(&body.0))
            }
            _ => Ok(Header::node(rsp.msg_type(), rsp.seq_nbr()).encode(&body.0)),
        }
    }

    fn decode_req(&self, req: &ReqIn) -> Result<DecodedReq> {
        let (_, body) = Self::body_of(&req.data)?;
        if body.starts_with(BAD_MAGIC) {
            return Err(Error::DecodeReq("malformed IE body".into()));
        }

        if req.msg_type == proto::SESSION_ESTABLISHMENT_REQ {
            if body.len() < 8 {
                // the stack reports the missing-FSEID error itself
                return Ok(DecodedReq {
                    payload: Box::new(TestBody(body.to_vec())),
                    remote_seid: None,
                    remote_start_time: None,
                });
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&body[..8]);
            return Ok(DecodedReq {
                payload: Box::new(EstBody {
                    fseid: u64::from_be_bytes(raw),
                    extra: body[8..].to_vec(),
                }),
                remote_seid: Some(u64::from_be_bytes(raw)),
                remote_start_time: None,
            });
        }

        let remote_start_time = if req.msg_type == proto::ASSOCIATION_SETUP_REQ {
            Some(Self::parse_recovery(body, "association setup")?)
        } else {
            None
        };

        Ok(DecodedReq {
            payload: Box::new(TestBody(body.to_vec())),
            remote_seid: None,
            remote_start_time,
        })
    }

    fn decode_rsp(&self, rsp: &RspIn) -> Result<DecodedRsp> {
        let (_, body) = Self::body_of(&rsp.data)?;
        if body.starts_with(BAD_MAGIC) {
            return Err(Error::DecodeRsp("malformed IE body".into()));
        }

        if rsp.msg_type == proto::SESSION_ESTABLISHMENT_RSP {
            if body.len() < 9 {
                return Err(Error::DecodeRsp("establishment response truncated".into()));
            }
            let cause = body[0];
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&body[1..9]);
            let fseid = u64::from_be_bytes(raw);
            return Ok(DecodedRsp {
                payload: Box::new(EstBody { fseid, extra: body[9..].to_vec() }),
                remote_seid: (cause == 1).then_some(fseid),
                remote_start_time: None,
            });
        }

        let remote_start_time = if rsp.msg_type == proto::ASSOCIATION_SETUP_RSP {
            Some(Self::parse_recovery(body, "association setup")?)
        } else {
            None
        };

        Ok(DecodedRsp {
            payload: Box::new(TestBody(body.to_vec())),
            remote_seid: None,
            remote_start_time,
        })
    }

    fn encode_heartbeat_req(
        &self,
        ln: &Arc<LocalNode>,
        _rn: &Arc<RemoteNode>,
        seq_nbr: u32,
    ) -> Result<Vec<u8>> {
        Ok(Header::node(proto::HEARTBEAT_REQ, seq_nbr)
            .encode(&Self::recovery_body(ln.start_time())))
    }

    fn encode_heartbeat_rsp(
        &self,
        ln: &Arc<LocalNode>,
        _rn: &Arc<RemoteNode>,
        seq_nbr: u32,
    ) -> Result<Vec<u8>> {
        Ok(Header::node(proto::HEARTBEAT_RSP, seq_nbr)
            .encode(&Self::recovery_body(ln.start_time())))
    }

    fn decode_heartbeat_req(&self, req: &ReqIn) -> Result<SystemTime> {
        let (_, body) = Self::body_of(&req.data)?;
        Self::parse_recovery(body, "heartbeat request")
    }

    fn decode_heartbeat_rsp(&self, rsp: &RspIn) -> Result<SystemTime> {
        let (_, body) = Self::body_of(&rsp.data)?;
        Self::parse_recovery(body, "heartbeat response")
    }

    fn encode_version_not_supported_rsp(&self, info: &MsgInfo) -> Result<Vec<u8>> {
        Ok(Header::node(proto::VERSION_NOT_SUPPORTED_RSP, info.seq_nbr).encode(&[]))
    }
}

// ===========================================================================
// Recording worker
// ===========================================================================

/// Everything the application stage delivered, forwarded to the test body.
pub enum Seen {
    Req(AppMsgReq),
    Rsp(AppMsgRsp),
    Timeout(AppMsgReq),
    LocalState(Arc<LocalNode>, LocalNodeState, LocalNodeState),
    RemoteState(Arc<RemoteNode>, RemoteNodeState, RemoteNodeState),
    Restart(Arc<RemoteNode>, SystemTime),
    SndReqError(Error),
    SndRspError(Error),
    EncodeReqError(Error),
    EncodeRspError(Error),
}

pub struct RecordingWorker {
    tx: Sender<Seen>,
}

impl ApplicationWorker for RecordingWorker {
    fn on_rcvd_req(&mut self, req: AppMsgReq) {
        let _ = self.tx.send(Seen::Req(req));
    }

    fn on_rcvd_rsp(&mut self, rsp: AppMsgRsp) {
        let _ = self.tx.send(Seen::Rsp(rsp));
    }

    fn on_req_timeout(&mut self, req: AppMsgReq) {
        let _ = self.tx.send(Seen::Timeout(req));
    }

    fn on_local_node_state_change(
        &mut self,
        ln: Arc<LocalNode>,
        old: LocalNodeState,
        new: LocalNodeState,
    ) {
        let _ = self.tx.send(Seen::LocalState(ln, old, new));
    }

    fn on_remote_node_state_change(
        &mut self,
        rn: Arc<RemoteNode>,
        old: RemoteNodeState,
        new: RemoteNodeState,
    ) {
        let _ = self.tx.send(Seen::RemoteState(rn, old, new));
    }

    fn on_remote_node_restart(&mut self, rn: Arc<RemoteNode>, restart_time: SystemTime) {
        let _ = self.tx.send(Seen::Restart(rn, restart_time));
    }

    fn on_snd_req_error(&mut self, _req: AppMsgReq, err: Error) {
        let _ = self.tx.send(Seen::SndReqError(err));
    }

    fn on_snd_rsp_error(&mut self, _rsp: AppMsgRsp, err: Error) {
        let _ = self.tx.send(Seen::SndRspError(err));
    }

    fn on_encode_req_error(&mut self, _req: AppMsgReq, err: Error) {
        let _ = self.tx.send(Seen::EncodeReqError(err));
    }

    fn on_encode_rsp_error(&mut self, _rsp: AppMsgRsp, err: Error) {
        let _ = self.tx.send(Seen::EncodeRspError(err));
    }
}

// ===========================================================================
// Harness
// ===========================================================================

pub struct Harness {
    pub stack: Stack,
    pub handle: StackHandle,
    pub seen: Receiver<Seen>,
}

/// Start a stack with the recording worker and the test translator.
pub fn start_stack(cfg: Config) -> Harness {
    let (tx, seen) = unbounded();
    let stack = Stack::start(cfg, Arc::new(TestTranslator), move |_| RecordingWorker {
        tx: tx.clone(),
    })
    .expect("stack should start");
    let handle = stack.handle();
    Harness { stack, handle, seen }
}

impl Harness {
    /// Create a local node on an ephemeral loopback port and wait for it to
    /// reach `Started`.
    pub fn local_node(&self) -> Arc<LocalNode> {
        let ln = self
            .handle
            .create_local_node("127.0.0.1:0".parse().unwrap())
            .expect("local node should bind");
        self.wait_for(Duration::from_secs(2), |seen| {
            matches!(seen, Seen::LocalState(_, _, LocalNodeState::Started))
        })
        .expect("local node should start");
        ln
    }

    /// Wait until `pred` matches one delivered event; other events are
    /// dropped. `None` on timeout.
    pub fn wait_for<F>(&self, timeout: Duration, mut pred: F) -> Option<Seen>
    where
        F: FnMut(&Seen) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.seen.recv_timeout(left) {
                Ok(seen) if pred(&seen) => return Some(seen),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Assert that nothing matching `pred` arrives within `window`.
    pub fn assert_quiet<F>(&self, window: Duration, mut pred: F)
    where
        F: FnMut(&Seen) -> bool,
    {
        let deadline = Instant::now() + window;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return;
            }
            if let Ok(seen) = self.seen.recv_timeout(left) {
                assert!(!pred(&seen), "unexpected event inside the quiet window");
            }
        }
    }
}

// ===========================================================================
// Scripted peer
// ===========================================================================

/// A plain UDP socket playing the remote PFCP function.
pub struct Peer {
    pub socket: UdpSocket,
}

impl Peer {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("peer should bind");
        socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("peer read timeout");
        Self { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("peer local addr")
    }

    /// Receive one PFCP message within `timeout`.
    pub fn recv(&self, timeout: Duration) -> Option<(Header, Vec<u8>, SocketAddr)> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 2048];
        loop {
            if Instant::now() >= deadline {
                return None;
            }
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    let (hdr, off) =
                        Header::parse(&buf[..len]).expect("peer received well-formed PFCP");
                    return Some((hdr, buf[off..len].to_vec(), from));
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => panic!("peer recv failed: {}", e),
            }
        }
    }

    /// Count datagrams arriving within `window` (for retransmit checks).
    pub fn drain(&self, window: Duration) -> Vec<(Header, Vec<u8>)> {
        let deadline = Instant::now() + window;
        let mut out = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            if left.is_zero() {
                break;
            }
            if let Some((hdr, body, _)) = self.recv(left) {
                out.push((hdr, body));
            }
        }
        out
    }

    pub fn send(&self, target: SocketAddr, data: &[u8]) {
        self.socket.send_to(data, target).expect("peer send");
    }

    pub fn send_heartbeat_req(&self, target: SocketAddr, seq: u32, recovery: SystemTime) {
        let wire = Header::node(proto::HEARTBEAT_REQ, seq).encode(&ts_secs(recovery).to_be_bytes());
        self.send(target, &wire);
    }

    pub fn send_heartbeat_rsp(&self, target: SocketAddr, seq: u32, recovery: SystemTime) {
        let wire = Header::node(proto::HEARTBEAT_RSP, seq).encode(&ts_secs(recovery).to_be_bytes());
        self.send(target, &wire);
    }

    pub fn send_establishment_req(&self, target: SocketAddr, seq: u32, fseid: u64) {
        let wire =
            Header::session(proto::SESSION_ESTABLISHMENT_REQ, 0, seq).encode(&fseid.to_be_bytes());
        self.send(target, &wire);
    }

    pub fn send_establishment_rsp(
        &self,
        target: SocketAddr,
        seq: u32,
        seid: u64,
        cause: u8,
        fseid: u64,
    ) {
        let mut body = vec![cause];
        body.extend_from_slice(&fseid.to_be_bytes());
        let wire = Header::session(proto::SESSION_ESTABLISHMENT_RSP, seid, seq).encode(&body);
        self.send(target, &wire);
    }
}

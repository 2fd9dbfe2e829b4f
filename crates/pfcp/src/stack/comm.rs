// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Communication stage.
//!
//! A single thread owns every local node's UDP socket through one mio
//! `Poll`, a `Waker`-backed command queue, and the two stack clocks (the
//! activity-window rotation and the response-window flip). It enforces the
//! request retransmission state machine, duplicate suppression, heartbeat
//! synthesis, and peer failure/restart detection.
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Communication thread                    |
//! |  +--------------------------------------------------------+  |
//! |  |                       mio::Poll                        |  |
//! |  |  - one UDP socket per local node (READABLE)            |  |
//! |  |  - Waker (command queue from the other stages)         |  |
//! |  +--------------------------------------------------------+  |
//! |        |                  |                    |             |
//! |        v                  v                    v             |
//! |  inbound datagrams   CommEvent queue    activity / response  |
//! |  (header inspect,    (send, timers,     window clocks        |
//! |   dup suppression)    sessions)         (heartbeats, GC)     |
//! +--------------------------------------------------------------+
//! ```

use crate::config::MAX_DATAGRAM_SIZE;
use crate::node::{IpKey, LocalNode, LocalNodeState, RemoteNode, RemoteNodeState};
use crate::proto;
use crate::stack::events::{AppEvent, CommEvent, TranslationEvent};
use crate::stack::internal::{ReqIn, ReqOut, RspIn, RspOut};
use crate::stack::Runtime;
use crate::translator::{MsgInfo, Translator};
use crossbeam::channel::Receiver;
use mio::{Events, Poll, Token};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Poll token reserved for the command-queue waker.
pub(crate) const WAKER_TOKEN: Token = Token(0);

const FIRST_NODE_TOKEN: usize = 1;
const MAX_POLL_EVENTS: usize = 128;

pub(crate) struct CommStage {
    rt: Arc<Runtime>,
    translator: Arc<dyn Translator>,
    poll: Poll,
    rx: Receiver<CommEvent>,
    tokens: HashMap<Token, Arc<LocalNode>>,
    next_token: usize,
    next_activity: Instant,
    next_rsp_flip: Instant,
    buf: Vec<u8>,
}

impl CommStage {
    pub(crate) fn spawn(
        rt: Arc<Runtime>,
        translator: Arc<dyn Translator>,
        poll: Poll,
        rx: Receiver<CommEvent>,
    ) -> JoinHandle<()> {
        let now = Instant::now();
        let stage = Self {
            next_activity: now + rt.cfg.len_activity_wnd(),
            next_rsp_flip: now + rt.cfg.max_rsp_wait(),
            rt,
            translator,
            poll,
            rx,
            tokens: HashMap::new(),
            next_token: FIRST_NODE_TOKEN,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        };
        std::thread::Builder::new()
            .name("pfcp-comm".into())
            .spawn(move || stage.run())
            .expect("communication thread should spawn")
    }

    fn run(mut self) {
        log::info!("[COMM] the communication stage has been started");
        let mut events = Events::with_capacity(MAX_POLL_EVENTS);

        loop {
            let timeout = self
                .next_activity
                .min(self.next_rsp_flip)
                .saturating_duration_since(Instant::now());

            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[COMM] poll failed: {}", e);
                return;
            }

            for event in &events {
                if event.token() != WAKER_TOKEN {
                    self.on_readable(event.token());
                }
            }

            while let Ok(ev) = self.rx.try_recv() {
                if !self.handle_event(ev) {
                    log::info!("[COMM] the communication stage is exiting");
                    return;
                }
            }

            let now = Instant::now();
            if now >= self.next_activity {
                self.activity_tick();
                self.next_activity += self.rt.cfg.len_activity_wnd();
            }
            if now >= self.next_rsp_flip {
                self.rsp_wnd_tick();
                self.next_rsp_flip += self.rt.cfg.max_rsp_wait();
            }
        }
    }

    // =======================================================================
    // Command queue
    // =======================================================================

    fn handle_event(&mut self, ev: CommEvent) -> bool {
        match ev {
            CommEvent::SndReq(ro) => self.on_snd_req(ro),
            CommEvent::SndRsp(ro) => self.on_snd_rsp(ro),
            CommEvent::HeartbeatReq { ln, rn, seq_nbr, start_time } => {
                log::debug!("[COMM] heartbeat request from {} seqNbr={}", rn.ip_key(), seq_nbr);
                rn.observe_start_time(start_time);
                self.rt.send_to_translation(TranslationEvent::SndHeartbeatRsp {
                    ln,
                    rn,
                    seq_nbr,
                });
            }
            CommEvent::HeartbeatRsp { rn, seq_nbr, start_time } => {
                log::debug!("[COMM] heartbeat response from {} seqNbr={}", rn.ip_key(), seq_nbr);
                rn.observe_start_time(start_time);
            }
            CommEvent::SndHeartbeatReqError { rn, err } => {
                log::error!(
                    "[COMM] unable to construct heartbeat request for {} - {}",
                    rn.ip_key(),
                    err
                );
            }
            CommEvent::SndHeartbeatRspError { rn, err } => {
                log::error!(
                    "[COMM] unable to construct heartbeat response for {} - {}",
                    rn.ip_key(),
                    err
                );
            }
            CommEvent::RcvdReqError { req, err } => self.on_rcvd_req_error(&req, &err),
            CommEvent::RcvdRspError { rsp, err } => self.on_rcvd_rsp_error(&rsp, &err),
            CommEvent::ReqTimeout { ln, seq_nbr } => self.on_req_timeout(&ln, seq_nbr),
            CommEvent::AddSession(s) => {
                if s.local_seid() != 0 {
                    match s.local_node() {
                        Some(ln) => ln.add_session(&s),
                        None => log::warn!("[COMM] AddSession: local node is gone"),
                    }
                }
                if s.remote_seid() != 0 {
                    match s.remote_node() {
                        Some(rn) => rn.add_session(&s),
                        None => log::warn!("[COMM] AddSession: remote node is gone"),
                    }
                }
            }
            CommEvent::DelSession(s) => self.del_session(&s),
            CommEvent::DelNxtRmtSession(rn) => self.on_del_nxt_rmt_session(rn),
            CommEvent::AddLocalNode(ln) => self.add_local_node(ln),
            CommEvent::StopLocalNode(ln) => {
                self.rt.locals.write().remove(&ln.ip_key());
                self.release_local_node(&ln);
            }
            CommEvent::Shutdown => {
                self.release_local_nodes();
                return false;
            }
        }
        true
    }

    fn del_session(&self, s: &Arc<crate::node::Session>) {
        if let Some(ln) = s.local_node() {
            ln.del_session(s);
        }
        if let Some(rn) = s.remote_node() {
            rn.del_session(s);
        }
    }

    fn on_del_nxt_rmt_session(&self, rn: Arc<RemoteNode>) {
        match rn.first_session() {
            Some(s) => {
                self.del_session(&s);
                self.rt.comm.send(CommEvent::DelNxtRmtSession(rn));
            }
            None => {
                if rn.state() == RemoteNodeState::Stopping {
                    rn.change_state(RemoteNodeState::Stopped);
                }
            }
        }
    }

    // =======================================================================
    // Local node lifecycle
    // =======================================================================

    fn add_local_node(&mut self, ln: Arc<LocalNode>) {
        let token = Token(self.next_token);
        if let Err(e) = ln.socket().register(self.poll.registry(), token) {
            log::error!("[COMM] failed to register socket for {}: {}", ln.addr(), e);
            return;
        }
        self.next_token += 1;
        self.tokens.insert(token, Arc::clone(&ln));
        self.rt.locals.write().insert(ln.ip_key(), Arc::clone(&ln));
        ln.change_state(LocalNodeState::Started);
        log::info!("[COMM] local node {} started", ln.addr());
    }

    fn release_local_node(&mut self, ln: &Arc<LocalNode>) {
        ln.change_state(LocalNodeState::Stopping);

        for ro in ln.clear_req_outs() {
            if ro.timer_id != 0 {
                self.rt.timers.unregister(ro.timer_id);
            }
        }
        ln.release_remotes();

        let token = self
            .tokens
            .iter()
            .find(|(_, node)| Arc::ptr_eq(node, ln))
            .map(|(&token, _)| token);
        if let Some(token) = token {
            self.tokens.remove(&token);
            if let Err(e) = ln.socket().deregister(self.poll.registry()) {
                log::warn!("[COMM] failed to deregister socket for {}: {}", ln.addr(), e);
            }
        }

        ln.change_state(LocalNodeState::Stopped);
        log::info!("[COMM] local node {} stopped", ln.addr());
    }

    fn release_local_nodes(&mut self) {
        let locals: Vec<Arc<LocalNode>> =
            self.rt.locals.write().drain().map(|(_, ln)| ln).collect();
        for ln in locals {
            self.release_local_node(&ln);
        }
    }

    // =======================================================================
    // Inbound datagrams
    // =======================================================================

    fn on_readable(&mut self, token: Token) {
        let Some(ln) = self.tokens.get(&token).cloned() else {
            return;
        };

        loop {
            match ln.socket().recv_from(&mut self.buf) {
                Ok((len, src)) => {
                    let data = std::mem::take(&mut self.buf);
                    self.handle_datagram(&ln, src, &data[..len]);
                    self.buf = data;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("[COMM] recv on {} failed: {}", ln.addr(), e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&self, ln: &Arc<LocalNode>, src: SocketAddr, data: &[u8]) {
        let info = match self.translator.get_msg_info(data) {
            Ok(info) => info,
            Err(e) => {
                log::debug!(
                    "[COMM] discarding malformed datagram local={} remote={} len={} - {}",
                    ln.ip_key(),
                    src,
                    data.len(),
                    e
                );
                return;
            }
        };

        // resolve the peer, creating it on the fly for unknown senders
        let key = IpKey::from(src);
        let rn = match ln.find_remote(&key) {
            Some(rn) => {
                if rn.state() != RemoteNodeState::Started {
                    rn.change_state(RemoteNodeState::Started);
                }
                rn
            }
            None => match ln.create_remote_node(src.ip(), self.rt.cfg.port) {
                Ok(rn) => rn,
                Err(e) => {
                    log::warn!(
                        "[COMM] unable to create remote node, discarding msg local={} remote={} \
                         msgType={} seqNbr={} - {}",
                        ln.ip_key(),
                        key,
                        info.msg_type,
                        info.seq_nbr,
                        e
                    );
                    return;
                }
            },
        };

        rn.increment_activity();
        rn.stats().inc_received(info.msg_type);

        if !self.translator.is_version_supported(info.version) {
            log::debug!(
                "[COMM] unsupported version {} from {}, answering Version Not Supported",
                info.version,
                rn.ip_key()
            );
            match self.translator.encode_version_not_supported_rsp(&info) {
                Ok(bytes) => {
                    if let Err(e) = ln.send_to(&bytes, rn.addr()) {
                        log::warn!("[COMM] failed to send Version Not Supported: {}", e);
                    } else {
                        rn.stats().inc_sent(proto::VERSION_NOT_SUPPORTED_RSP, 0);
                    }
                }
                Err(e) => {
                    log::error!("[COMM] unable to encode Version Not Supported - {}", e);
                }
            }
            return;
        }

        if info.is_req {
            self.handle_rcvd_req(ln, &rn, &info, data);
        } else {
            self.handle_rcvd_rsp(ln, &rn, &info, data);
        }
    }

    fn handle_rcvd_req(
        &self,
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        info: &MsgInfo,
        data: &[u8],
    ) {
        if rn.rcvd_req_exists(info.seq_nbr) {
            log::debug!(
                "[COMM] discarding duplicate req local={} remote={} msgType={} msgClass={} \
                 seqNbr={}",
                ln.ip_key(),
                rn.ip_key(),
                info.msg_type,
                info.msg_class.tag(),
                info.seq_nbr
            );
            return;
        }

        let mut session = None;
        if info.msg_class == proto::MsgClass::Session {
            if info.msg_type == self.rt.types.session_establishment_req {
                match ln.create_session(rn) {
                    Ok(s) => session = Some(s),
                    Err(e) => {
                        log::warn!(
                            "[COMM] unable to create the session, discarding the message \
                             local={} remote={} seid={} msgType={} seqNbr={} - {}",
                            ln.ip_key(),
                            rn.ip_key(),
                            info.seid,
                            info.msg_type,
                            info.seq_nbr,
                            e
                        );
                        return;
                    }
                }
            } else {
                match ln.get_session(info.seid) {
                    Some(s) => session = Some(s),
                    None => {
                        log::debug!(
                            "[COMM] session not found, discarding the message local={} \
                             remote={} seid={} msgType={} seqNbr={}",
                            ln.ip_key(),
                            rn.ip_key(),
                            info.seid,
                            info.msg_type,
                            info.seq_nbr
                        );
                        return;
                    }
                }
            }
        }

        if !rn.add_rcvd_req(info.seq_nbr, self.rt.cur_rsp_wnd()) {
            log::debug!(
                "[COMM] unable to insert RcvdReq, discarding req local={} remote={} seqNbr={}",
                ln.ip_key(),
                rn.ip_key(),
                info.seq_nbr
            );
            return;
        }

        self.rt
            .send_to_translation(TranslationEvent::RcvdReq(ReqIn::new(ln, rn, session, info, data)));
    }

    fn handle_rcvd_rsp(
        &self,
        ln: &Arc<LocalNode>,
        rn: &Arc<RemoteNode>,
        info: &MsgInfo,
        data: &[u8],
    ) {
        let mut table = ln.req_out_table();
        match table.get_mut(&info.seq_nbr) {
            Some(ro) if !ro.completed => {
                ro.rsp_wnd = self.rt.cur_rsp_wnd();
                ro.completed = true;
                if ro.timer_id != 0 {
                    self.rt.timers.unregister(ro.timer_id);
                    ro.timer_id = 0;
                }
                let req = ro.app_msg.take();
                drop(table);
                self.rt
                    .send_to_translation(TranslationEvent::RcvdRsp(RspIn::new(ln, rn, info, data, req)));
            }
            Some(_) => {
                log::debug!(
                    "[COMM] discarding duplicate rsp local={} remote={} msgType={} seqNbr={}",
                    ln.ip_key(),
                    rn.ip_key(),
                    info.msg_type,
                    info.seq_nbr
                );
            }
            None => {
                log::info!(
                    "[COMM] corresponding ReqOut entry not found, discarding rsp local={} \
                     remote={} msgType={} msgClass={} seqNbr={}",
                    ln.ip_key(),
                    rn.ip_key(),
                    info.msg_type,
                    info.msg_class.tag(),
                    info.seq_nbr
                );
            }
        }
    }

    // =======================================================================
    // Outbound requests
    // =======================================================================

    fn on_snd_req(&self, mut ro: ReqOut) {
        let ln = Arc::clone(&ro.ln);
        let mut table = ln.req_out_table();

        if table.contains_key(&ro.seq_nbr) {
            log::error!(
                "[COMM] seqNbr {} already exists in the retransmission collection local={} \
                 remote={} msgType={}",
                ro.seq_nbr,
                ro.ln.ip_key(),
                ro.rn.ip_key(),
                ro.msg_type
            );
            drop(table);
            let seq_nbr = ro.seq_nbr;
            if let Some(req) = ro.app_msg.take() {
                self.rt.send_to_app(AppEvent::SndReqError {
                    req,
                    err: crate::Error::DuplicateSeqNbr(seq_nbr),
                });
            }
            return;
        }

        if self.snd_req(&mut ro) {
            table.insert(ro.seq_nbr, ro);
        }
    }

    /// Send-with-retry: claim an attempt and transmit, or handle exhaustion.
    ///
    /// Returns true while the entry should stay in (or enter) the table.
    fn snd_req(&self, ro: &mut ReqOut) -> bool {
        let is_heartbeat = ro.msg_type == self.rt.types.heartbeat_req;

        if ro.ok_to_snd() {
            if let Err(e) = ro.ln.send_to(&ro.data, ro.rn.addr()) {
                // transmission may still succeed on a later attempt
                log::warn!("[COMM] send failed, keeping T1 armed - {}", e);
            }

            let initial = if is_heartbeat { self.rt.cfg.heartbeat_n1 } else { self.rt.cfg.n1 };
            let attempt = initial.saturating_sub(ro.n1 + 1) as usize;
            ro.rn.stats().inc_sent(ro.msg_type, attempt);

            ro.timer_id = self.rt.timers.register(
                ro.t1,
                CommEvent::ReqTimeout { ln: Arc::clone(&ro.ln), seq_nbr: ro.seq_nbr },
            );
            return true;
        }

        if is_heartbeat {
            log::error!(
                "[COMM] remote node is non-responsive local={} remote={}",
                ro.ln.ip_key(),
                ro.rn.ip_key()
            );
            ro.rn.change_state(RemoteNodeState::Failed);
            ro.app_msg = None;
        } else if let Some(req) = ro.app_msg.take() {
            self.rt.send_to_app(AppEvent::ReqTimeout(req));
        }
        false
    }

    fn on_req_timeout(&self, ln: &Arc<LocalNode>, seq_nbr: u32) {
        let mut table = ln.req_out_table();
        match table.get_mut(&seq_nbr) {
            Some(ro) => {
                if self.snd_req(ro) {
                    return;
                }
                let ro = table.remove(&seq_nbr).expect("entry present under the lock");
                drop(table);
                ro.rn.stats().inc_timeout(ro.msg_type);
            }
            None => {
                // cancelled timer raced its own expiry
                log::debug!(
                    "[COMM] corresponding ReqOut entry not found, discarding timeout local={} \
                     seqNbr={}",
                    ln.ip_key(),
                    seq_nbr
                );
            }
        }
    }

    // =======================================================================
    // Outbound responses
    // =======================================================================

    fn on_snd_rsp(&self, mut ro: RspOut) {
        // the peer's request must still be known (the response-window GC may
        // have reaped it)
        if ro.rn.set_rcvd_req_rsp_wnd(ro.seq_nbr, self.rt.cur_rsp_wnd()) {
            if let Err(e) = ro.ln.send_to(&ro.data, ro.rn.addr()) {
                log::warn!("[COMM] rsp send failed local={} - {}", ro.ln.ip_key(), e);
            }
            ro.rn.stats().inc_sent(ro.msg_type, 0);
        } else if let Some(rsp) = ro.app_msg.take() {
            let seq_nbr = ro.seq_nbr;
            self.rt.send_to_app(AppEvent::SndRspError {
                rsp,
                err: crate::Error::RequestUnknown(seq_nbr),
            });
        } else {
            log::debug!(
                "[COMM] peer request {} gone, dropping synthesized rsp for {}",
                ro.seq_nbr,
                ro.rn.ip_key()
            );
        }
    }

    // =======================================================================
    // Decode-error events
    // =======================================================================

    fn on_rcvd_req_error(&self, req: &ReqIn, err: &crate::Error) {
        req.rn.del_rcvd_req(req.seq_nbr);
        // an establishment that failed decode leaves a half-made session
        if let Some(s) = &req.session {
            if s.remote_seid() == 0 {
                self.del_session(s);
            }
        }
        log::error!(
            "[COMM] unable to decode request message - {} - discarding req local={} remote={} \
             msgType={} msgClass={} seqNbr={} version={} msgLen={}",
            err,
            req.ln.ip_key(),
            req.rn.ip_key(),
            req.msg_type,
            req.msg_class.tag(),
            req.seq_nbr,
            req.version,
            req.data.len()
        );
    }

    fn on_rcvd_rsp_error(&self, rsp: &RspIn, err: &crate::Error) {
        if let Some(ro) = rsp.ln.req_out_table().remove(&rsp.seq_nbr) {
            if ro.timer_id != 0 {
                self.rt.timers.unregister(ro.timer_id);
            }
        }
        log::error!(
            "[COMM] unable to decode response message - {} - discarding rsp local={} remote={} \
             msgType={} msgClass={} seqNbr={} version={} msgLen={}",
            err,
            rsp.ln.ip_key(),
            rsp.rn.ip_key(),
            rsp.msg_type,
            rsp.msg_class.tag(),
            rsp.seq_nbr,
            rsp.version,
            rsp.data.len()
        );
    }

    // =======================================================================
    // Clocks
    // =======================================================================

    fn activity_tick(&mut self) {
        {
            let locals = self.rt.locals.read();
            for ln in locals.values() {
                ln.check_activity();
            }
        }

        let next = (self.rt.cur_activity_wnd() + 1) % self.rt.cfg.nbr_activity_wnds;
        self.rt.set_cur_activity_wnd(next);

        let locals = self.rt.locals.read();
        for ln in locals.values() {
            ln.next_activity_wnd(next);
        }
    }

    fn rsp_wnd_tick(&mut self) {
        let new = self.rt.flip_rsp_wnd();
        log::debug!("[COMM] response window flipped to {}", new);

        let locals = self.rt.locals.read();
        for ln in locals.values() {
            for ro in ln.remove_old_reqs(new) {
                if ro.timer_id != 0 {
                    self.rt.timers.unregister(ro.timer_id);
                }
            }
        }
    }
}

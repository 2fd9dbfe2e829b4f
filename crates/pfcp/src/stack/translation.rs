// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Translation stage.
//!
//! A single thread, stateless per message: outbound application messages are
//! encoded through the translator and forwarded to Communication; inbound
//! raw messages are decoded and forwarded to the application. Codec
//! failures never unwind - they are classified and forwarded as error
//! events (encode errors to the application, decode errors back to
//! Communication).

use crate::error::Error;
use crate::msg::{AppMsg, AppMsgReq, AppMsgRsp};
use crate::node::{LocalNode, RemoteNode};
use crate::proto::{MsgClass, SeqNbr};
use crate::stack::events::{AppEvent, CommEvent, TranslationEvent};
use crate::stack::internal::{ReqIn, ReqOut, RspIn, RspOut};
use crate::stack::Runtime;
use crate::translator::Translator;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) struct TranslationStage {
    rt: Arc<Runtime>,
    translator: Arc<dyn Translator>,
    rx: Receiver<TranslationEvent>,
}

impl TranslationStage {
    pub(crate) fn spawn(
        rt: Arc<Runtime>,
        translator: Arc<dyn Translator>,
        rx: Receiver<TranslationEvent>,
    ) -> JoinHandle<()> {
        let stage = Self { rt, translator, rx };
        std::thread::Builder::new()
            .name("pfcp-xlate".into())
            .spawn(move || stage.run())
            .expect("translation thread should spawn")
    }

    fn run(self) {
        log::info!("[XLATE] the translation stage has been started");
        while let Ok(ev) = self.rx.recv() {
            match ev {
                TranslationEvent::SndMsg(AppMsg::Req(req)) => self.on_snd_req(req),
                TranslationEvent::SndMsg(AppMsg::Rsp(rsp)) => self.on_snd_rsp(rsp),
                TranslationEvent::RcvdReq(ri) => self.on_rcvd_req(ri),
                TranslationEvent::RcvdRsp(ri) => self.on_rcvd_rsp(ri),
                TranslationEvent::SndHeartbeatReq { ln, rn } => {
                    self.on_snd_heartbeat_req(&ln, &rn);
                }
                TranslationEvent::SndHeartbeatRsp { ln, rn, seq_nbr } => {
                    self.on_snd_heartbeat_rsp(&ln, &rn, seq_nbr);
                }
                TranslationEvent::Shutdown => break,
            }
        }
        log::info!("[XLATE] the translation stage is exiting");
    }

    // =======================================================================
    // Outbound (encode) paths
    // =======================================================================

    fn on_snd_req(&self, req: AppMsgReq) {
        log::debug!(
            "[XLATE] sending request msgType={} msgClass={} seqNbr={}",
            req.msg_type(),
            req.msg_class().tag(),
            req.seq_nbr()
        );

        // a session-class request other than establishment needs the peer's
        // SEID before it can be addressed
        let establishment = req.msg_type() == self.rt.types.session_establishment_req;
        if req.msg_class() == MsgClass::Session && !establishment {
            let remote_seid = req.session().map_or(0, |s| s.remote_seid());
            if remote_seid == 0 {
                self.rt.send_to_app(AppEvent::EncodeReqError {
                    req,
                    err: Error::EncodeReq("invalid session remote SEID (0)".into()),
                });
                return;
            }
        }

        match self.translator.encode_req(&req) {
            Ok(data) => {
                let is_heartbeat = req.msg_type() == self.rt.types.heartbeat_req;
                let ro = self.req_out(req, data, is_heartbeat);
                self.rt.comm.send(CommEvent::SndReq(ro));
            }
            Err(err) => {
                self.rt.send_to_app(AppEvent::EncodeReqError { req, err });
            }
        }
    }

    fn on_snd_rsp(&self, rsp: AppMsgRsp) {
        log::debug!(
            "[XLATE] sending response msgType={} msgClass={} seqNbr={}",
            rsp.msg_type(),
            rsp.msg_class().tag(),
            rsp.seq_nbr()
        );

        match self.translator.encode_rsp(&rsp) {
            Ok(data) => {
                self.rt.comm.send(CommEvent::SndRsp(RspOut {
                    ln: Arc::clone(rsp.local_node()),
                    rn: Arc::clone(rsp.remote_node()),
                    msg_type: rsp.msg_type(),
                    msg_class: rsp.msg_class(),
                    seq_nbr: rsp.seq_nbr(),
                    data,
                    app_msg: Some(rsp),
                }));
            }
            Err(err) => {
                self.rt.send_to_app(AppEvent::EncodeRspError { rsp, err });
            }
        }
    }

    fn req_out(&self, req: AppMsgReq, data: Vec<u8>, is_heartbeat: bool) -> ReqOut {
        let (n1, t1) = if is_heartbeat {
            (self.rt.cfg.heartbeat_n1, self.rt.cfg.heartbeat_t1())
        } else {
            (self.rt.cfg.n1, self.rt.cfg.t1())
        };
        ReqOut {
            ln: Arc::clone(req.local_node()),
            rn: Arc::clone(req.remote_node()),
            msg_type: req.msg_type(),
            msg_class: req.msg_class(),
            seq_nbr: req.seq_nbr(),
            data,
            app_msg: Some(req),
            n1,
            t1,
            timer_id: 0,
            rsp_wnd: 0,
            completed: false,
        }
    }

    // =======================================================================
    // Inbound (decode) paths
    // =======================================================================

    fn on_rcvd_req(&self, ri: ReqIn) {
        if ri.msg_type == self.rt.types.heartbeat_req {
            match self.translator.decode_heartbeat_req(&ri) {
                Ok(start_time) => {
                    self.rt.comm.send(CommEvent::HeartbeatReq {
                        ln: Arc::clone(&ri.ln),
                        rn: Arc::clone(&ri.rn),
                        seq_nbr: ri.seq_nbr,
                        start_time,
                    });
                }
                Err(err) => self.rt.comm.send(CommEvent::RcvdReqError { req: ri, err }),
            }
            return;
        }

        log::debug!(
            "[XLATE] received request local={} remote={} msgType={} msgClass={} seqNbr={}",
            ri.ln.ip_key(),
            ri.rn.ip_key(),
            ri.msg_type,
            ri.msg_class.tag(),
            ri.seq_nbr
        );

        let decoded = match self.translator.decode_req(&ri) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.rt.comm.send(CommEvent::RcvdReqError { req: ri, err });
                return;
            }
        };

        if ri.msg_type == self.rt.types.session_establishment_req {
            let Some(remote_seid) = decoded.remote_seid else {
                self.rt.comm.send(CommEvent::RcvdReqError {
                    req: ri,
                    err: Error::DecodeReq("control plane FSEID is missing".into()),
                });
                return;
            };
            if let Some(session) = &ri.session {
                if let Err(e) = session.set_remote_seid(remote_seid) {
                    // a straggler re-establishment for a live session
                    log::warn!(
                        "[XLATE] remote SEID {} not recorded for session {:?} - {}",
                        remote_seid,
                        session,
                        e
                    );
                }
            }
        } else if ri.msg_type == self.rt.types.association_setup_req {
            if let Some(start_time) = decoded.remote_start_time {
                ri.rn.observe_start_time(start_time);
            }
        }

        let req = AppMsgReq::from_inbound(
            Arc::clone(&ri.ln),
            Arc::clone(&ri.rn),
            ri.session.clone(),
            ri.msg_type,
            ri.msg_class,
            ri.seq_nbr,
            decoded.payload,
        );
        self.rt.send_to_app(AppEvent::RcvdReq(req));
    }

    fn on_rcvd_rsp(&self, mut ri: RspIn) {
        if ri.msg_type == self.rt.types.heartbeat_rsp {
            match self.translator.decode_heartbeat_rsp(&ri) {
                Ok(start_time) => {
                    self.rt.comm.send(CommEvent::HeartbeatRsp {
                        rn: Arc::clone(&ri.rn),
                        seq_nbr: ri.seq_nbr,
                        start_time,
                    });
                }
                Err(err) => self.rt.comm.send(CommEvent::RcvdRspError { rsp: ri, err }),
            }
            return;
        }

        log::debug!(
            "[XLATE] received response local={} remote={} msgType={} msgClass={} seqNbr={}",
            ri.ln.ip_key(),
            ri.rn.ip_key(),
            ri.msg_type,
            ri.msg_class.tag(),
            ri.seq_nbr
        );

        let decoded = match self.translator.decode_rsp(&ri) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.rt.comm.send(CommEvent::RcvdRspError { rsp: ri, err });
                return;
            }
        };

        let Some(req) = ri.req.take() else {
            log::error!(
                "[XLATE] response without its originating request local={} remote={} \
                 msgType={} seqNbr={}",
                ri.ln.ip_key(),
                ri.rn.ip_key(),
                ri.msg_type,
                ri.seq_nbr
            );
            return;
        };

        if ri.msg_type == self.rt.types.session_establishment_rsp {
            if let (Some(remote_seid), Some(session)) = (decoded.remote_seid, req.session()) {
                if let Err(e) = session.set_remote_seid(remote_seid) {
                    log::warn!(
                        "[XLATE] remote SEID {} not recorded for session {:?} - {}",
                        remote_seid,
                        session,
                        e
                    );
                }
            }
        } else if ri.msg_type == self.rt.types.association_setup_rsp {
            if let Some(start_time) = decoded.remote_start_time {
                ri.rn.observe_start_time(start_time);
            }
        }

        let rsp = AppMsgRsp::new(req, ri.msg_type, decoded.payload);
        self.rt.send_to_app(AppEvent::RcvdRsp(rsp));
    }

    // =======================================================================
    // Heartbeat synthesis
    // =======================================================================

    fn on_snd_heartbeat_req(&self, ln: &Arc<LocalNode>, rn: &Arc<RemoteNode>) {
        let seq_nbr = ln.alloc_seq_nbr();
        log::debug!(
            "[XLATE] sending heartbeat request to {} seqNbr={}",
            rn.ip_key(),
            seq_nbr
        );
        match self.translator.encode_heartbeat_req(ln, rn, seq_nbr) {
            Ok(data) => {
                self.rt.comm.send(CommEvent::SndReq(ReqOut {
                    ln: Arc::clone(ln),
                    rn: Arc::clone(rn),
                    msg_type: self.rt.types.heartbeat_req,
                    msg_class: MsgClass::Node,
                    seq_nbr,
                    data,
                    app_msg: None,
                    n1: self.rt.cfg.heartbeat_n1,
                    t1: self.rt.cfg.heartbeat_t1(),
                    timer_id: 0,
                    rsp_wnd: 0,
                    completed: false,
                }));
            }
            Err(err) => {
                self.rt
                    .comm
                    .send(CommEvent::SndHeartbeatReqError { rn: Arc::clone(rn), err });
            }
        }
    }

    fn on_snd_heartbeat_rsp(&self, ln: &Arc<LocalNode>, rn: &Arc<RemoteNode>, seq_nbr: SeqNbr) {
        log::debug!(
            "[XLATE] sending heartbeat response to {} seqNbr={}",
            rn.ip_key(),
            seq_nbr
        );
        match self.translator.encode_heartbeat_rsp(ln, rn, seq_nbr) {
            Ok(data) => {
                self.rt.comm.send(CommEvent::SndRsp(RspOut {
                    ln: Arc::clone(ln),
                    rn: Arc::clone(rn),
                    msg_type: self.rt.types.heartbeat_rsp,
                    msg_class: MsgClass::Node,
                    seq_nbr,
                    data,
                    app_msg: None,
                }));
            }
            Err(err) => {
                self.rt
                    .comm
                    .send(CommEvent::SndHeartbeatRspError { rn: Arc::clone(rn), err });
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application stage: the user handler work group.
//!
//! A pool of worker threads (>= 1) drains one shared event queue. Each
//! worker is a user type implementing [`ApplicationWorker`]; every event is
//! handled exactly once, by whichever worker picks it up. Events for one
//! remote are enqueued FIFO, but with more than one worker the handler
//! *start* order is not guaranteed - handlers must tolerate reordering of
//! node-scope events.

use crate::error::Error;
use crate::msg::{AppMsgReq, AppMsgRsp};
use crate::node::{LocalNode, LocalNodeState, RemoteNode, RemoteNodeState};
use crate::stack::events::AppEvent;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

/// User-implemented event handlers.
///
/// Every handler has a default implementation that logs the event at debug
/// level, so applications override only what they care about.
#[allow(unused_variables)]
pub trait ApplicationWorker: Send + 'static {
    /// Called once when the worker thread starts.
    fn on_init(&mut self) {}

    /// Called once when the worker thread is about to exit.
    fn on_quit(&mut self) {}

    /// A PFCP request arrived from a peer.
    fn on_rcvd_req(&mut self, req: AppMsgReq) {
        log::debug!(
            "[APP] on_rcvd_req msgType={} msgClass={} seqNbr={}",
            req.msg_type(),
            req.msg_class().tag(),
            req.seq_nbr()
        );
    }

    /// A PFCP response arrived for a request this node sent.
    fn on_rcvd_rsp(&mut self, rsp: AppMsgRsp) {
        log::debug!(
            "[APP] on_rcvd_rsp msgType={} msgClass={} seqNbr={}",
            rsp.msg_type(),
            rsp.msg_class().tag(),
            rsp.seq_nbr()
        );
    }

    /// A request exhausted its retransmissions without a response.
    fn on_req_timeout(&mut self, req: AppMsgReq) {
        log::debug!(
            "[APP] on_req_timeout msgType={} msgClass={} seqNbr={}",
            req.msg_type(),
            req.msg_class().tag(),
            req.seq_nbr()
        );
    }

    fn on_local_node_state_change(
        &mut self,
        ln: Arc<LocalNode>,
        old: LocalNodeState,
        new: LocalNodeState,
    ) {
        log::debug!("[APP] local node {} state {} -> {}", ln.ip_key(), old, new);
    }

    fn on_remote_node_state_change(
        &mut self,
        rn: Arc<RemoteNode>,
        old: RemoteNodeState,
        new: RemoteNodeState,
    ) {
        log::debug!("[APP] remote node {} state {} -> {}", rn.ip_key(), old, new);
    }

    /// The peer reported a Recovery Time Stamp newer than recorded.
    fn on_remote_node_restart(&mut self, rn: Arc<RemoteNode>, restart_time: SystemTime) {
        log::debug!(
            "[APP] remote node {} restarted at {}",
            rn.ip_key(),
            crate::stats::format_timestamp(restart_time)
        );
    }

    fn on_snd_req_error(&mut self, req: AppMsgReq, err: Error) {
        log::debug!("[APP] on_snd_req_error seqNbr={} - {}", req.seq_nbr(), err);
    }

    fn on_snd_rsp_error(&mut self, rsp: AppMsgRsp, err: Error) {
        log::debug!("[APP] on_snd_rsp_error seqNbr={} - {}", rsp.seq_nbr(), err);
    }

    fn on_encode_req_error(&mut self, req: AppMsgReq, err: Error) {
        log::debug!("[APP] on_encode_req_error seqNbr={} - {}", req.seq_nbr(), err);
    }

    fn on_encode_rsp_error(&mut self, rsp: AppMsgRsp, err: Error) {
        log::debug!("[APP] on_encode_rsp_error seqNbr={} - {}", rsp.seq_nbr(), err);
    }
}

/// Spawn the worker pool over the shared application queue.
pub(crate) fn spawn_workers<W, F>(
    count: usize,
    rx: &Receiver<AppEvent>,
    factory: F,
) -> Vec<JoinHandle<()>>
where
    W: ApplicationWorker,
    F: Fn(usize) -> W,
{
    (0..count)
        .map(|worker_id| {
            let worker = factory(worker_id);
            let rx = rx.clone();
            std::thread::Builder::new()
                .name(format!("pfcp-app-{}", worker_id))
                .spawn(move || run_worker(worker_id, worker, &rx))
                .expect("application worker thread should spawn")
        })
        .collect()
}

fn run_worker<W: ApplicationWorker>(worker_id: usize, mut worker: W, rx: &Receiver<AppEvent>) {
    log::debug!("[APP] worker {} started", worker_id);
    worker.on_init();

    while let Ok(ev) = rx.recv() {
        match ev {
            AppEvent::RcvdReq(req) => worker.on_rcvd_req(req),
            AppEvent::RcvdRsp(rsp) => worker.on_rcvd_rsp(rsp),
            AppEvent::ReqTimeout(req) => worker.on_req_timeout(req),
            AppEvent::LocalNodeStateChange { ln, old, new } => {
                worker.on_local_node_state_change(ln, old, new);
            }
            AppEvent::RemoteNodeStateChange { rn, old, new } => {
                worker.on_remote_node_state_change(rn, old, new);
            }
            AppEvent::RemoteNodeRestart { rn, restart_time } => {
                worker.on_remote_node_restart(rn, restart_time);
            }
            AppEvent::SndReqError { req, err } => worker.on_snd_req_error(req, err),
            AppEvent::SndRspError { rsp, err } => worker.on_snd_rsp_error(rsp, err),
            AppEvent::EncodeReqError { req, err } => worker.on_encode_req_error(req, err),
            AppEvent::EncodeRspError { rsp, err } => worker.on_encode_rsp_error(rsp, err),
            AppEvent::Shutdown => break,
        }
    }

    worker.on_quit();
    log::debug!("[APP] worker {} exiting", worker_id);
}

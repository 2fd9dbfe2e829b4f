// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stack runtime: the three stages, the timer pool, and the handle that
//! ties them together.
//!
//! There are no global singletons; everything the subsystems share lives in
//! one runtime-scoped [`Runtime`] created at [`Stack::start`] and dropped
//! with the stack.

mod app;
mod comm;
mod events;
mod internal;
mod timer;
mod translation;

pub use app::ApplicationWorker;
pub use internal::{ReqIn, RspIn};

pub(crate) use comm::WAKER_TOKEN;
pub(crate) use events::{AppEvent, CommEvent, TranslationEvent};
pub(crate) use internal::{ReqOut, RspOut};
pub(crate) use timer::TimerPool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::msg::{AppMsg, AppMsgReq, AppMsgRsp};
use crate::node::{IpKey, LocalNode, Session};
use crate::proto::MsgTypes;
use crate::stats;
use crate::teid::TeidRangeManager;
use crate::translator::Translator;
use comm::CommStage;
use crossbeam::channel::{unbounded, Sender};
use mio::{Poll, Waker};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const RSP_WND_ONE: u8 = 1;
const RSP_WND_TWO: u8 = 2;
const RSP_WND_TOGGLE: u8 = RSP_WND_ONE ^ RSP_WND_TWO;

/// Sender half of the Communication queue plus the poll waker.
#[derive(Clone)]
pub(crate) struct CommSender {
    tx: Sender<CommEvent>,
    waker: Arc<Waker>,
}

impl CommSender {
    pub(crate) fn new(tx: Sender<CommEvent>, waker: Arc<Waker>) -> Self {
        Self { tx, waker }
    }

    /// Enqueue and wake the poll loop. Harmless after shutdown.
    pub(crate) fn send(&self, ev: CommEvent) {
        if self.tx.send(ev).is_err() {
            log::debug!("[COMM] queue closed, event dropped");
            return;
        }
        if let Err(e) = self.waker.wake() {
            log::debug!("[COMM] waker failed: {}", e);
        }
    }
}

/// Shared state of one running stack.
///
/// Nodes, sessions, and stages all hold an `Arc<Runtime>`; nothing here is
/// process-global.
pub(crate) struct Runtime {
    pub(crate) cfg: Config,
    pub(crate) types: MsgTypes,
    pub(crate) app_tx: Sender<AppEvent>,
    pub(crate) trans_tx: Sender<TranslationEvent>,
    pub(crate) comm: CommSender,
    pub(crate) teid: Mutex<TeidRangeManager>,
    pub(crate) timers: TimerPool<CommEvent>,
    /// Index of the activity window remotes currently count into.
    pub(crate) cur_activity_wnd: AtomicUsize,
    /// Current response-window tag (1 or 2).
    pub(crate) cur_rsp_wnd: AtomicU8,
    /// Local nodes registered with the Communication stage.
    pub(crate) locals: RwLock<HashMap<IpKey, Arc<LocalNode>>>,
}

impl Runtime {
    pub(crate) fn send_to_app(&self, ev: AppEvent) {
        if self.app_tx.send(ev).is_err() {
            log::debug!("[APP] queue closed, event dropped");
        }
    }

    pub(crate) fn send_to_translation(&self, ev: TranslationEvent) {
        if self.trans_tx.send(ev).is_err() {
            log::debug!("[XLATE] queue closed, event dropped");
        }
    }

    pub(crate) fn cur_activity_wnd(&self) -> usize {
        self.cur_activity_wnd.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cur_activity_wnd(&self, wnd: usize) {
        self.cur_activity_wnd.store(wnd, Ordering::Relaxed);
    }

    pub(crate) fn cur_rsp_wnd(&self) -> u8 {
        self.cur_rsp_wnd.load(Ordering::Relaxed)
    }

    /// Flip the response-window toggle and return the new value.
    pub(crate) fn flip_rsp_wnd(&self) -> u8 {
        self.cur_rsp_wnd.fetch_xor(RSP_WND_TOGGLE, Ordering::Relaxed) ^ RSP_WND_TOGGLE
    }
}

/// A running PFCP stack.
///
/// Built by [`Stack::start`]; dropping it (or calling [`Stack::shutdown`])
/// releases every local node, stops the stages, and joins their threads.
pub struct Stack {
    handle: StackHandle,
    comm: Option<JoinHandle<()>>,
    translation: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Stack {
    /// Validate the configuration, capture the translator's message types,
    /// and spawn the timer pool, the Communication and Translation stages,
    /// and the application work group.
    pub fn start<W, F>(cfg: Config, translator: Arc<dyn Translator>, factory: F) -> Result<Stack>
    where
        W: ApplicationWorker,
        F: Fn(usize) -> W,
    {
        cfg.validate()?;

        let poll = Poll::new().map_err(Error::Io)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN).map_err(Error::Io)?);

        let (app_tx, app_rx) = unbounded();
        let (trans_tx, trans_rx) = unbounded();
        let (comm_tx, comm_rx) = unbounded();
        let comm_sender = CommSender::new(comm_tx, waker);

        log::info!("[STACK] initializing the timer pool");
        let timers = TimerPool::start({
            let comm = comm_sender.clone();
            move |ev| comm.send(ev)
        });

        let teid_bits = cfg.teid_range_bits;
        let workers_n = cfg.application_workers();
        let rt = Arc::new(Runtime {
            cfg,
            types: translator.msg_types(),
            app_tx,
            trans_tx,
            comm: comm_sender,
            teid: Mutex::new(TeidRangeManager::new(teid_bits)),
            timers,
            cur_activity_wnd: AtomicUsize::new(0),
            cur_rsp_wnd: AtomicU8::new(RSP_WND_ONE),
            locals: RwLock::new(HashMap::new()),
        });

        log::info!("[STACK] initializing the communication stage");
        let comm = CommStage::spawn(Arc::clone(&rt), Arc::clone(&translator), poll, comm_rx);
        log::info!("[STACK] initializing the translation stage");
        let translation =
            translation::TranslationStage::spawn(Arc::clone(&rt), translator, trans_rx);
        log::info!("[STACK] starting {} application worker(s)", workers_n);
        let workers = app::spawn_workers(workers_n, &app_rx, factory);

        Ok(Stack { handle: StackHandle { rt }, comm: Some(comm), translation: Some(translation), workers })
    }

    /// A cloneable handle for use from application code and handlers.
    pub fn handle(&self) -> StackHandle {
        self.handle.clone()
    }

    /// Stop the stack: release local nodes, stop the stages, join threads.
    pub fn shutdown(mut self) {
        self.shutdown_impl();
    }

    fn shutdown_impl(&mut self) {
        if self.comm.is_none() && self.translation.is_none() && self.workers.is_empty() {
            return;
        }
        log::info!("[STACK] releasing local nodes and stopping stages");

        let rt = &self.handle.rt;
        rt.comm.send(CommEvent::Shutdown);
        if let Some(handle) = self.comm.take() {
            let _ = handle.join();
        }

        rt.send_to_translation(TranslationEvent::Shutdown);
        if let Some(handle) = self.translation.take() {
            let _ = handle.join();
        }

        for _ in 0..self.workers.len() {
            rt.send_to_app(AppEvent::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        rt.timers.shutdown();

        log::info!(
            "[STACK] session counts created={} deleted={}",
            Session::sessions_created(),
            Session::sessions_deleted()
        );
        log::info!(
            "[STACK] node counts created={} deleted={}",
            crate::node::nodes_created(),
            crate::node::nodes_deleted()
        );
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

/// Cloneable entry point into a running stack.
#[derive(Clone)]
pub struct StackHandle {
    rt: Arc<Runtime>,
}

impl StackHandle {
    /// Bind a local node and register it with the Communication stage.
    ///
    /// The node transitions to `Started` once its socket joins the poll
    /// loop; a `LocalNodeStateChange` event reports it.
    pub fn create_local_node(&self, addr: SocketAddr) -> Result<Arc<LocalNode>> {
        let ln = LocalNode::new(Arc::clone(&self.rt), addr)?;
        self.rt.comm.send(CommEvent::AddLocalNode(Arc::clone(&ln)));
        Ok(ln)
    }

    /// Stop one local node and release its socket.
    pub fn stop_local_node(&self, ln: &Arc<LocalNode>) {
        self.rt.comm.send(CommEvent::StopLocalNode(Arc::clone(ln)));
    }

    /// Hand an application request to the Translation stage for encoding
    /// and transmission.
    pub fn send_req(&self, req: AppMsgReq) -> Result<()> {
        self.rt
            .trans_tx
            .send(TranslationEvent::SndMsg(AppMsg::Req(req)))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Hand an application response to the Translation stage.
    pub fn send_rsp(&self, rsp: AppMsgRsp) -> Result<()> {
        self.rt
            .trans_tx
            .send(TranslationEvent::SndMsg(AppMsg::Rsp(rsp)))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Render the statistics document for every registered local node.
    pub fn stats_json(&self) -> String {
        let locals: Vec<Arc<LocalNode>> = self.rt.locals.read().values().cloned().collect();
        stats::collect_json(&locals)
    }

    /// Zero all per-remote message counters.
    pub fn reset_stats(&self) {
        let locals: Vec<Arc<LocalNode>> = self.rt.locals.read().values().cloned().collect();
        stats::reset_all(&locals);
    }

    /// The configuration the stack was started with.
    pub fn config(&self) -> &Config {
        &self.rt.cfg
    }
}

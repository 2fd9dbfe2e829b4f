// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote (peer) PFCP nodes.

use crate::node::{IpKey, Session};
use crate::proto::{Seid, SeqNbr};
use crate::stack::{AppEvent, CommEvent, Runtime};
use crate::stats::NodeStats;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

pub(crate) static NODES_CREATED: AtomicU64 = AtomicU64::new(0);
pub(crate) static NODES_DELETED: AtomicU64 = AtomicU64::new(0);

/// Lifecycle of a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteNodeState {
    Initialized,
    Started,
    Stopping,
    Stopped,
    /// Heartbeat retransmissions exhausted; the peer is unresponsive.
    Failed,
    /// The peer reported a Recovery Time Stamp newer than recorded.
    Restarted,
}

impl fmt::Display for RemoteNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteNodeState::Initialized => "Initialized",
            RemoteNodeState::Started => "Started",
            RemoteNodeState::Stopping => "Stopping",
            RemoteNodeState::Stopped => "Stopped",
            RemoteNodeState::Failed => "Failed",
            RemoteNodeState::Restarted => "Restarted",
        };
        f.write_str(name)
    }
}

/// Ring of per-window activity counters.
///
/// Any inbound datagram increments the current window; the ring is rotated
/// by the Communication stage's activity clock. A peer is idle only once a
/// full rotation has completed with every counter at zero.
#[derive(Debug)]
struct ActivityRing {
    wnds: Vec<u32>,
    cur: usize,
    /// Windows rotated through so far, saturating at the ring size.
    filled: usize,
}

impl ActivityRing {
    fn new(len: usize) -> Self {
        Self { wnds: vec![0; len.max(1)], cur: 0, filled: 0 }
    }

    fn increment(&mut self) {
        self.wnds[self.cur] += 1;
    }

    fn rotate(&mut self, wnd: usize) {
        self.cur = wnd % self.wnds.len();
        if self.filled < self.wnds.len() {
            self.filled += 1;
        }
        // the new current window starts clean
        self.wnds[self.cur] = 0;
    }

    fn has_activity(&self) -> bool {
        if self.filled < self.wnds.len() {
            // not a full rotation yet, treat as active
            return true;
        }
        self.wnds.iter().any(|&count| count > 0)
    }
}

/// A peer PFCP node (UPF/SGW-U/PGW-C counterpart of the local function).
///
/// Created explicitly by the application or on the fly when a datagram
/// arrives from an unknown source address.
pub struct RemoteNode {
    rt: Arc<Runtime>,
    addr: SocketAddr,
    ip: IpKey,
    /// Peer's Recovery Time Stamp; `None` until the first node-class exchange.
    start_time: RwLock<Option<SystemTime>>,
    state: RwLock<RemoteNodeState>,
    teid_range: AtomicI32,
    activity: Mutex<ActivityRing>,
    /// Received-request table: sequence number -> response-window tag.
    rcvd_req: Mutex<std::collections::HashMap<SeqNbr, u8>>,
    /// Sessions keyed by *remote* SEID.
    sessions: DashMap<Seid, Arc<Session>>,
    stats: NodeStats,
}

impl RemoteNode {
    pub(crate) fn new(rt: Arc<Runtime>, addr: SocketAddr) -> Arc<Self> {
        NODES_CREATED.fetch_add(1, Ordering::Relaxed);
        let nbr_wnds = rt.cfg.nbr_activity_wnds;
        let attempts = rt.cfg.max_attempts();
        Arc::new(Self {
            rt,
            addr,
            ip: IpKey::from(addr),
            start_time: RwLock::new(None),
            state: RwLock::new(RemoteNodeState::Initialized),
            teid_range: AtomicI32::new(-1),
            activity: Mutex::new(ActivityRing::new(nbr_wnds)),
            rcvd_req: Mutex::new(std::collections::HashMap::new()),
            sessions: DashMap::new(),
            stats: NodeStats::new(attempts),
        })
    }

    /// The socket address requests and responses are sent to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The IP key this node is registered under.
    pub fn ip_key(&self) -> IpKey {
        self.ip
    }

    pub fn state(&self) -> RemoteNodeState {
        *self.state.read()
    }

    /// Peer's recorded start time, if any exchange reported one yet.
    pub fn start_time(&self) -> Option<SystemTime> {
        *self.start_time.read()
    }

    /// Message statistics for this peer.
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Assigned TEID range value, -1 when unassigned.
    pub fn teid_range_value(&self) -> i32 {
        self.teid_range.load(Ordering::Relaxed)
    }

    pub(crate) fn set_teid_range_value(&self, trv: i32) {
        self.teid_range.store(trv, Ordering::Relaxed);
    }

    /// Transition state and surface the change to the application.
    pub(crate) fn change_state(self: &Arc<Self>, new: RemoteNodeState) {
        let old = {
            let mut state = self.state.write();
            let old = *state;
            *state = new;
            old
        };
        self.rt.send_to_app(AppEvent::RemoteNodeStateChange {
            rn: Arc::clone(self),
            old,
            new,
        });
    }

    /// Record the peer's reported start time.
    ///
    /// The first report is recorded silently; a later report strictly newer
    /// than the recorded one is a restart: the new time is recorded, the
    /// state moves to `Restarted`, and a `RemoteNodeRestart` event is
    /// surfaced. Stale (older) reports are ignored.
    pub(crate) fn observe_start_time(self: &Arc<Self>, reported: SystemTime) {
        let restarted = {
            let mut start = self.start_time.write();
            match *start {
                None => {
                    *start = Some(reported);
                    false
                }
                Some(recorded) if reported > recorded => {
                    *start = Some(reported);
                    true
                }
                Some(_) => false,
            }
        };

        if restarted {
            log::info!("[COMM] remote {} restarted", self.ip);
            let old = {
                let mut state = self.state.write();
                let old = *state;
                *state = RemoteNodeState::Restarted;
                old
            };
            self.rt.send_to_app(AppEvent::RemoteNodeStateChange {
                rn: Arc::clone(self),
                old,
                new: RemoteNodeState::Restarted,
            });
            self.rt.send_to_app(AppEvent::RemoteNodeRestart {
                rn: Arc::clone(self),
                restart_time: reported,
            });
        }
    }

    // =======================================================================
    // Activity windows
    // =======================================================================

    /// Count one inbound datagram in the current window.
    pub(crate) fn increment_activity(&self) {
        self.activity.lock().increment();
    }

    /// Advance to window `wnd`, clearing it.
    pub(crate) fn next_activity_wnd(&self, wnd: usize) {
        self.activity.lock().rotate(wnd);
    }

    /// Whether any window of the ring saw traffic (or the ring has not
    /// completed a full rotation yet).
    pub(crate) fn check_activity(&self) -> bool {
        self.activity.lock().has_activity()
    }

    // =======================================================================
    // Received-request table
    // =======================================================================

    /// Record a received request. Returns false for a duplicate.
    pub(crate) fn add_rcvd_req(&self, seq_nbr: SeqNbr, rsp_wnd: u8) -> bool {
        let mut map = self.rcvd_req.lock();
        if map.contains_key(&seq_nbr) {
            return false;
        }
        map.insert(seq_nbr, rsp_wnd);
        true
    }

    pub(crate) fn rcvd_req_exists(&self, seq_nbr: SeqNbr) -> bool {
        self.rcvd_req.lock().contains_key(&seq_nbr)
    }

    pub(crate) fn del_rcvd_req(&self, seq_nbr: SeqNbr) -> bool {
        self.rcvd_req.lock().remove(&seq_nbr).is_some()
    }

    /// Retag an entry (response sent); false when the entry was reaped.
    pub(crate) fn set_rcvd_req_rsp_wnd(&self, seq_nbr: SeqNbr, rsp_wnd: u8) -> bool {
        match self.rcvd_req.lock().get_mut(&seq_nbr) {
            Some(tag) => {
                *tag = rsp_wnd;
                true
            }
            None => false,
        }
    }

    /// Drop every entry tagged with `rsp_wnd` (response-window GC).
    pub(crate) fn remove_old_rcvd_reqs(&self, rsp_wnd: u8) {
        self.rcvd_req.lock().retain(|_, tag| *tag != rsp_wnd);
    }

    #[cfg(test)]
    pub(crate) fn rcvd_req_len(&self) -> usize {
        self.rcvd_req.lock().len()
    }

    // =======================================================================
    // Sessions (keyed by remote SEID)
    // =======================================================================

    pub(crate) fn add_session(&self, session: &Arc<Session>) {
        let seid = session.remote_seid();
        if seid != 0 {
            self.sessions.entry(seid).or_insert_with(|| Arc::clone(session));
        }
    }

    pub(crate) fn del_session(&self, session: &Arc<Session>) {
        let seid = session.remote_seid();
        if seid != 0 {
            self.sessions.remove(&seid);
        }
    }

    /// Session for a remote SEID.
    pub fn get_session(&self, seid: Seid) -> Option<Arc<Session>> {
        self.sessions.get(&seid).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of sessions registered on this peer.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn first_session(&self) -> Option<Arc<Session>> {
        self.sessions.iter().next().map(|entry| Arc::clone(entry.value()))
    }

    // =======================================================================
    // Teardown
    // =======================================================================

    /// Disconnect the peer: move to `Stopping` and delete all sessions, one
    /// per `DelNxtRmtSession` event, ending in `Stopped`.
    pub fn disconnect(self: &Arc<Self>) {
        self.change_state(RemoteNodeState::Stopping);
        self.delete_all_sessions();
    }

    /// Kick off the one-session-per-event deletion chain.
    pub fn delete_all_sessions(self: &Arc<Self>) {
        self.rt.comm.send(CommEvent::DelNxtRmtSession(Arc::clone(self)));
    }
}

impl Drop for RemoteNode {
    fn drop(&mut self) {
        NODES_DELETED.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNode")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("teid_range", &self.teid_range_value())
            .finish()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local PFCP nodes.
//!
//! A local node is one UDP bind address: it owns the socket, the sequence
//! and SEID allocators, the outbound-request (retransmission) table, the
//! remote-node table, and the session map keyed by local SEID. Its creation
//! time doubles as the Recovery Time Stamp reported to peers.

use crate::alloc::{SeidAllocator, SequenceAllocator};
use crate::error::{Error, Result};
use crate::node::remote::{NODES_CREATED, NODES_DELETED};
use crate::node::socket::NodeSocket;
use crate::node::{IpKey, RemoteNode, RemoteNodeState, Session};
use crate::proto::{Seid, SeqNbr};
use crate::stack::{AppEvent, ReqOut, Runtime, TranslationEvent};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

/// Lifecycle of a local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalNodeState {
    Initialized,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for LocalNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocalNodeState::Initialized => "Initialized",
            LocalNodeState::Started => "Started",
            LocalNodeState::Stopping => "Stopping",
            LocalNodeState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// One local PFCP endpoint.
pub struct LocalNode {
    rt: Arc<Runtime>,
    addr: SocketAddr,
    ip: IpKey,
    start_time: SystemTime,
    state: RwLock<LocalNodeState>,
    seq_alloc: SequenceAllocator,
    seid_alloc: SeidAllocator,
    socket: NodeSocket,
    /// Outbound-request (retransmission) table keyed by sequence number.
    req_out: Mutex<HashMap<SeqNbr, ReqOut>>,
    /// Known peers keyed by remote IP.
    remotes: RwLock<HashMap<IpKey, Arc<RemoteNode>>>,
    /// Sessions keyed by *local* SEID.
    sessions: DashMap<Seid, Arc<Session>>,
}

impl LocalNode {
    /// Bind `addr` and build the node in the `Initialized` state.
    ///
    /// The node is not reachable until it is registered with the
    /// Communication stage
    /// ([`StackHandle::create_local_node`](crate::StackHandle::create_local_node)
    /// does both).
    pub(crate) fn new(rt: Arc<Runtime>, addr: SocketAddr) -> Result<Arc<Self>> {
        let socket = NodeSocket::bind(addr, rt.cfg.socket_buffer_size)?;
        let bound = socket.local_addr();
        NODES_CREATED.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Self {
            rt,
            addr: bound,
            ip: IpKey::from(bound),
            start_time: SystemTime::now(),
            state: RwLock::new(LocalNodeState::Initialized),
            seq_alloc: SequenceAllocator::new(),
            seid_alloc: SeidAllocator::new(),
            socket,
            req_out: Mutex::new(HashMap::new()),
            remotes: RwLock::new(HashMap::new()),
            sessions: DashMap::new(),
        }))
    }

    /// The bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The IP key this node is registered under.
    pub fn ip_key(&self) -> IpKey {
        self.ip
    }

    /// Creation time, reported to peers as the Recovery Time Stamp.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn state(&self) -> LocalNodeState {
        *self.state.read()
    }

    // =======================================================================
    // Allocators
    // =======================================================================

    /// Allocate a SEID for a new session.
    pub fn alloc_seid(&self) -> Seid {
        self.seid_alloc.alloc()
    }

    /// Release a SEID (no-op; window GC reclaims all bookkeeping).
    pub fn free_seid(&self, seid: Seid) {
        self.seid_alloc.free(seid);
    }

    /// Allocate a request sequence number.
    pub fn alloc_seq_nbr(&self) -> SeqNbr {
        self.seq_alloc.alloc()
    }

    /// Release a sequence number (no-op).
    pub fn free_seq_nbr(&self, seq_nbr: SeqNbr) {
        self.seq_alloc.free(seq_nbr);
    }

    // =======================================================================
    // Lifecycle
    // =======================================================================

    pub(crate) fn change_state(self: &Arc<Self>, new: LocalNodeState) {
        let old = {
            let mut state = self.state.write();
            let old = *state;
            *state = new;
            old
        };
        self.rt.send_to_app(AppEvent::LocalNodeStateChange { ln: Arc::clone(self), old, new });
    }

    // =======================================================================
    // Remote nodes
    // =======================================================================

    /// Create (or restart) the remote node for `ip`, transitioning it to
    /// `Started`.
    ///
    /// Idempotent per address: an existing peer in a non-started state is
    /// restarted and returned; an existing `Started` peer is an error. When
    /// TEID range assignment is enabled, a new peer draws a range value and
    /// creation fails once the pool is exhausted.
    pub fn create_remote_node(
        self: &Arc<Self>,
        ip: IpAddr,
        port: u16,
    ) -> Result<Arc<RemoteNode>> {
        let key = IpKey::from_ip(ip);
        let mut remotes = self.remotes.write();

        if let Some(rn) = remotes.get(&key) {
            if rn.state() == RemoteNodeState::Started {
                return Err(Error::RemoteNodeAlreadyStarted);
            }
            log::debug!("[NODE] restarting remote node address={}", key);
            let rn = Arc::clone(rn);
            drop(remotes);
            rn.change_state(RemoteNodeState::Started);
            return Ok(rn);
        }

        let rn = RemoteNode::new(Arc::clone(&self.rt), SocketAddr::new(ip, port));

        if self.rt.cfg.assign_teid_range && !self.rt.teid.lock().assign(&rn) {
            log::warn!("[NODE] unable to assign TEID range value for {}", key);
            return Err(Error::TeidRangeExhausted);
        }

        rn.next_activity_wnd(self.rt.cur_activity_wnd());
        remotes.insert(key, Arc::clone(&rn));
        drop(remotes);

        rn.change_state(RemoteNodeState::Started);
        Ok(rn)
    }

    /// Look up a peer by IP key.
    pub fn find_remote(&self, key: &IpKey) -> Option<Arc<RemoteNode>> {
        self.remotes.read().get(key).cloned()
    }

    /// Snapshot of all known peers.
    pub fn remote_nodes(&self) -> Vec<Arc<RemoteNode>> {
        self.remotes.read().values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn drop_remote_for_test(&self, rn: &Arc<RemoteNode>) {
        self.remotes.write().remove(&rn.ip_key());
        self.rt.teid.lock().release(rn);
    }

    /// Release every peer's TEID range value (local node teardown).
    pub(crate) fn release_remotes(&self) {
        let remotes = self.remotes.read();
        let mut teid = self.rt.teid.lock();
        for rn in remotes.values() {
            teid.release(rn);
        }
    }

    // =======================================================================
    // Sessions
    // =======================================================================

    /// Create a session with `rn`, assign its local SEID, and enqueue its
    /// registration.
    pub fn create_session(self: &Arc<Self>, rn: &Arc<RemoteNode>) -> Result<Arc<Session>> {
        let session = Session::new(Arc::clone(&self.rt), self, rn);
        session.set_local_seid(self.alloc_seid())?;
        Ok(session)
    }

    /// Session for a local SEID.
    pub fn get_session(&self, seid: Seid) -> Option<Arc<Session>> {
        self.sessions.get(&seid).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of sessions registered on this node.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn add_session(&self, session: &Arc<Session>) {
        let seid = session.local_seid();
        if seid != 0 {
            self.sessions.entry(seid).or_insert_with(|| Arc::clone(session));
        }
    }

    pub(crate) fn del_session(&self, session: &Arc<Session>) {
        let seid = session.local_seid();
        if seid != 0 {
            self.sessions.remove(&seid);
        }
    }

    // =======================================================================
    // Outbound-request table (Communication stage only)
    // =======================================================================

    pub(crate) fn req_out_table(&self) -> MutexGuard<'_, HashMap<SeqNbr, ReqOut>> {
        self.req_out.lock()
    }

    pub(crate) fn rqst_out_exists(&self, seq_nbr: SeqNbr) -> bool {
        self.req_out.lock().contains_key(&seq_nbr)
    }

    /// Drop every entry tagged with `rsp_wnd`, returning them so the caller
    /// can release timers.
    pub(crate) fn remove_old_req_outs(&self, rsp_wnd: u8) -> Vec<ReqOut> {
        let mut table = self.req_out.lock();
        let purged: Vec<SeqNbr> = table
            .iter()
            .filter(|(_, ro)| ro.rsp_wnd == rsp_wnd)
            .map(|(&sn, _)| sn)
            .collect();
        purged.into_iter().filter_map(|sn| table.remove(&sn)).collect()
    }

    /// Drain the whole table (node teardown).
    pub(crate) fn clear_req_outs(&self) -> Vec<ReqOut> {
        self.req_out.lock().drain().map(|(_, ro)| ro).collect()
    }

    // =======================================================================
    // Activity clock fan-out
    // =======================================================================

    /// Rotate every peer's activity ring to window `wnd`.
    pub(crate) fn next_activity_wnd(&self, wnd: usize) {
        let remotes = self.remotes.read();
        for rn in remotes.values() {
            rn.next_activity_wnd(wnd);
        }
    }

    /// Ask Translation to synthesize a Heartbeat Request for every Started
    /// peer whose ring completed a silent rotation.
    pub(crate) fn check_activity(self: &Arc<Self>) {
        let remotes = self.remotes.read();
        for rn in remotes.values() {
            if rn.state() == RemoteNodeState::Started && !rn.check_activity() {
                self.rt.send_to_translation(TranslationEvent::SndHeartbeatReq {
                    ln: Arc::clone(self),
                    rn: Arc::clone(rn),
                });
                // one heartbeat per silent rotation, not one per tick
                rn.increment_activity();
            }
        }
    }

    /// Response-window GC for this node and all of its peers.
    pub(crate) fn remove_old_reqs(&self, rsp_wnd: u8) -> Vec<ReqOut> {
        let purged = self.remove_old_req_outs(rsp_wnd);
        let remotes = self.remotes.read();
        for rn in remotes.values() {
            rn.remove_old_rcvd_reqs(rsp_wnd);
        }
        purged
    }

    // =======================================================================
    // Socket access (Communication stage only)
    // =======================================================================

    pub(crate) fn socket(&self) -> &NodeSocket {
        &self.socket
    }

    /// Send a datagram to a peer.
    pub(crate) fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize> {
        self.socket
            .send_to(data, target)
            .map_err(|e| Error::SendFailed(format!("{} -> {}: {}", self.addr, target, e)))
    }
}

impl Drop for LocalNode {
    fn drop(&mut self) {
        NODES_DELETED.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("remotes", &self.remotes.read().len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PFCP sessions.
//!
//! A session is co-owned by the SEID maps of its two nodes; the session
//! itself only keeps non-owning references back, valid for as long as either
//! map holds it. Registration and destruction both go through the
//! Communication stage as events, so map mutation stays serialized there.

use crate::error::{Error, Result};
use crate::node::{LocalNode, RemoteNode};
use crate::proto::Seid;
use crate::stack::{CommEvent, Runtime};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static SESSIONS_CREATED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_DELETED: AtomicU64 = AtomicU64::new(0);

/// One PFCP session between a local and a remote node.
///
/// The local SEID is assigned at creation; the remote SEID arrives with the
/// peer's establishment message. Each can be set exactly once.
pub struct Session {
    rt: Arc<Runtime>,
    ln: Weak<LocalNode>,
    rn: Weak<RemoteNode>,
    local_seid: AtomicU64,
    remote_seid: AtomicU64,
}

impl Session {
    pub(crate) fn new(rt: Arc<Runtime>, ln: &Arc<LocalNode>, rn: &Arc<RemoteNode>) -> Arc<Self> {
        SESSIONS_CREATED.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self {
            rt,
            ln: Arc::downgrade(ln),
            rn: Arc::downgrade(rn),
            local_seid: AtomicU64::new(0),
            remote_seid: AtomicU64::new(0),
        })
    }

    /// The owning local node, unless it has been released.
    pub fn local_node(&self) -> Option<Arc<LocalNode>> {
        self.ln.upgrade()
    }

    /// The owning remote node, unless it has been released.
    pub fn remote_node(&self) -> Option<Arc<RemoteNode>> {
        self.rn.upgrade()
    }

    /// Local SEID, 0 while unset.
    pub fn local_seid(&self) -> Seid {
        self.local_seid.load(Ordering::Acquire)
    }

    /// Remote SEID, 0 until the peer's establishment message set it.
    pub fn remote_seid(&self) -> Seid {
        self.remote_seid.load(Ordering::Acquire)
    }

    /// Assign the local SEID (once) and register the session.
    pub fn set_local_seid(self: &Arc<Self>, seid: Seid) -> Result<()> {
        self.set_seid(seid, 0, true)
    }

    /// Assign the remote SEID (once) and register the session.
    ///
    /// A second assignment fails with [`Error::RemoteSeidAlreadySet`]; the
    /// first value is immutable.
    pub fn set_remote_seid(self: &Arc<Self>, seid: Seid) -> Result<()> {
        self.set_seid(0, seid, true)
    }

    /// Assign either SEID; `notify` enqueues the registration event.
    pub(crate) fn set_seid(self: &Arc<Self>, ls: Seid, rs: Seid, notify: bool) -> Result<()> {
        if ls != 0
            && self
                .local_seid
                .compare_exchange(0, ls, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return Err(Error::LocalSeidAlreadySet);
        }
        if rs != 0
            && self
                .remote_seid
                .compare_exchange(0, rs, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return Err(Error::RemoteSeidAlreadySet);
        }
        if notify {
            self.rt.comm.send(CommEvent::AddSession(Arc::clone(self)));
        }
        Ok(())
    }

    /// Start asynchronous destruction: the Communication stage removes the
    /// session from both node maps.
    pub fn destroy(self: &Arc<Self>) {
        self.rt.comm.send(CommEvent::DelSession(Arc::clone(self)));
    }

    /// Sessions created over the process lifetime.
    pub fn sessions_created() -> u64 {
        SESSIONS_CREATED.load(Ordering::Relaxed)
    }

    /// Sessions dropped over the process lifetime.
    pub fn sessions_deleted() -> u64 {
        SESSIONS_DELETED.load(Ordering::Relaxed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        SESSIONS_DELETED.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_seid", &self.local_seid())
            .field("remote_seid", &self.remote_seid())
            .finish()
    }
}

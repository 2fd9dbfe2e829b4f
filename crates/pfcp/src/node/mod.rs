// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory PFCP topology: local nodes, remote (peer) nodes, and sessions.

mod ip;
mod local;
mod remote;
mod session;
pub(crate) mod socket;

pub use ip::IpKey;
pub use local::{LocalNode, LocalNodeState};
pub use remote::{RemoteNode, RemoteNodeState};
pub use session::Session;

use std::sync::atomic::Ordering;

/// Nodes (local and remote) created over the process lifetime.
pub fn nodes_created() -> u64 {
    remote::NODES_CREATED.load(Ordering::Relaxed)
}

/// Nodes (local and remote) dropped over the process lifetime.
pub fn nodes_deleted() -> u64 {
    remote::NODES_DELETED.load(Ordering::Relaxed)
}

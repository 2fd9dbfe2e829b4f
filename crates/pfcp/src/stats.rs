// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-remote message statistics and the JSON snapshot document.
//!
//! Counters are relaxed atomics; consumers only need monotonic snapshots for
//! observability. The snapshot is rendered as JSON by hand (serde-free) so
//! the core crate carries no serialization dependency.

use crate::node::LocalNode;
use crate::proto::{self, MsgType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Counters for one message type on one remote node.
///
/// `sent` is indexed by attempt number: `sent[0]` counts original
/// transmissions, `sent[1]` first retransmits, and so on. Its length is
/// `max(n1, heartbeat_n1)`; attempts beyond that are folded into the last
/// slot.
#[derive(Debug)]
pub struct MessageStats {
    id: MsgType,
    name: &'static str,
    received: AtomicU32,
    timeout: AtomicU32,
    sent: Vec<AtomicU32>,
}

impl MessageStats {
    fn new(id: MsgType, attempts: usize) -> Self {
        Self {
            id,
            name: proto::msg_name(id),
            received: AtomicU32::new(0),
            timeout: AtomicU32::new(0),
            sent: (0..attempts.max(1)).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn id(&self) -> MsgType {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn received(&self) -> u32 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> u32 {
        self.timeout.load(Ordering::Relaxed)
    }

    /// Snapshot of the per-attempt send counters.
    pub fn sent(&self) -> Vec<u32> {
        self.sent.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_sent(&self, attempt: usize) {
        let idx = attempt.min(self.sent.len() - 1);
        self.sent[idx].fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.timeout.store(0, Ordering::Relaxed);
        for slot in &self.sent {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// Statistics block attached to every remote node.
///
/// The message table is built once from the protocol template; only the
/// counters inside it mutate afterwards. `last_activity` moves on every
/// counted event.
#[derive(Debug)]
pub struct NodeStats {
    last_activity: RwLock<SystemTime>,
    msgs: HashMap<MsgType, MessageStats>,
}

impl NodeStats {
    /// Build the per-remote table for the known message types.
    pub fn new(attempts: usize) -> Self {
        let msgs = proto::STAT_MSG_TYPES
            .iter()
            .map(|&mt| (mt, MessageStats::new(mt, attempts)))
            .collect();
        Self { last_activity: RwLock::new(SystemTime::now()), msgs }
    }

    pub fn last_activity(&self) -> SystemTime {
        *self.last_activity.read()
    }

    fn touch(&self) {
        *self.last_activity.write() = SystemTime::now();
    }

    /// Look up the stats entry for a message type, if it is a known type.
    pub fn message(&self, msg_type: MsgType) -> Option<&MessageStats> {
        self.msgs.get(&msg_type)
    }

    pub fn inc_received(&self, msg_type: MsgType) {
        if let Some(m) = self.msgs.get(&msg_type) {
            self.touch();
            m.inc_received();
        }
    }

    pub fn inc_timeout(&self, msg_type: MsgType) {
        if let Some(m) = self.msgs.get(&msg_type) {
            self.touch();
            m.inc_timeout();
        }
    }

    pub fn inc_sent(&self, msg_type: MsgType, attempt: usize) {
        if let Some(m) = self.msgs.get(&msg_type) {
            self.touch();
            m.inc_sent(attempt);
        }
    }

    /// Zero every counter (the table itself is untouched).
    pub fn reset(&self) {
        for m in self.msgs.values() {
            m.reset();
        }
    }

    /// Message types in numeric order, for deterministic snapshot output.
    fn sorted_types(&self) -> Vec<MsgType> {
        let mut types: Vec<_> = self.msgs.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

// ===========================================================================
// JSON snapshot
// ===========================================================================

/// Render the statistics document for a set of local nodes.
///
/// Shape:
/// `{"local_nodes":[{"local_address":...,"remote_nodes":[{"remote_address":...,
/// "last_activity":...,"messages":{<name>:{"id":...,"received":...,
/// "timeout":...,"sent":[...]}}}]}]}`
///
/// Remote nodes are sorted by address string.
pub fn collect_json(locals: &[Arc<LocalNode>]) -> String {
    let mut sorted_locals: Vec<_> = locals.to_vec();
    sorted_locals.sort_by_key(|ln| ln.ip_key().to_string());

    let locals_json: Vec<String> = sorted_locals
        .iter()
        .map(|ln| {
            let mut remotes = ln.remote_nodes();
            remotes.sort_by_key(|rn| rn.ip_key().to_string());

            let remotes_json: Vec<String> = remotes
                .iter()
                .map(|rn| {
                    let stats = rn.stats();
                    let msgs_json: Vec<String> = stats
                        .sorted_types()
                        .iter()
                        .filter_map(|mt| stats.message(*mt))
                        .map(|m| {
                            let sent: Vec<String> =
                                m.sent().iter().map(u32::to_string).collect();
                            format!(
                                r#""{}":{{"id":{},"received":{},"timeout":{},"sent":[{}]}}"#,
                                m.name(),
                                m.id(),
                                m.received(),
                                m.timeout(),
                                sent.join(",")
                            )
                        })
                        .collect();

                    format!(
                        r#"{{"remote_address":"{}","last_activity":"{}","messages":{{{}}}}}"#,
                        rn.ip_key(),
                        format_timestamp(stats.last_activity()),
                        msgs_json.join(",")
                    )
                })
                .collect();

            format!(
                r#"{{"local_address":"{}","remote_nodes":[{}]}}"#,
                ln.ip_key(),
                remotes_json.join(",")
            )
        })
        .collect();

    format!(r#"{{"local_nodes":[{}]}}"#, locals_json.join(","))
}

/// Zero the counters of every remote under the given local nodes.
pub fn reset_all(locals: &[Arc<LocalNode>]) {
    for ln in locals {
        for rn in ln.remote_nodes() {
            rn.stats().reset();
        }
    }
}

// ===========================================================================
// Timestamp formatting (ISO 8601, UTC, millisecond precision)
// ===========================================================================

/// Format a `SystemTime` as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(ts: SystemTime) -> String {
    let since_epoch = ts.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let secs = since_epoch.as_secs();
    let millis = since_epoch.subsec_millis();

    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = days_to_date(days);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60,
        millis
    )
}

/// Convert days since the Unix epoch to a calendar date.
fn days_to_date(days: u64) -> (u32, u32, u32) {
    let mut year = 1970u32;
    let mut remaining = days;

    loop {
        let in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining < in_year {
            break;
        }
        remaining -= in_year;
        year += 1;
    }

    let per_month: [u64; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1u32;
    for &in_month in &per_month {
        if remaining < in_month {
            break;
        }
        remaining -= in_month;
        month += 1;
    }

    (year, month, remaining as u32 + 1)
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

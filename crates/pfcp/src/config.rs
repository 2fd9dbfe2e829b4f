// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PFCP stack configuration - single source of truth.
//!
//! All tunables of the stack live here; nothing is hardcoded in the stages.
//! The configuration is captured once at [`Stack::start`](crate::Stack::start)
//! and is immutable afterwards.
//!
//! Defaults follow TS 29.244 practice: IANA port 8805, T1 = 3 s / N1 = 2 for
//! ordinary requests, a slower and more patient 5 s / 3 for heartbeats, and a
//! 10 x 6 s activity ring (one heartbeat per minute of silence).

use crate::error::{Error, Result};
use std::time::Duration;

/// IANA-assigned PFCP UDP port (TS 29.244 Sec.5.1).
pub const PFCP_PORT: u16 = 8805;

/// Default SO_RCVBUF / SO_SNDBUF size (2 MiB).
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Default retransmit interval T1 (milliseconds).
pub const DEFAULT_T1_MS: u64 = 3_000;

/// Default heartbeat retransmit interval (milliseconds).
pub const DEFAULT_HEARTBEAT_T1_MS: u64 = 5_000;

/// Default maximum send attempts N1 (including the original transmission).
pub const DEFAULT_N1: u32 = 2;

/// Default maximum heartbeat send attempts.
pub const DEFAULT_HEARTBEAT_N1: u32 = 3;

/// Default number of activity windows per remote.
pub const DEFAULT_NBR_ACTIVITY_WNDS: usize = 10;

/// Default length of one activity window (milliseconds).
///
/// With the default ring of 10 windows a peer is considered idle after
/// 60 seconds of silence.
pub const DEFAULT_LEN_ACTIVITY_WND_MS: u64 = 6_000;

/// Largest receive buffer the stack hands to `recv_from`.
///
/// PFCP message length is a u16 counting bytes after the length field, so a
/// full 64 KiB buffer covers any legal message.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Runtime configuration for a PFCP [`Stack`](crate::Stack).
///
/// Construct with [`Config::default`] and adjust fields, then validate via
/// [`Config::validate`] (done automatically at stack start).
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP port local nodes bind and remote nodes are addressed on.
    pub port: u16,
    /// SO_RCVBUF / SO_SNDBUF for every node socket.
    pub socket_buffer_size: usize,
    /// Retransmit interval for ordinary requests (milliseconds).
    pub t1_ms: u64,
    /// Retransmit interval for heartbeat requests (milliseconds).
    pub heartbeat_t1_ms: u64,
    /// Send attempts for ordinary requests, including the original.
    pub n1: u32,
    /// Send attempts for heartbeat requests.
    pub heartbeat_n1: u32,
    /// Number of windows in each remote's activity ring.
    pub nbr_activity_wnds: usize,
    /// Rotation cadence of the activity ring (milliseconds).
    pub len_activity_wnd_ms: u64,
    /// Width of the TEID range prefix handed to peers (0..=7 bits).
    pub teid_range_bits: u8,
    /// Whether TEID range values are handed out at all.
    pub assign_teid_range: bool,
    /// Lower bound of the application worker pool.
    pub min_application_workers: usize,
    /// Upper bound of the application worker pool.
    pub max_application_workers: usize,
    /// Reserved: the translation stage is currently single-threaded.
    pub min_translator_workers: usize,
    /// Reserved: the translation stage is currently single-threaded.
    pub max_translator_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: PFCP_PORT,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            t1_ms: DEFAULT_T1_MS,
            heartbeat_t1_ms: DEFAULT_HEARTBEAT_T1_MS,
            n1: DEFAULT_N1,
            heartbeat_n1: DEFAULT_HEARTBEAT_N1,
            nbr_activity_wnds: DEFAULT_NBR_ACTIVITY_WNDS,
            len_activity_wnd_ms: DEFAULT_LEN_ACTIVITY_WND_MS,
            teid_range_bits: 0,
            assign_teid_range: false,
            min_application_workers: 1,
            max_application_workers: 1,
            min_translator_workers: 1,
            max_translator_workers: 1,
        }
    }
}

impl Config {
    /// Retransmit interval for ordinary requests.
    pub fn t1(&self) -> Duration {
        Duration::from_millis(self.t1_ms)
    }

    /// Retransmit interval for heartbeat requests.
    pub fn heartbeat_t1(&self) -> Duration {
        Duration::from_millis(self.heartbeat_t1_ms)
    }

    /// Rotation cadence of the activity ring.
    pub fn len_activity_wnd(&self) -> Duration {
        Duration::from_millis(self.len_activity_wnd_ms)
    }

    /// Response-window flip interval: `max(t1, heartbeat_t1) * max(n1, heartbeat_n1)`.
    ///
    /// Any outstanding request/response bookkeeping entry is reaped at most
    /// two flips after its last touch, bounding memory for stragglers.
    pub fn max_rsp_wait(&self) -> Duration {
        let t1 = self.t1_ms.max(self.heartbeat_t1_ms);
        let n1 = u64::from(self.n1.max(self.heartbeat_n1));
        Duration::from_millis(t1 * n1)
    }

    /// Length of the per-message `sent` attempt counter array.
    pub fn max_attempts(&self) -> usize {
        self.n1.max(self.heartbeat_n1) as usize
    }

    /// Number of application worker threads the stack spawns.
    pub fn application_workers(&self) -> usize {
        self.max_application_workers.max(self.min_application_workers).max(1)
    }

    /// Check configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.teid_range_bits > 7 {
            return Err(Error::Config(format!(
                "teid_range_bits must be 0..=7, got {}",
                self.teid_range_bits
            )));
        }
        if self.n1 == 0 || self.heartbeat_n1 == 0 {
            return Err(Error::Config("n1 and heartbeat_n1 must be >= 1".into()));
        }
        if self.t1_ms == 0 || self.heartbeat_t1_ms == 0 {
            return Err(Error::Config("t1 and heartbeat_t1 must be non-zero".into()));
        }
        if self.nbr_activity_wnds == 0 || self.len_activity_wnd_ms == 0 {
            return Err(Error::Config("activity window ring must be non-empty".into()));
        }
        if self.min_application_workers > self.max_application_workers {
            return Err(Error::Config(format!(
                "min_application_workers ({}) > max_application_workers ({})",
                self.min_application_workers, self.max_application_workers
            )));
        }
        Ok(())
    }
}

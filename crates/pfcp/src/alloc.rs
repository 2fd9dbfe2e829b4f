// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sequence-number and SEID allocators.
//!
//! Both are lock-free monotonic counters, one pair per local node. Neither
//! tracks frees: a released identifier is simply never reused within the
//! window where it could collide (the response-window GC bounds the lifetime
//! of any bookkeeping keyed by it), so `free` is a no-op.

use crate::proto::{Seid, SeqNbr, SEQUENCE_MAX};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Allocates PFCP request sequence numbers for one local node.
///
/// Values are handed out in increasing order starting at 0 and wrap to 0
/// once the 24-bit wire field is exhausted. Thread-safe; multiple
/// application threads may allocate concurrently.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU32,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU32::new(0) }
    }

    /// Hand out the next sequence number, wrapping past [`SEQUENCE_MAX`].
    pub fn alloc(&self) -> SeqNbr {
        let mut cur = self.next.load(Ordering::Relaxed);
        loop {
            let sn = if cur > SEQUENCE_MAX { 0 } else { cur };
            match self.next.compare_exchange_weak(
                cur,
                sn.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return sn,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Release a sequence number. Nothing to do; window GC reclaims state.
    pub fn free(&self, _sn: SeqNbr) {}
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates SEIDs (session endpoint identifiers) for one local node.
///
/// Values start at 1 and skip 0 on any rollover: 0 on the wire means
/// "no SEID assigned yet".
#[derive(Debug)]
pub struct SeidAllocator {
    next: AtomicU64,
}

impl SeidAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Hand out the next SEID, never returning 0.
    pub fn alloc(&self) -> Seid {
        loop {
            let seid = self.next.fetch_add(1, Ordering::Relaxed);
            if seid != 0 {
                return seid;
            }
        }
    }

    /// Release a SEID. Nothing to do.
    pub fn free(&self, _seid: Seid) {}
}

impl Default for SeidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

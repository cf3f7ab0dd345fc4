// src/runtime/load_balancer.rs
//! Lock-free load balancing across the interpreter pool
//!
//! Picks which interpreter instance services the next load-balanced
//! session. Strong preference for an entirely idle slot, falling back to
//! a least-loaded heuristic; never blocks: under contention it degrades
//! to sharing a busy interpreter rather than waiting.
//!
//! Each slot carries an atomic usage counter (number of sessions
//! currently using that interpreter). `acquire` scans from a thread-local
//! rotating offset so threads don't herd on slot 0, trying a
//! compare-and-swap of 0 → 1 on each slot: the first hit is guaranteed
//! idle at the moment of acquisition. A full scan with no idle slot
//! falls back to incrementing the smallest counter observed during the
//! scan, a heuristic only, since the true load may have moved.

use crossbeam::utils::CachePadded;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    // Persists across acquire calls so successive scans from the same
    // thread start at different slots.
    static SCAN_START: Cell<usize> = Cell::new(0);
}

/// Lock-free slot allocator over a fixed pool.
pub struct LoadBalancer {
    uses: Vec<CachePadded<AtomicU64>>,
}

impl LoadBalancer {
    /// Create a balancer for a pool of `n` slots.
    pub fn new(n: usize) -> Self {
        let uses = (0..n)
            .map(|_| CachePadded::new(AtomicU64::new(0)))
            .collect();
        Self { uses }
    }

    /// Pick a slot and mark it used. Every successful `acquire` must be
    /// matched by exactly one [`free`](Self::free), or the counter
    /// permanently overstates that slot's load.
    pub fn acquire(&self) -> usize {
        let n = self.uses.len();
        SCAN_START.with(|start| {
            let mut idx = start.get();
            let mut min_users = u64::MAX;
            let mut min_idx = 0;
            for _ in 0..n {
                if idx >= n {
                    idx = 0;
                }
                match self.uses[idx].compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst) {
                    Ok(_) => {
                        // Fast path: this interpreter had no users.
                        start.set(idx);
                        return idx;
                    }
                    Err(observed) => {
                        // Ties break to the first-seen minimum in scan
                        // order.
                        if observed < min_users {
                            min_users = observed;
                            min_idx = idx;
                        }
                    }
                }
                idx += 1;
            }
            start.set(idx);
            // No idle interpreter; pile onto the least-loaded one we
            // saw. The count may have changed since: an accepted
            // throughput trade-off, not a correctness violation.
            self.uses[min_idx].fetch_add(1, Ordering::SeqCst);
            min_idx
        })
    }

    /// Release a slot previously returned by [`acquire`](Self::acquire).
    pub fn free(&self, slot: usize) {
        let previous = self.uses[slot].fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "free without a matching acquire");
    }

    /// Number of slots.
    pub fn pool_size(&self) -> usize {
        self.uses.len()
    }

    /// Current usage count of one slot.
    pub fn users(&self, slot: usize) -> u64 {
        self.uses[slot].load(Ordering::SeqCst)
    }
}

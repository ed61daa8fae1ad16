//! Reordering buffer for swap transitions
//!
//! Events from two independently polled ledgers are not globally ordered:
//! a `SeekerPaid` can arrive before the `HolderPaid` it depends on. Diffs
//! that arrive early wait here, keyed by swap id, until their predecessors
//! have been applied or they grow older than the TTL.

use crate::swap::{Swap, SwapDiff, SwapId, SwapState};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

/// Default time an early diff may wait for its predecessors
pub const DEFAULT_QUEUE_TTL_SECS: i64 = 300;

/// A diff waiting for its turn
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub diff: SwapDiff,
    pub enqueued_at: DateTime<Utc>,
}

/// What the caller should do with a freshly received diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Directly follows the swap's state; apply now
    Process,
    /// Buffered until its predecessors arrive
    Queued,
    /// The swap has already reached or passed this state
    Stale,
}

impl EnqueueOutcome {
    pub fn can_process(self) -> bool {
        self == EnqueueOutcome::Process
    }
}

/// Per-swap buffers of out-of-order diffs, sorted by target state
pub struct SwapEventQueue {
    queues: DashMap<SwapId, Vec<QueuedEvent>>,
    ttl: Duration,
}

impl Default for SwapEventQueue {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_QUEUE_TTL_SECS))
    }
}

impl SwapEventQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            ttl,
        }
    }

    /// Classify a diff against the swap's current state, buffering it if early
    pub fn enqueue(&self, swap: &Swap, diff: &SwapDiff) -> EnqueueOutcome {
        self.enqueue_at(swap, diff, Utc::now())
    }

    pub fn enqueue_at(&self, swap: &Swap, diff: &SwapDiff, now: DateTime<Utc>) -> EnqueueOutcome {
        let target = diff.state();
        if swap.state.is_followed_by(target) {
            return EnqueueOutcome::Process;
        }
        if target <= swap.state {
            debug!(swap_id = %swap.id_hex(), state = %swap.state, diff = %target, "dropping stale diff");
            crate::metrics::record_event_stale(target);
            return EnqueueOutcome::Stale;
        }

        let mut queue = self.queues.entry(swap.id).or_default();
        match queue.binary_search_by_key(&target, |e| e.diff.state()) {
            Ok(_) => {
                debug!(swap_id = %swap.id_hex(), diff = %target, "diff already queued");
            }
            Err(pos) => {
                queue.insert(
                    pos,
                    QueuedEvent {
                        diff: diff.clone(),
                        enqueued_at: now,
                    },
                );
                debug!(
                    swap_id = %swap.id_hex(),
                    state = %swap.state,
                    diff = %target,
                    depth = queue.len(),
                    "queued out-of-order diff"
                );
                crate::metrics::record_event_queued(target);
            }
        }
        EnqueueOutcome::Queued
    }

    /// Take every buffered diff that now follows on from the swap's state.
    ///
    /// Returned diffs are in application order. Expired and stale entries are
    /// dropped along the way, and an emptied buffer is removed.
    pub fn process_queue(&self, swap: &Swap) -> Vec<SwapDiff> {
        self.process_queue_at(swap, Utc::now())
    }

    pub fn process_queue_at(&self, swap: &Swap, now: DateTime<Utc>) -> Vec<SwapDiff> {
        let mut ready = Vec::new();
        let Some(mut queue) = self.queues.get_mut(&swap.id) else {
            return ready;
        };

        let mut cursor: SwapState = swap.state;
        let ttl = self.ttl;
        queue.retain(|entry| {
            let target = entry.diff.state();
            if now - entry.enqueued_at > ttl {
                warn!(swap_id = %swap.id_hex(), diff = %target, "queued diff expired");
                return false;
            }
            if target <= cursor {
                return false;
            }
            if cursor.is_followed_by(target) {
                ready.push(entry.diff.clone());
                cursor = target;
                return false;
            }
            true
        });

        let empty = queue.is_empty();
        drop(queue);
        if empty {
            self.queues.remove_if(&swap.id, |_, q| q.is_empty());
        }
        ready
    }

    /// Drop expired entries across all swaps; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        self.queues.retain(|swap_id, queue| {
            let before = queue.len();
            queue.retain(|entry| now - entry.enqueued_at <= self.ttl);
            if queue.len() < before {
                warn!(swap_id = %hex::encode(swap_id), dropped = before - queue.len(), "purged expired diffs");
            }
            purged += before - queue.len();
            !queue.is_empty()
        });
        purged
    }

    /// Diffs buffered for one swap
    pub fn pending(&self, swap_id: &SwapId) -> usize {
        self.queues.get(swap_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Diffs buffered across all swaps
    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::tests::{full_diffs, swap_at};

    fn diff_for(state: SwapState) -> SwapDiff {
        full_diffs()
            .into_iter()
            .find(|d| d.state() == state)
            .unwrap()
    }

    #[test]
    fn test_out_of_order_diff_waits_for_predecessor() {
        let queue = SwapEventQueue::default();
        let mut swap = swap_at(SwapState::SeekerInvoiced);

        let seeker_paid = diff_for(SwapState::SeekerPaid);
        let holder_paid = diff_for(SwapState::HolderPaid);

        let outcome = queue.enqueue(&swap, &seeker_paid);
        assert_eq!(outcome, EnqueueOutcome::Queued);
        assert!(!outcome.can_process());
        assert_eq!(queue.pending(&swap.id), 1);

        assert!(queue.enqueue(&swap, &holder_paid).can_process());
        swap.update(&holder_paid).unwrap();

        let ready = queue.process_queue(&swap);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].state(), SwapState::SeekerPaid);
        for diff in &ready {
            swap.update(diff).unwrap();
        }
        assert_eq!(swap.state, SwapState::SeekerPaid);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stale_diffs_never_buffered() {
        let queue = SwapEventQueue::default();
        let swap = swap_at(SwapState::HolderPaid);

        for state in [SwapState::HolderInvoiced, SwapState::HolderPaid] {
            assert_eq!(queue.enqueue(&swap, &diff_for(state)), EnqueueOutcome::Stale);
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_chain_of_queued_diffs_released_in_order() {
        let queue = SwapEventQueue::default();
        let mut swap = swap_at(SwapState::HolderInvoiced);

        for state in [SwapState::HolderSettled, SwapState::HolderPaid, SwapState::SeekerPaid] {
            assert_eq!(queue.enqueue(&swap, &diff_for(state)), EnqueueOutcome::Queued);
        }
        // Duplicate is not buffered twice
        queue.enqueue(&swap, &diff_for(SwapState::HolderPaid));
        assert_eq!(queue.pending(&swap.id), 3);

        // Nothing follows on yet
        assert!(queue.process_queue(&swap).is_empty());

        swap.update(&diff_for(SwapState::SeekerInvoiced)).unwrap();
        let ready: Vec<SwapState> = queue.process_queue(&swap).iter().map(|d| d.state()).collect();
        assert_eq!(
            ready,
            vec![SwapState::HolderPaid, SwapState::SeekerPaid, SwapState::HolderSettled]
        );
        assert_eq!(queue.pending(&swap.id), 0);
    }

    #[test]
    fn test_gap_keeps_later_entries() {
        let queue = SwapEventQueue::default();
        let mut swap = swap_at(SwapState::HolderInvoiced);
        queue.enqueue(&swap, &diff_for(SwapState::HolderPaid));
        queue.enqueue(&swap, &diff_for(SwapState::HolderSettled));

        swap.update(&diff_for(SwapState::SeekerInvoiced)).unwrap();
        let ready = queue.process_queue(&swap);
        assert_eq!(ready.len(), 1);
        // HolderSettled still waits for SeekerPaid
        assert_eq!(queue.pending(&swap.id), 1);
    }

    #[test]
    fn test_expired_entries_dropped() {
        let queue = SwapEventQueue::new(Duration::seconds(300));
        let swap = swap_at(SwapState::HolderInvoiced);
        let then = Utc::now();
        queue.enqueue_at(&swap, &diff_for(SwapState::HolderPaid), then);

        let mut advanced = swap.clone();
        advanced.update(&diff_for(SwapState::SeekerInvoiced)).unwrap();
        let ready = queue.process_queue_at(&advanced, then + Duration::seconds(301));
        assert!(ready.is_empty());
        assert!(queue.is_empty());

        queue.enqueue_at(&swap, &diff_for(SwapState::SeekerPaid), then);
        assert_eq!(queue.purge_expired_at(then + Duration::seconds(100)), 0);
        assert_eq!(queue.purge_expired_at(then + Duration::seconds(400)), 1);
        assert!(queue.is_empty());
    }
}

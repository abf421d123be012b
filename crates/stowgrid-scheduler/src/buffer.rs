//! Storage buffer: pending bundles and parked decisions.
//!
//! A bundle passes through the buffer twice. It first waits in the pending
//! queue until a decision pass finds a pod for it. The resulting
//! [`Assignment`] is then parked on its pod until that pod's release rule
//! fires: either the parked volume reaches the pod's threshold share of its
//! capacity, or the oldest parked decision exceeds the pod's timeout.
//! Released assignments go to the commit listener.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;
use stow_core::{ItemBundle, PodId, SimTime};
use tracing::{debug, info};

/// A bundle committed to a pod.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub bundle: ItemBundle,
    pub pod: PodId,
    /// Class the pod was found in.
    pub class: usize,
    pub decided_at: SimTime,
}

/// Invoked once per released assignment, in release order.
pub type CommitListener = Box<dyn FnMut(&Assignment)>;

/// Release parameters of one pod at the time of a release pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseRule {
    /// Parked share of pod capacity that releases the pod's decisions.
    pub threshold: f64,
    /// Maximum age of the oldest parked decision, if any.
    pub timeout: Option<f64>,
    pub capacity: f64,
}

impl ReleaseRule {
    fn is_due(&self, parked_volume: f64, oldest: SimTime, now: SimTime) -> bool {
        if self.threshold <= 0.0 || self.capacity <= 0.0 {
            return true;
        }
        if parked_volume / self.capacity >= self.threshold {
            return true;
        }
        self.timeout.is_some_and(|timeout| now - oldest >= timeout)
    }
}

#[derive(Default)]
pub struct StorageBuffer {
    pending: VecDeque<ItemBundle>,
    /// Parked assignments per pod, in decision order. Never holds empty lists.
    parked: BTreeMap<PodId, Vec<Assignment>>,
    /// Set when something happened that may let a pending bundle through.
    needs_decision: bool,
    listener: Option<CommitListener>,
    released: u64,
}

impl fmt::Debug for StorageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBuffer")
            .field("pending", &self.pending.len())
            .field("parked", &self.parked_len())
            .field("needs_decision", &self.needs_decision)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl StorageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener that receives released assignments.
    pub fn with_commit_listener(mut self, listener: CommitListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_commit_listener(&mut self, listener: CommitListener) {
        self.listener = Some(listener);
    }

    // ── Pending ───────────────────────────────────────────────────

    pub fn push_pending(&mut self, bundle: ItemBundle) {
        debug!(bundle = %bundle.id, item = %bundle.item.id, quantity = bundle.quantity, "bundle pending");
        self.pending.push_back(bundle);
        self.needs_decision = true;
    }

    pub fn pending(&self) -> impl Iterator<Item = &ItemBundle> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Move the whole pending queue out for a decision pass.
    pub fn take_pending(&mut self) -> VecDeque<ItemBundle> {
        std::mem::take(&mut self.pending)
    }

    /// Put undecided bundles back in front of anything queued meanwhile.
    pub fn restore_pending(&mut self, mut undecided: VecDeque<ItemBundle>) {
        undecided.append(&mut self.pending);
        self.pending = undecided;
    }

    // ── Decision flag ─────────────────────────────────────────────

    pub fn needs_decision(&self) -> bool {
        self.needs_decision
    }

    pub fn mark_dirty(&mut self) {
        self.needs_decision = true;
    }

    pub fn mark_decided(&mut self) {
        self.needs_decision = false;
    }

    // ── Parked ────────────────────────────────────────────────────

    pub fn park(&mut self, assignment: Assignment) {
        self.parked.entry(assignment.pod).or_default().push(assignment);
    }

    pub fn parked_len(&self) -> usize {
        self.parked.values().map(Vec::len).sum()
    }

    pub fn parked_on(&self, pod: PodId) -> &[Assignment] {
        self.parked.get(&pod).map_or(&[], Vec::as_slice)
    }

    pub fn parked_volume(&self, pod: PodId) -> f64 {
        self.parked_on(pod).iter().map(|a| a.bundle.volume()).sum()
    }

    /// Assignments released since creation.
    pub fn released_total(&self) -> u64 {
        self.released
    }

    /// Release every pod whose rule is due at `now`.
    ///
    /// A pod's parked assignments are released together, in decision order;
    /// pods are visited by id.
    pub fn release_due<F>(&mut self, now: SimTime, mut rule_for: F) -> Vec<Assignment>
    where
        F: FnMut(PodId) -> ReleaseRule,
    {
        let due: Vec<PodId> = self
            .parked
            .iter()
            .filter(|(pod, parked)| {
                let volume: f64 = parked.iter().map(|a| a.bundle.volume()).sum();
                let oldest = oldest_decision(parked);
                rule_for(**pod).is_due(volume, oldest, now)
            })
            .map(|(pod, _)| *pod)
            .collect();

        let mut released = Vec::new();
        for pod in &due {
            if let Some(batch) = self.parked.remove(pod) {
                released.extend(batch);
            }
        }
        if released.is_empty() {
            return released;
        }

        if let Some(listener) = self.listener.as_mut() {
            for assignment in &released {
                listener(assignment);
            }
        }
        self.released += released.len() as u64;
        info!(now, pods = due.len(), bundles = released.len(), "buffered decisions released");
        released
    }

    /// Earliest time at which a timeout will release some pod.
    pub fn next_release_deadline<F>(&self, mut timeout_for: F) -> Option<SimTime>
    where
        F: FnMut(PodId) -> Option<f64>,
    {
        self.parked
            .iter()
            .filter_map(|(pod, parked)| timeout_for(*pod).map(|t| oldest_decision(parked) + t))
            .reduce(f64::min)
    }
}

fn oldest_decision(parked: &[Assignment]) -> SimTime {
    parked
        .iter()
        .map(|a| a.decided_at)
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use stow_core::{BundleId, ItemDescription, ItemId};

    fn make_bundle(id: u64, quantity: u32) -> ItemBundle {
        ItemBundle {
            id: BundleId(id),
            item: ItemDescription { id: ItemId(1), weight: 1.0 },
            quantity,
            arrival: 0.0,
        }
    }

    fn make_assignment(id: u64, pod: u32, quantity: u32, decided_at: SimTime) -> Assignment {
        Assignment {
            bundle: make_bundle(id, quantity),
            pod: PodId(pod),
            class: 0,
            decided_at,
        }
    }

    fn rule(threshold: f64, timeout: Option<f64>) -> ReleaseRule {
        ReleaseRule { threshold, timeout, capacity: 100.0 }
    }

    #[test]
    fn zero_threshold_releases_immediately() {
        let mut buffer = StorageBuffer::new();
        buffer.park(make_assignment(1, 1, 1, 0.0));

        let released = buffer.release_due(0.0, |_| rule(0.0, None));
        assert_eq!(released.len(), 1);
        assert_eq!(buffer.parked_len(), 0);
    }

    #[test]
    fn threshold_waits_for_enough_volume() {
        let mut buffer = StorageBuffer::new();
        buffer.park(make_assignment(1, 1, 10, 0.0));
        assert!(buffer.release_due(1.0, |_| rule(0.2, None)).is_empty());

        buffer.park(make_assignment(2, 1, 10, 1.0));
        let released = buffer.release_due(2.0, |_| rule(0.2, None));
        let ids: Vec<BundleId> = released.iter().map(|a| a.bundle.id).collect();
        assert_eq!(ids, vec![BundleId(1), BundleId(2)]);
    }

    #[test]
    fn timeout_counts_from_oldest_decision() {
        let mut buffer = StorageBuffer::new();
        buffer.park(make_assignment(1, 1, 1, 10.0));
        buffer.park(make_assignment(2, 1, 1, 40.0));

        assert_eq!(buffer.next_release_deadline(|_| Some(60.0)), Some(70.0));
        assert!(buffer.release_due(69.0, |_| rule(0.5, Some(60.0))).is_empty());
        assert_eq!(buffer.release_due(70.0, |_| rule(0.5, Some(60.0))).len(), 2);
        assert_eq!(buffer.next_release_deadline(|_| Some(60.0)), None);
    }

    #[test]
    fn rules_apply_per_pod() {
        let mut buffer = StorageBuffer::new();
        buffer.park(make_assignment(1, 1, 1, 0.0));
        buffer.park(make_assignment(2, 2, 1, 0.0));

        let released = buffer.release_due(0.0, |pod| {
            if pod == PodId(2) { rule(0.0, None) } else { rule(0.9, None) }
        });
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].pod, PodId(2));
        assert_eq!(buffer.parked_on(PodId(1)).len(), 1);
        assert_eq!(buffer.parked_volume(PodId(1)), 1.0);
    }

    #[test]
    fn listener_sees_every_release() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut buffer = StorageBuffer::new()
            .with_commit_listener(Box::new(move |a: &Assignment| sink.borrow_mut().push(a.bundle.id)));

        buffer.park(make_assignment(1, 3, 1, 0.0));
        buffer.park(make_assignment(2, 1, 1, 0.0));
        buffer.release_due(0.0, |_| rule(0.0, None));

        assert_eq!(*seen.borrow(), vec![BundleId(2), BundleId(1)]);
        assert_eq!(buffer.released_total(), 2);
    }

    #[test]
    fn assignment_encodes_as_a_commit_line() {
        let line = serde_json::to_string(&make_assignment(4, 2, 3, 12.5)).unwrap();
        assert!(line.contains(r#""pod":2"#));
        assert!(line.contains(r#""decided_at":12.5"#));
        assert!(line.contains(r#""quantity":3"#));
    }

    #[test]
    fn pending_is_fifo_and_flags_a_decision() {
        let mut buffer = StorageBuffer::new();
        assert!(!buffer.needs_decision());
        buffer.push_pending(make_bundle(1, 1));
        buffer.push_pending(make_bundle(2, 1));
        assert!(buffer.needs_decision());

        let mut taken = buffer.take_pending();
        buffer.mark_decided();
        let first = taken.pop_front().unwrap();
        assert_eq!(first.id, BundleId(1));

        buffer.push_pending(make_bundle(3, 1));
        buffer.restore_pending(taken);
        let order: Vec<BundleId> = buffer.pending().map(|b| b.id).collect();
        assert_eq!(order, vec![BundleId(2), BundleId(3)]);
    }
}

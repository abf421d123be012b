//! Bundle storage allocator: decides which pod each bundle goes to.
//!
//! The allocator is the control loop that:
//! - Queues arriving bundles and decides them in FIFO passes
//! - Searches classes around the bundle's desired class
//! - Reserves capacity on the chosen pod immediately
//! - Parks decisions until the pod's threshold or timeout releases them
//! - Seeds the initial inventory with a search that must succeed
//!
//! It owns no pod state. Every call receives the shared classifier, the
//! activity oracle and the ledger through an [`AllocationContext`].

use std::collections::VecDeque;

use rand::RngCore;
use stow_core::{BundleId, ItemBundle, ItemStorageConfig, PodId, SimTime, StationKind};
use stowgrid_placement::{
    ActivityOracle, ChoiceOptions, PodChooser, SearchScope, StorageClassifier,
};
use stowgrid_state::ReservationLedger;
use tracing::{debug, info, warn};

use crate::buffer::{Assignment, CommitListener, ReleaseRule, StorageBuffer};
use crate::error::{SchedulerError, SchedulerResult};

/// Collaborators borrowed for the duration of one allocator call.
pub struct AllocationContext<'a> {
    pub classifier: &'a StorageClassifier,
    pub activity: &'a dyn ActivityOracle,
    pub ledger: &'a mut dyn ReservationLedger,
}

impl AllocationContext<'_> {
    fn scope(&self) -> SearchScope<'_> {
        SearchScope {
            classifier: self.classifier,
            activity: self.activity,
            ledger: &*self.ledger,
        }
    }
}

/// How a search treats exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Decision passes: the bundle stays pending and is retried later.
    Retryable,
    /// Seeding: no pod fits, the run cannot start.
    MustSucceed,
}

pub struct BundleStorageAllocator {
    config: ItemStorageConfig,
    chooser: PodChooser,
    buffer: StorageBuffer,
    rng: Box<dyn RngCore>,
}

impl BundleStorageAllocator {
    /// Create an allocator and register its class layout with the shared
    /// classifier.
    pub fn new(
        config: &ItemStorageConfig,
        classifier: &mut StorageClassifier,
        rng: Box<dyn RngCore>,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        classifier.configure(
            &config.classes.class_borders,
            config.classes.reallocation_delay,
            config.classes.reallocation_batch_size,
        )?;
        Ok(Self {
            config: config.clone(),
            chooser: PodChooser::new(),
            buffer: StorageBuffer::new(),
            rng,
        })
    }

    /// Set the listener that receives released assignments.
    pub fn with_commit_listener(mut self, listener: CommitListener) -> Self {
        self.buffer.set_commit_listener(listener);
        self
    }

    pub fn config(&self) -> &ItemStorageConfig {
        &self.config
    }

    pub fn buffer(&self) -> &StorageBuffer {
        &self.buffer
    }

    // ── Events ────────────────────────────────────────────────────

    /// A bundle arrived and waits for a pod.
    pub fn enqueue(&mut self, bundle: ItemBundle) {
        self.buffer.push_pending(bundle);
    }

    /// A pod was handled at a station.
    ///
    /// Handling at an input station fills the pod, so it stops being a
    /// recycle candidate. Any handling may free or consume capacity, so the
    /// next decision pass runs.
    pub fn on_pod_handled(&mut self, pod: PodId, station: StationKind) {
        if station == StationKind::Input
            && let Some(class) = self.chooser.invalidate_pod(pod)
        {
            debug!(%pod, class, "recycle candidate dropped");
        }
        self.buffer.mark_dirty();
    }

    /// Capacity changed outside the allocator's knowledge; decide again.
    pub fn force_decision(&mut self) {
        self.buffer.mark_dirty();
    }

    /// Time hook of the storage policy. Fixed storage does not react to time.
    pub fn signal_current_time(&mut self, _now: SimTime) {}

    // ── Decisions ─────────────────────────────────────────────────

    pub fn needs_decision(&self) -> bool {
        self.buffer.needs_decision()
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.pending_len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ItemBundle> {
        self.buffer.pending()
    }

    /// Decide every pending bundle in arrival order.
    ///
    /// Placed bundles get their capacity reserved and are parked on their
    /// pod. Bundles that fit nowhere stay pending in their original order.
    /// Returns the number of bundles placed; a pass with nothing new to
    /// consider is skipped.
    pub fn decide_pending(&mut self, now: SimTime, ctx: &mut AllocationContext<'_>) -> SchedulerResult<usize> {
        if !self.buffer.needs_decision() {
            return Ok(0);
        }
        self.buffer.mark_decided();

        let mut waiting = self.buffer.take_pending();
        let mut undecided = VecDeque::with_capacity(waiting.len());
        let mut placed = 0;
        while let Some(bundle) = waiting.pop_front() {
            match self.place(&bundle, now, ctx) {
                Ok(true) => placed += 1,
                Ok(false) => undecided.push_back(bundle),
                Err(e) => {
                    undecided.push_back(bundle);
                    undecided.append(&mut waiting);
                    self.buffer.restore_pending(undecided);
                    self.buffer.mark_dirty();
                    return Err(e);
                }
            }
        }

        if !undecided.is_empty() {
            debug!(placed, waiting = undecided.len(), "bundles left pending");
        }
        self.buffer.restore_pending(undecided);
        Ok(placed)
    }

    fn place(&mut self, bundle: &ItemBundle, now: SimTime, ctx: &mut AllocationContext<'_>) -> SchedulerResult<bool> {
        let Some((pod, class)) = self.search_retryable(bundle, ctx) else {
            return Ok(false);
        };
        ctx.ledger.reserve(pod, bundle)?;
        self.buffer.park(Assignment {
            bundle: bundle.clone(),
            pod,
            class,
            decided_at: now,
        });
        debug!(bundle = %bundle.id, %pod, class, "bundle decided");
        Ok(true)
    }

    /// Choose a pod for a bundle, failing when none fits.
    ///
    /// Nothing is reserved; callers decide what to do with the pod.
    pub fn choose_pod(&mut self, bundle: &ItemBundle, ctx: &AllocationContext<'_>) -> SchedulerResult<PodId> {
        self.search_must_succeed(bundle, ctx).map(|(pod, _)| pod)
    }

    /// Store the initial inventory, bundle by bundle.
    ///
    /// Stops at the first bundle that fits nowhere.
    pub fn seed<I>(&mut self, bundles: I, ctx: &mut AllocationContext<'_>) -> SchedulerResult<Vec<(BundleId, PodId)>>
    where
        I: IntoIterator<Item = ItemBundle>,
    {
        let mut stored = Vec::new();
        for bundle in bundles {
            let pod = self.choose_pod(&bundle, ctx)?;
            ctx.ledger.store(pod, &bundle)?;
            stored.push((bundle.id, pod));
        }
        info!(bundles = stored.len(), "initial inventory seeded");
        Ok(stored)
    }

    /// Decision-pass search. Exhaustion leaves the bundle pending.
    fn search_retryable(&mut self, bundle: &ItemBundle, ctx: &AllocationContext<'_>) -> Option<(PodId, usize)> {
        let found = self.search(bundle, SearchMode::Retryable, ctx);
        if found.is_none() {
            debug!(bundle = %bundle.id, "no pod fits, bundle stays pending");
        }
        found
    }

    /// Seeding search. Exhaustion is an error.
    fn search_must_succeed(
        &mut self,
        bundle: &ItemBundle,
        ctx: &AllocationContext<'_>,
    ) -> SchedulerResult<(PodId, usize)> {
        self.search(bundle, SearchMode::MustSucceed, ctx).ok_or_else(|| {
            let desired = ctx.classifier.class_of_bundle(bundle, ctx.activity);
            warn!(bundle = %bundle.id, desired, volume = bundle.volume(), "no pod fits the seeded bundle");
            SchedulerError::AllocationExhausted {
                bundle: bundle.id,
                desired_class: desired,
            }
        })
    }

    /// Expanding-ring search around the bundle's desired class.
    fn search(&mut self, bundle: &ItemBundle, mode: SearchMode, ctx: &AllocationContext<'_>) -> Option<(PodId, usize)> {
        let options = self.options_for(mode);
        let desired = ctx.classifier.class_of_bundle(bundle, ctx.activity);
        let scope = ctx.scope();
        self.chooser.search(&scope, desired, bundle, options, self.rng.as_mut())
    }

    fn options_for(&self, mode: SearchMode) -> ChoiceOptions {
        match mode {
            SearchMode::Retryable => ChoiceOptions {
                tie_break: self.config.running_tie_break,
                recycle: self.config.recycle_while_running,
            },
            SearchMode::MustSucceed => ChoiceOptions {
                tie_break: self.config.seeding_tie_break,
                recycle: true,
            },
        }
    }

    // ── Release ───────────────────────────────────────────────────

    /// Release threshold of a pod, by the pod's current class.
    pub fn buffer_threshold(&self, pod: PodId, classifier: &StorageClassifier, activity: &dyn ActivityOracle) -> f64 {
        let class = classifier.class_of_pod(pod, activity);
        per_class(&self.config.buffer_threshold_per_class, class).unwrap_or(0.0)
    }

    /// Release timeout of a pod, by the pod's current class.
    pub fn buffer_timeout(
        &self,
        pod: PodId,
        classifier: &StorageClassifier,
        activity: &dyn ActivityOracle,
    ) -> Option<f64> {
        let class = classifier.class_of_pod(pod, activity);
        per_class(&self.config.buffer_timeout_per_class, class)
    }

    /// Release parked decisions whose pod threshold or timeout is reached.
    pub fn release_due(&mut self, now: SimTime, ctx: &AllocationContext<'_>) -> Vec<Assignment> {
        let config = &self.config;
        self.buffer.release_due(now, |pod| {
            let class = ctx.classifier.class_of_pod(pod, ctx.activity);
            ReleaseRule {
                threshold: per_class(&config.buffer_threshold_per_class, class).unwrap_or(0.0),
                timeout: per_class(&config.buffer_timeout_per_class, class),
                capacity: ctx.ledger.pod(pod).map_or(0.0, |record| record.capacity),
            }
        })
    }

    /// When the next timeout-driven release is due.
    pub fn next_release_deadline(&self, classifier: &StorageClassifier, activity: &dyn ActivityOracle) -> Option<SimTime> {
        self.buffer
            .next_release_deadline(|pod| self.buffer_timeout(pod, classifier, activity))
    }

    // ── Instrumentation ───────────────────────────────────────────

    pub fn scan_count(&self, class: usize) -> u64 {
        self.chooser.scan_count(class)
    }

    pub fn total_scans(&self) -> u64 {
        self.chooser.total_scans()
    }

    pub fn recycle_count(&self) -> u64 {
        self.chooser.recycle_count()
    }

    pub fn cached_pod(&self, class: usize) -> Option<PodId> {
        self.chooser.cache().get(class)
    }
}

fn per_class(values: &[f64], class: usize) -> Option<f64> {
    values.get(class).copied()
}

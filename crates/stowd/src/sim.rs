//! Simulation: replays a scenario through the storage core.
//!
//! The simulation plays the part of the surrounding engine:
//! - Binds pods to their storage waypoints and seeds the initial inventory
//! - Applies reallocation batches as simulated time advances
//! - Runs a decision pass after every event that may unblock bundles
//! - Releases parked decisions on threshold, or on timeout deadlines
//!   that fall between two events
//! - Completes released reservations when their pod reaches an input station

use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use stow_core::{BundleId, ItemBundle, ItemDescription, ItemId, PodId, SimTime, StationKind, StowConfig, WaypointIndex};
use stowgrid_placement::{ActivityTable, StorageClassifier};
use stowgrid_scheduler::{
    AllocationContext, Assignment, BundleStorageAllocator, CommitListener, PodLocationAllocator,
};
use stowgrid_state::{InMemoryLedger, PodRecord};
use tracing::{debug, info, warn};

use crate::scenario::{Scenario, ScenarioEvent, ScheduledEvent};

/// Activity rank used when the scenario gives none.
const DEFAULT_ACTIVITY: f64 = 0.5;

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub pods_bound: usize,
    pub seeded_bundles: usize,
    pub arrived: usize,
    pub committed: usize,
    /// Committed bundles physically stored at an input station.
    pub stored: usize,
    pub pending: usize,
    pub parked: usize,
    pub total_scans: u64,
    pub recycled: u64,
    pub end_time: SimTime,
}

pub struct Simulation {
    seed: u64,
    classifier: StorageClassifier,
    activity: ActivityTable,
    ledger: InMemoryLedger,
    bundles: BundleStorageAllocator,
    locations: PodLocationAllocator,
    items: HashMap<ItemId, ItemDescription>,
    /// Released bundles waiting for their pod at an input station.
    in_transit: BTreeMap<PodId, Vec<BundleId>>,
    committed: Vec<Assignment>,
    next_bundle: u64,
    seeded: usize,
    arrived: usize,
    stored: usize,
    now: SimTime,
}

impl Simulation {
    /// Build the facility, bind pod locations and seed the initial inventory.
    pub fn new(
        config: &StowConfig,
        scenario: &Scenario,
        seed: u64,
        listener: Option<CommitListener>,
    ) -> anyhow::Result<Self> {
        let mut activity = ActivityTable::new(scenario.default_activity.unwrap_or(DEFAULT_ACTIVITY));
        let mut ledger = InMemoryLedger::new();
        for pod in &scenario.pods {
            if let Some(rank) = pod.activity {
                activity.set_pod(pod.id, rank);
            }
            ledger.insert_pod(PodRecord::new(pod.id, pod.capacity, pod.position()))?;
        }
        let mut items = HashMap::new();
        for item in &scenario.items {
            if let Some(rank) = item.activity {
                activity.set_item(item.id, rank);
            }
            items.insert(item.id, ItemDescription { id: item.id, weight: item.weight });
        }
        let waypoints: WaypointIndex = scenario.waypoints.iter().map(|w| (w.id, w.position())).collect();

        let mut classifier = StorageClassifier::new();
        let mut bundles =
            BundleStorageAllocator::new(&config.item_storage, &mut classifier, Box::new(StdRng::seed_from_u64(seed)))
                .context("setting up bundle storage")?;
        if let Some(listener) = listener {
            bundles = bundles.with_commit_listener(listener);
        }
        let mut locations =
            PodLocationAllocator::new(&config.pod_storage, &mut classifier).context("setting up pod storage")?;
        classifier.register_pods(scenario.pods.iter().map(|p| p.id), &activity);

        locations
            .bind_all(
                scenario.pods.iter().map(|p| (p.id, p.position())),
                &waypoints,
                &mut ledger,
            )
            .context("binding pod storage locations")?;

        let mut sim = Self {
            seed,
            classifier,
            activity,
            ledger,
            bundles,
            locations,
            items,
            in_transit: BTreeMap::new(),
            committed: Vec::new(),
            next_bundle: 1,
            seeded: 0,
            arrived: 0,
            stored: 0,
            now: 0.0,
        };
        sim.seed_inventory(scenario)?;
        info!(seed, pods = sim.locations.len(), seeded = sim.seeded, "simulation ready");
        Ok(sim)
    }

    fn seed_inventory(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        let mut stock = Vec::with_capacity(scenario.initial_inventory.len());
        for entry in &scenario.initial_inventory {
            let bundle = self.make_bundle(entry.item, entry.quantity, 0.0)?;
            stock.push(bundle);
        }
        let mut ctx = AllocationContext {
            classifier: &self.classifier,
            activity: &self.activity,
            ledger: &mut self.ledger,
        };
        let seeded = self
            .bundles
            .seed(stock, &mut ctx)
            .context("seeding the initial inventory")?;
        self.seeded = seeded.len();
        Ok(())
    }

    fn make_bundle(&mut self, item: ItemId, quantity: u32, arrival: SimTime) -> anyhow::Result<ItemBundle> {
        let description = *self
            .items
            .get(&item)
            .with_context(|| format!("unknown {item}"))?;
        let id = BundleId(self.next_bundle);
        self.next_bundle += 1;
        Ok(ItemBundle {
            id,
            item: description,
            quantity,
            arrival,
        })
    }

    /// Replay the scenario's events and flush the remaining timeouts.
    pub fn run(&mut self, scenario: &Scenario) -> anyhow::Result<RunSummary> {
        for scheduled in scenario.timeline() {
            self.step(scheduled)?;
        }
        self.flush();
        Ok(self.summary())
    }

    /// Advance to the event's time, apply it and decide.
    pub fn step(&mut self, scheduled: ScheduledEvent) -> anyhow::Result<()> {
        let now = scheduled.at.max(self.now);
        self.advance_to(now);
        self.apply(scheduled.event, now)?;
        self.decide(now)
    }

    fn advance_to(&mut self, now: SimTime) {
        while let Some(deadline) = self.bundles.next_release_deadline(&self.classifier, &self.activity)
            && deadline <= now
        {
            if self.release(deadline.max(self.now)) == 0 {
                break;
            }
        }
        self.now = now;
        let moved = self.classifier.reallocate(now, &self.activity);
        if moved > 0 {
            debug!(now, moved, "pods changed class");
        }
        self.bundles.signal_current_time(now);
        self.locations.signal_current_time(now);
    }

    fn apply(&mut self, event: ScenarioEvent, now: SimTime) -> anyhow::Result<()> {
        match event {
            ScenarioEvent::Arrival { item, quantity } => {
                let bundle = self.make_bundle(item, quantity, now)?;
                self.arrived += 1;
                self.bundles.enqueue(bundle);
            }
            ScenarioEvent::PodHandled { pod, station, picks } => {
                match station {
                    StationKind::Input => {
                        for bundle in self.in_transit.remove(&pod).unwrap_or_default() {
                            self.ledger
                                .complete(bundle)
                                .with_context(|| format!("storing {bundle} in {pod}"))?;
                            self.stored += 1;
                        }
                    }
                    StationKind::Output => {
                        for pick in picks {
                            let weight = self.items.get(&pick.item).map_or(1.0, |d| d.weight);
                            if let Err(e) = self.ledger.pick(pod, pick.item, weight, pick.quantity) {
                                warn!(%pod, item = %pick.item, error = %e, "pick skipped");
                            }
                        }
                    }
                }
                self.bundles.on_pod_handled(pod, station);
            }
            ScenarioEvent::PodActivity { pod, activity } => self.activity.set_pod(pod, activity),
            ScenarioEvent::ItemActivity { item, activity } => self.activity.set_item(item, activity),
            ScenarioEvent::Tick => self.bundles.force_decision(),
        }
        Ok(())
    }

    fn decide(&mut self, now: SimTime) -> anyhow::Result<()> {
        if self.bundles.needs_decision() {
            let mut ctx = AllocationContext {
                classifier: &self.classifier,
                activity: &self.activity,
                ledger: &mut self.ledger,
            };
            self.bundles.decide_pending(now, &mut ctx)?;
        }
        self.release(now);
        Ok(())
    }

    fn release(&mut self, now: SimTime) -> usize {
        let ctx = AllocationContext {
            classifier: &self.classifier,
            activity: &self.activity,
            ledger: &mut self.ledger,
        };
        let released = self.bundles.release_due(now, &ctx);
        let count = released.len();
        for assignment in released {
            self.in_transit.entry(assignment.pod).or_default().push(assignment.bundle.id);
            self.committed.push(assignment);
        }
        count
    }

    /// Release everything still waiting on a timeout.
    fn flush(&mut self) {
        while let Some(deadline) = self.bundles.next_release_deadline(&self.classifier, &self.activity) {
            let at = deadline.max(self.now);
            if self.release(at) == 0 {
                break;
            }
            self.now = at;
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            seed: self.seed,
            pods_bound: self.locations.len(),
            seeded_bundles: self.seeded,
            arrived: self.arrived,
            committed: self.committed.len(),
            stored: self.stored,
            pending: self.bundles.pending_len(),
            parked: self.bundles.buffer().parked_len(),
            total_scans: self.bundles.total_scans(),
            recycled: self.bundles.recycle_count(),
            end_time: self.now,
        }
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn committed(&self) -> &[Assignment] {
        &self.committed
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    pub fn classifier(&self) -> &StorageClassifier {
        &self.classifier
    }

    pub fn allocator(&self) -> &BundleStorageAllocator {
        &self.bundles
    }

    pub fn locations(&self) -> &PodLocationAllocator {
        &self.locations
    }
}

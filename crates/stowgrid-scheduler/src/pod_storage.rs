//! Pod location allocator: one fixed storage waypoint per pod.
//!
//! At initialisation every pod is bound to the waypoint closest to its
//! starting position. Bound waypoints are forbidden as resting locations so
//! idle robots never park on a pod's home. Under the fixed policy a binding
//! only ends with an explicit [`PodLocationAllocator::unbind`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use stow_core::{PodId, PodStorageConfig, Position, SimTime, WaypointId, WaypointLocator};
use stowgrid_placement::StorageClassifier;
use stowgrid_state::ReservationLedger;
use tracing::{debug, info};

use crate::error::{SchedulerError, SchedulerResult};

/// A pod and its storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodBinding {
    pub pod: PodId,
    pub waypoint: WaypointId,
}

#[derive(Debug, Default)]
pub struct PodLocationAllocator {
    by_pod: BTreeMap<PodId, WaypointId>,
    by_waypoint: HashMap<WaypointId, PodId>,
}

impl PodLocationAllocator {
    /// Create the allocator and register its class layout with the shared
    /// classifier.
    pub fn new(config: &PodStorageConfig, classifier: &mut StorageClassifier) -> SchedulerResult<Self> {
        config.classes.validate()?;
        classifier.configure(
            &config.classes.class_borders,
            config.classes.reallocation_delay,
            config.classes.reallocation_batch_size,
        )?;
        Ok(Self::default())
    }

    /// Bind every pod to the waypoint nearest to its position.
    ///
    /// All bindings are computed before any is recorded, so a failure leaves
    /// the allocator and the ledger untouched. Afterwards each bound waypoint
    /// is forbidden for resting.
    pub fn bind_all<I>(
        &mut self,
        pods: I,
        locator: &dyn WaypointLocator,
        ledger: &mut dyn ReservationLedger,
    ) -> SchedulerResult<Vec<PodBinding>>
    where
        I: IntoIterator<Item = (PodId, Position)>,
    {
        let mut staged: Vec<PodBinding> = Vec::new();
        let mut claimed: HashMap<WaypointId, PodId> = HashMap::new();
        for (pod, position) in pods {
            if let Some(waypoint) = self.by_pod.get(&pod).copied().or_else(|| {
                staged.iter().find(|b| b.pod == pod).map(|b| b.waypoint)
            }) {
                return Err(SchedulerError::DuplicateBinding { pod, waypoint });
            }
            let waypoint = locator
                .closest_waypoint(&position)
                .ok_or(SchedulerError::NoWaypoint(pod))?;
            if let Some(holder) = self.by_waypoint.get(&waypoint).or_else(|| claimed.get(&waypoint)) {
                return Err(SchedulerError::WaypointTaken {
                    waypoint,
                    holder: *holder,
                    pod,
                });
            }
            claimed.insert(waypoint, pod);
            staged.push(PodBinding { pod, waypoint });
        }

        for binding in &staged {
            self.by_pod.insert(binding.pod, binding.waypoint);
            self.by_waypoint.insert(binding.waypoint, binding.pod);
            debug!(pod = %binding.pod, waypoint = %binding.waypoint, "pod bound");
        }
        for binding in &staged {
            ledger.forbid_rest_location(binding.waypoint);
        }
        info!(pods = staged.len(), "pod storage locations bound");
        Ok(staged)
    }

    /// Storage location of a pod.
    pub fn location_of(&self, pod: PodId) -> SchedulerResult<WaypointId> {
        self.by_pod
            .get(&pod)
            .copied()
            .ok_or(SchedulerError::UnboundPod(pod))
    }

    pub fn pod_at(&self, waypoint: WaypointId) -> Option<PodId> {
        self.by_waypoint.get(&waypoint).copied()
    }

    /// Release a pod's location and permit resting on it again.
    pub fn unbind(&mut self, pod: PodId, ledger: &mut dyn ReservationLedger) -> SchedulerResult<WaypointId> {
        let waypoint = self.by_pod.remove(&pod).ok_or(SchedulerError::UnboundPod(pod))?;
        self.by_waypoint.remove(&waypoint);
        ledger.permit_rest_location(waypoint);
        debug!(%pod, %waypoint, "pod unbound");
        Ok(waypoint)
    }

    /// All bindings ordered by pod id.
    pub fn bindings(&self) -> Vec<PodBinding> {
        self.by_pod
            .iter()
            .map(|(pod, waypoint)| PodBinding {
                pod: *pod,
                waypoint: *waypoint,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_pod.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pod.is_empty()
    }

    /// Time hook of the storage policy. Fixed locations never move.
    pub fn signal_current_time(&mut self, _now: SimTime) {}
}

//! Scheduler error types.

use stow_core::{BundleId, ConfigError, PodId, WaypointId};
use stowgrid_placement::PlacementError;
use stowgrid_state::LedgerError;
use thiserror::Error;

/// Errors that can occur while deciding or binding storage.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no pod can take {bundle} (desired class {desired_class})")]
    AllocationExhausted {
        bundle: BundleId,
        desired_class: usize,
    },

    #[error("pod has no storage location: {0}")]
    UnboundPod(PodId),

    #[error("pod {pod} is already bound to {waypoint}")]
    DuplicateBinding { pod: PodId, waypoint: WaypointId },

    #[error("waypoint {waypoint} is the location of {holder}, cannot bind {pod}")]
    WaypointTaken {
        waypoint: WaypointId,
        holder: PodId,
        pod: PodId,
    },

    #[error("no waypoint on the tier of {0}")]
    NoWaypoint(PodId),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

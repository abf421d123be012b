//! The reservation-ledger capability.

use stow_core::{ItemBundle, PodId, WaypointId};

use crate::error::LedgerResult;
use crate::types::PodRecord;

/// Shared resource authority for pod capacity and resting locations.
///
/// Allocators never touch pod or waypoint state directly. Every reservation
/// and every forbidden location goes through this trait so there is one
/// writer for both.
pub trait ReservationLedger {
    /// Current record of a pod.
    fn pod(&self, pod: PodId) -> Option<&PodRecord>;

    /// Whether the bundle still fits into the pod's free and reservable
    /// capacity.
    fn fits_for_reservation(&self, pod: PodId, bundle: &ItemBundle) -> bool {
        self.pod(pod).is_some_and(|record| record.fits(bundle.volume()))
    }

    /// Reserve capacity on `pod` for a bundle that is on its way.
    fn reserve(&mut self, pod: PodId, bundle: &ItemBundle) -> LedgerResult<()>;

    /// Put a bundle straight into a pod without a prior reservation.
    ///
    /// Used while seeding the initial inventory.
    fn store(&mut self, pod: PodId, bundle: &ItemBundle) -> LedgerResult<()>;

    /// Mark a waypoint as unusable for resting robots.
    fn forbid_rest_location(&mut self, waypoint: WaypointId);

    /// Undo [`forbid_rest_location`](Self::forbid_rest_location).
    fn permit_rest_location(&mut self, waypoint: WaypointId);

    fn is_rest_forbidden(&self, waypoint: WaypointId) -> bool;
}

//! InMemoryLedger: reference implementation of [`ReservationLedger`].
//!
//! Tracks pods, outstanding reservations keyed by bundle, and the set of
//! waypoints robots may not rest on. Besides the trait operations it offers
//! the engine-side transitions a simulator needs: completing a reservation
//! when the bundle is physically stored, cancelling one, and picking items
//! out of a pod.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use stow_core::{BundleId, ItemBundle, ItemId, PodId, WaypointId};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::ReservationLedger;
use crate::types::PodRecord;

/// Ledger backed by plain in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    pods: BTreeMap<PodId, PodRecord>,
    /// Outstanding reservations: bundle → (pod, bundle).
    reservations: HashMap<BundleId, (PodId, ItemBundle)>,
    forbidden_rest: BTreeSet<WaypointId>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Pods ──────────────────────────────────────────────────────

    /// Register a pod. Pods are created by the simulation setup.
    pub fn insert_pod(&mut self, record: PodRecord) -> LedgerResult<()> {
        if self.pods.contains_key(&record.id) {
            return Err(LedgerError::DuplicatePod(record.id));
        }
        debug!(pod = %record.id, capacity = record.capacity, "pod registered");
        self.pods.insert(record.id, record);
        Ok(())
    }

    /// All pods ordered by id.
    pub fn pods(&self) -> impl Iterator<Item = &PodRecord> {
        self.pods.values()
    }

    fn pod_mut(&mut self, pod: PodId) -> LedgerResult<&mut PodRecord> {
        self.pods.get_mut(&pod).ok_or(LedgerError::UnknownPod(pod))
    }

    // ── Reservations ──────────────────────────────────────────────

    /// The pod a bundle is reserved on, if any.
    pub fn reservation(&self, bundle: BundleId) -> Option<PodId> {
        self.reservations.get(&bundle).map(|(pod, _)| *pod)
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// The reserved bundle arrived at its pod: move its capacity from
    /// reserved to in use and add its units to the pod content.
    pub fn complete(&mut self, bundle: BundleId) -> LedgerResult<PodId> {
        let (pod, stored) = self
            .reservations
            .remove(&bundle)
            .ok_or(LedgerError::UnknownReservation(bundle))?;
        let record = self.pod_mut(pod)?;
        let volume = stored.volume();
        record.capacity_reserved = (record.capacity_reserved - volume).max(0.0);
        record.capacity_in_use += volume;
        *record.contents.entry(stored.item.id).or_insert(0) += stored.quantity;
        debug!(%bundle, %pod, volume, "reservation completed");
        Ok(pod)
    }

    /// Drop a reservation without storing anything.
    pub fn cancel(&mut self, bundle: BundleId) -> LedgerResult<PodId> {
        let (pod, stored) = self
            .reservations
            .remove(&bundle)
            .ok_or(LedgerError::UnknownReservation(bundle))?;
        let record = self.pod_mut(pod)?;
        record.capacity_reserved = (record.capacity_reserved - stored.volume()).max(0.0);
        debug!(%bundle, %pod, "reservation cancelled");
        Ok(pod)
    }

    /// Take `quantity` units of `item` out of a pod, freeing capacity.
    pub fn pick(&mut self, pod: PodId, item: ItemId, weight: f64, quantity: u32) -> LedgerResult<()> {
        let record = self.pod_mut(pod)?;
        let available = record.count_contained(item);
        if available < quantity {
            return Err(LedgerError::InsufficientStock { pod, item, available });
        }
        if available == quantity {
            record.contents.remove(&item);
        } else {
            record.contents.insert(item, available - quantity);
        }
        record.capacity_in_use = (record.capacity_in_use - weight * f64::from(quantity)).max(0.0);
        debug!(%pod, %item, quantity, "items picked");
        Ok(())
    }

    // ── Resting locations ─────────────────────────────────────────

    /// Forbidden resting locations ordered by id.
    pub fn forbidden_rest_locations(&self) -> impl Iterator<Item = WaypointId> + '_ {
        self.forbidden_rest.iter().copied()
    }
}

impl ReservationLedger for InMemoryLedger {
    fn pod(&self, pod: PodId) -> Option<&PodRecord> {
        self.pods.get(&pod)
    }

    fn reserve(&mut self, pod: PodId, bundle: &ItemBundle) -> LedgerResult<()> {
        if self.reservations.contains_key(&bundle.id) {
            return Err(LedgerError::DuplicateReservation(bundle.id));
        }
        let record = self.pod_mut(pod)?;
        let volume = bundle.volume();
        if !record.fits(volume) {
            return Err(LedgerError::InsufficientCapacity {
                pod,
                requested: volume,
                free: record.free_capacity(),
            });
        }
        record.capacity_reserved += volume;
        self.reservations.insert(bundle.id, (pod, bundle.clone()));
        debug!(bundle = %bundle.id, %pod, volume, "capacity reserved");
        Ok(())
    }

    fn store(&mut self, pod: PodId, bundle: &ItemBundle) -> LedgerResult<()> {
        let record = self.pod_mut(pod)?;
        let volume = bundle.volume();
        if !record.fits(volume) {
            return Err(LedgerError::InsufficientCapacity {
                pod,
                requested: volume,
                free: record.free_capacity(),
            });
        }
        record.capacity_in_use += volume;
        *record.contents.entry(bundle.item.id).or_insert(0) += bundle.quantity;
        debug!(bundle = %bundle.id, %pod, volume, "bundle stored");
        Ok(())
    }

    fn forbid_rest_location(&mut self, waypoint: WaypointId) {
        if self.forbidden_rest.insert(waypoint) {
            debug!(%waypoint, "resting forbidden");
        }
    }

    fn permit_rest_location(&mut self, waypoint: WaypointId) {
        if self.forbidden_rest.remove(&waypoint) {
            debug!(%waypoint, "resting permitted");
        }
    }

    fn is_rest_forbidden(&self, waypoint: WaypointId) -> bool {
        self.forbidden_rest.contains(&waypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stow_core::{ItemDescription, Position};

    fn test_ledger() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger
            .insert_pod(PodRecord::new(PodId(1), 10.0, Position::new(0, 0.0, 0.0)))
            .unwrap();
        ledger
    }

    fn bundle(id: u64, item: u32, quantity: u32) -> ItemBundle {
        ItemBundle {
            id: BundleId(id),
            item: ItemDescription { id: ItemId(item), weight: 1.0 },
            quantity,
            arrival: 0.0,
        }
    }

    #[test]
    fn reserve_increases_reserved_capacity() {
        let mut ledger = test_ledger();
        ledger.reserve(PodId(1), &bundle(1, 1, 4)).unwrap();

        let pod = ledger.pod(PodId(1)).unwrap();
        assert_eq!(pod.capacity_reserved, 4.0);
        assert_eq!(pod.capacity_in_use, 0.0);
        assert_eq!(ledger.reservation(BundleId(1)), Some(PodId(1)));
    }

    #[test]
    fn reserve_rejects_overbooking() {
        let mut ledger = test_ledger();
        ledger.reserve(PodId(1), &bundle(1, 1, 8)).unwrap();

        assert!(!ledger.fits_for_reservation(PodId(1), &bundle(2, 1, 3)));
        let err = ledger.reserve(PodId(1), &bundle(2, 1, 3)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCapacity { free, .. } if free == 2.0));
    }

    #[test]
    fn reserve_rejects_duplicate_bundle() {
        let mut ledger = test_ledger();
        ledger.reserve(PodId(1), &bundle(1, 1, 1)).unwrap();
        assert_eq!(
            ledger.reserve(PodId(1), &bundle(1, 1, 1)),
            Err(LedgerError::DuplicateReservation(BundleId(1)))
        );
    }

    #[test]
    fn complete_moves_reservation_into_content() {
        let mut ledger = test_ledger();
        ledger.reserve(PodId(1), &bundle(1, 3, 4)).unwrap();

        assert_eq!(ledger.complete(BundleId(1)), Ok(PodId(1)));
        let pod = ledger.pod(PodId(1)).unwrap();
        assert_eq!(pod.capacity_reserved, 0.0);
        assert_eq!(pod.capacity_in_use, 4.0);
        assert_eq!(pod.count_contained(ItemId(3)), 4);
        assert_eq!(ledger.reservation_count(), 0);
    }

    #[test]
    fn cancel_releases_capacity() {
        let mut ledger = test_ledger();
        ledger.reserve(PodId(1), &bundle(1, 3, 4)).unwrap();
        ledger.cancel(BundleId(1)).unwrap();
        assert_eq!(ledger.pod(PodId(1)).unwrap().capacity_reserved, 0.0);
        assert_eq!(ledger.cancel(BundleId(1)), Err(LedgerError::UnknownReservation(BundleId(1))));
    }

    #[test]
    fn pick_frees_capacity() {
        let mut ledger = test_ledger();
        ledger.store(PodId(1), &bundle(1, 3, 5)).unwrap();
        ledger.pick(PodId(1), ItemId(3), 1.0, 2).unwrap();

        let pod = ledger.pod(PodId(1)).unwrap();
        assert_eq!(pod.capacity_in_use, 3.0);
        assert_eq!(pod.count_contained(ItemId(3)), 3);

        let err = ledger.pick(PodId(1), ItemId(3), 1.0, 4).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientStock { pod: PodId(1), item: ItemId(3), available: 3 });
    }

    #[test]
    fn unknown_pod_is_reported() {
        let mut ledger = test_ledger();
        assert_eq!(
            ledger.reserve(PodId(9), &bundle(1, 1, 1)),
            Err(LedgerError::UnknownPod(PodId(9)))
        );
        assert!(!ledger.fits_for_reservation(PodId(9), &bundle(1, 1, 1)));
    }

    #[test]
    fn duplicate_pod_is_rejected() {
        let mut ledger = test_ledger();
        let err = ledger
            .insert_pod(PodRecord::new(PodId(1), 5.0, Position::new(0, 1.0, 1.0)))
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicatePod(PodId(1)));
    }

    #[test]
    fn rest_locations_can_be_forbidden_and_permitted() {
        let mut ledger = test_ledger();
        ledger.forbid_rest_location(WaypointId(4));
        ledger.forbid_rest_location(WaypointId(2));
        assert!(ledger.is_rest_forbidden(WaypointId(4)));
        assert_eq!(
            ledger.forbidden_rest_locations().collect::<Vec<_>>(),
            vec![WaypointId(2), WaypointId(4)]
        );

        ledger.permit_rest_location(WaypointId(4));
        assert!(!ledger.is_rest_forbidden(WaypointId(4)));
    }
}

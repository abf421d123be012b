//! Pod bookkeeping records held by the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stow_core::{ItemId, PodId, Position};

/// Capacity and content of a single pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub id: PodId,
    /// Total capacity of the pod.
    pub capacity: f64,
    /// Capacity occupied by stored items.
    pub capacity_in_use: f64,
    /// Capacity promised to bundles that are on their way.
    pub capacity_reserved: f64,
    /// Units stored per item type.
    pub contents: BTreeMap<ItemId, u32>,
    /// Initial physical location.
    pub position: Position,
}

impl PodRecord {
    pub fn new(id: PodId, capacity: f64, position: Position) -> Self {
        Self {
            id,
            capacity,
            capacity_in_use: 0.0,
            capacity_reserved: 0.0,
            contents: BTreeMap::new(),
            position,
        }
    }

    /// Capacity neither stored nor reserved.
    pub fn free_capacity(&self) -> f64 {
        (self.capacity - self.capacity_in_use - self.capacity_reserved).max(0.0)
    }

    /// `(used + reserved) / capacity`. A pod without capacity counts as full.
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity > 0.0 {
            (self.capacity_in_use + self.capacity_reserved) / self.capacity
        } else {
            1.0
        }
    }

    /// Whether `volume` more units of capacity can still be reserved.
    pub fn fits(&self, volume: f64) -> bool {
        self.capacity_in_use + self.capacity_reserved + volume <= self.capacity
    }

    pub fn count_contained(&self, item: ItemId) -> u32 {
        self.contents.get(&item).copied().unwrap_or(0)
    }

    pub fn is_contained(&self, item: ItemId) -> bool {
        self.count_contained(item) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pod(capacity: f64, used: f64, reserved: f64) -> PodRecord {
        let mut pod = PodRecord::new(PodId(1), capacity, Position::new(0, 0.0, 0.0));
        pod.capacity_in_use = used;
        pod.capacity_reserved = reserved;
        pod
    }

    #[test]
    fn fits_counts_reserved_capacity() {
        let pod = make_pod(10.0, 4.0, 3.0);
        assert!(pod.fits(3.0));
        assert!(!pod.fits(3.5));
        assert_eq!(pod.free_capacity(), 3.0);
    }

    #[test]
    fn fill_ratio_includes_reservations() {
        let pod = make_pod(10.0, 2.0, 3.0);
        assert_eq!(pod.fill_ratio(), 0.5);
    }

    #[test]
    fn zero_capacity_pod_is_full() {
        let pod = make_pod(0.0, 0.0, 0.0);
        assert_eq!(pod.fill_ratio(), 1.0);
        assert!(!pod.fits(0.1));
    }

    #[test]
    fn counts_contents_per_item() {
        let mut pod = make_pod(10.0, 0.0, 0.0);
        pod.contents.insert(ItemId(5), 3);
        assert!(pod.is_contained(ItemId(5)));
        assert_eq!(pod.count_contained(ItemId(5)), 3);
        assert!(!pod.is_contained(ItemId(6)));
    }
}

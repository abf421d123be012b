//! Activity classes for pods and bundles.
//!
//! Both storage policies share one [`StorageClassifier`]. Each of them calls
//! [`StorageClassifier::configure`] with its class layout; the first call
//! wins and every later call must supply the same layout.
//!
//! Activity is a normalized rank in `[0, 1]` where `0` is the busiest. The
//! class of a value `m` is the number of borders `b <= m`, so class 0 is the
//! busiest band:
//!
//! ```text
//! borders [0.3, 0.7]
//!   m < 0.3        -> class 0
//!   0.3 <= m < 0.7 -> class 1
//!   m >= 0.7       -> class 2
//! ```
//!
//! Pod membership is indexed and only moves in reallocation batches, so a
//! pod's class lags behind its activity by up to one reallocation cycle.

use std::collections::HashMap;
use std::fmt;

use stow_core::{ItemBundle, ItemId, PodId, SimTime};
use tracing::{debug, info};

use crate::error::{PlacementError, PlacementResult};

/// Source of activity ranks, owned by the surrounding simulator.
pub trait ActivityOracle {
    /// Activity rank of a pod, `0` = busiest.
    fn pod_activity(&self, pod: PodId) -> f64;
    /// Activity rank of an item type, `0` = busiest.
    fn item_activity(&self, item: ItemId) -> f64;
}

/// Activity ranks held in plain maps.
#[derive(Debug, Clone, Default)]
pub struct ActivityTable {
    pods: HashMap<PodId, f64>,
    items: HashMap<ItemId, f64>,
    /// Rank reported for pods and items without an entry.
    fallback: f64,
}

impl ActivityTable {
    pub fn new(fallback: f64) -> Self {
        Self {
            fallback,
            ..Self::default()
        }
    }

    pub fn set_pod(&mut self, pod: PodId, activity: f64) {
        self.pods.insert(pod, activity);
    }

    pub fn set_item(&mut self, item: ItemId, activity: f64) {
        self.items.insert(item, activity);
    }
}

impl ActivityOracle for ActivityTable {
    fn pod_activity(&self, pod: PodId) -> f64 {
        self.pods.get(&pod).copied().unwrap_or(self.fallback)
    }

    fn item_activity(&self, item: ItemId) -> f64 {
        self.items.get(&item).copied().unwrap_or(self.fallback)
    }
}

/// Validated class borders plus the reallocation schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLayout {
    borders: Vec<f64>,
    reallocation_delay: f64,
    reallocation_batch_size: usize,
}

impl ClassLayout {
    pub fn new(
        borders: &[f64],
        reallocation_delay: f64,
        reallocation_batch_size: usize,
    ) -> PlacementResult<Self> {
        if let Some(bad) = borders.iter().find(|b| !b.is_finite()) {
            return Err(PlacementError::InvalidBorders(format!("{bad} is not finite")));
        }
        if borders.windows(2).any(|w| w[0] > w[1]) {
            return Err(PlacementError::InvalidBorders(format!(
                "{borders:?} is not sorted ascending"
            )));
        }
        if !reallocation_delay.is_finite() || reallocation_delay < 0.0 {
            return Err(PlacementError::InvalidBorders(format!(
                "reallocation delay {reallocation_delay} must be a non-negative number"
            )));
        }
        Ok(Self {
            borders: borders.to_vec(),
            reallocation_delay,
            reallocation_batch_size,
        })
    }

    pub fn borders(&self) -> &[f64] {
        &self.borders
    }

    pub fn class_count(&self) -> usize {
        self.borders.len() + 1
    }

    pub fn reallocation_delay(&self) -> f64 {
        self.reallocation_delay
    }

    pub fn reallocation_batch_size(&self) -> usize {
        self.reallocation_batch_size
    }

    /// Class index of an activity rank.
    pub fn class_of(&self, activity: f64) -> usize {
        self.borders.partition_point(|border| *border <= activity)
    }
}

impl fmt::Display for ClassLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "borders {:?}, delay {}s, batch {}",
            self.borders, self.reallocation_delay, self.reallocation_batch_size
        )
    }
}

/// Shared partition of pods into activity classes.
#[derive(Debug, Default)]
pub struct StorageClassifier {
    layout: Option<ClassLayout>,
    /// Pods per class, sorted by id.
    members: Vec<Vec<PodId>>,
    class_by_pod: HashMap<PodId, usize>,
    /// Registration order; reallocation batches walk it round-robin.
    order: Vec<PodId>,
    cursor: usize,
    last_reallocation: Option<SimTime>,
}

impl StorageClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the class layout, or check that it matches the one already set.
    ///
    /// Configuring twice with the same values is a no-op. Pods registered
    /// before the first configuration are dropped from the index and must
    /// be registered again.
    pub fn configure(
        &mut self,
        borders: &[f64],
        reallocation_delay: f64,
        reallocation_batch_size: usize,
    ) -> PlacementResult<()> {
        let requested = ClassLayout::new(borders, reallocation_delay, reallocation_batch_size)?;
        match &self.layout {
            Some(existing) if *existing == requested => {
                debug!(layout = %existing, "class layout already configured");
                Ok(())
            }
            Some(existing) => Err(PlacementError::ConfigMismatch {
                existing: existing.to_string(),
                requested: requested.to_string(),
            }),
            None => {
                info!(layout = %requested, classes = requested.class_count(), "class layout configured");
                self.members = vec![Vec::new(); requested.class_count()];
                self.class_by_pod.clear();
                self.order.clear();
                self.cursor = 0;
                self.layout = Some(requested);
                Ok(())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Option<&ClassLayout> {
        self.layout.as_ref()
    }

    /// Number of classes. An unconfigured classifier has a single class.
    pub fn class_count(&self) -> usize {
        self.layout.as_ref().map_or(1, ClassLayout::class_count)
    }

    fn class_of_activity(&self, activity: f64) -> usize {
        self.layout.as_ref().map_or(0, |layout| layout.class_of(activity))
    }

    /// Current class of a pod.
    ///
    /// Indexed pods report the class of the last reallocation; unknown pods
    /// are classified from their current activity.
    pub fn class_of_pod(&self, pod: PodId, oracle: &dyn ActivityOracle) -> usize {
        match self.class_by_pod.get(&pod) {
            Some(class) => *class,
            None => self.class_of_activity(oracle.pod_activity(pod)),
        }
    }

    /// Desired class of a bundle, from its item's activity.
    pub fn class_of_bundle(&self, bundle: &ItemBundle, oracle: &dyn ActivityOracle) -> usize {
        self.class_of_activity(oracle.item_activity(bundle.item.id))
    }

    /// Current members of a class, sorted by pod id.
    pub fn pods_in_class(&self, class: usize) -> &[PodId] {
        self.members.get(class).map_or(&[], Vec::as_slice)
    }

    /// Like [`pods_in_class`](Self::pods_in_class) but rejects out-of-range classes.
    pub fn try_pods_in_class(&self, class: usize) -> PlacementResult<&[PodId]> {
        let class_count = self.class_count();
        if class >= class_count {
            return Err(PlacementError::UnknownClass { class, class_count });
        }
        Ok(self.pods_in_class(class))
    }

    pub fn indexed_pods(&self) -> usize {
        self.class_by_pod.len()
    }

    /// Add pods to the index, classifying each from its current activity.
    ///
    /// Pods already indexed are reclassified in place.
    pub fn register_pods<I>(&mut self, pods: I, oracle: &dyn ActivityOracle)
    where
        I: IntoIterator<Item = PodId>,
    {
        if self.members.is_empty() {
            self.members = vec![Vec::new(); self.class_count()];
        }
        for pod in pods {
            let class = self.class_of_activity(oracle.pod_activity(pod));
            if !self.class_by_pod.contains_key(&pod) {
                self.order.push(pod);
            }
            self.place(pod, class);
        }
        debug!(pods = self.class_by_pod.len(), "pods indexed");
    }

    /// Re-evaluate one batch of pods if the reallocation delay elapsed.
    ///
    /// Returns how many pods changed class.
    pub fn reallocate(&mut self, now: SimTime, oracle: &dyn ActivityOracle) -> usize {
        let Some((delay, batch_size)) = self
            .layout
            .as_ref()
            .map(|layout| (layout.reallocation_delay, layout.reallocation_batch_size))
        else {
            return 0;
        };
        if let Some(last) = self.last_reallocation
            && now - last < delay
        {
            return 0;
        }
        self.last_reallocation = Some(now);
        if self.order.is_empty() {
            return 0;
        }

        let batch = match batch_size {
            0 => self.order.len(),
            n => n.min(self.order.len()),
        };
        let mut moved = 0;
        for _ in 0..batch {
            let pod = self.order[self.cursor];
            self.cursor = (self.cursor + 1) % self.order.len();
            let class = self.class_of_activity(oracle.pod_activity(pod));
            if self.class_by_pod.get(&pod) != Some(&class) {
                self.place(pod, class);
                moved += 1;
            }
        }
        info!(now, batch, moved, "pods reallocated");
        moved
    }

    /// Move `pod` into `class`, keeping both index directions in sync.
    fn place(&mut self, pod: PodId, class: usize) {
        if let Some(previous) = self.class_by_pod.insert(pod, class) {
            let list = &mut self.members[previous];
            if let Ok(pos) = list.binary_search(&pod) {
                list.remove(pos);
            }
        }
        let list = &mut self.members[class];
        if let Err(pos) = list.binary_search(&pod) {
            list.insert(pos, pod);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stow_core::{BundleId, ItemDescription};

    fn three_classes() -> StorageClassifier {
        let mut classifier = StorageClassifier::new();
        classifier.configure(&[0.3, 0.7], 100.0, 0).unwrap();
        classifier
    }

    fn bundle_of(item: u32) -> ItemBundle {
        ItemBundle {
            id: BundleId(1),
            item: ItemDescription { id: ItemId(item), weight: 1.0 },
            quantity: 1,
            arrival: 0.0,
        }
    }

    #[test]
    fn borders_map_to_classes() {
        let layout = ClassLayout::new(&[0.3, 0.7], 0.0, 0).unwrap();
        assert_eq!(layout.class_count(), 3);
        assert_eq!(layout.class_of(0.0), 0);
        assert_eq!(layout.class_of(0.29), 0);
        assert_eq!(layout.class_of(0.3), 1);
        assert_eq!(layout.class_of(0.69), 1);
        assert_eq!(layout.class_of(0.7), 2);
        assert_eq!(layout.class_of(1.0), 2);
    }

    #[test]
    fn configure_is_idempotent() {
        let mut classifier = three_classes();
        classifier.configure(&[0.3, 0.7], 100.0, 0).unwrap();
        assert_eq!(classifier.class_count(), 3);
    }

    #[test]
    fn configure_rejects_incompatible_layout() {
        let mut classifier = three_classes();
        let err = classifier.configure(&[0.5], 100.0, 0).unwrap_err();
        assert!(matches!(err, PlacementError::ConfigMismatch { .. }));

        let err = classifier.configure(&[0.3, 0.7], 50.0, 0).unwrap_err();
        assert!(matches!(err, PlacementError::ConfigMismatch { .. }));
        // The first layout stays in effect.
        assert_eq!(classifier.layout().unwrap().borders(), &[0.3, 0.7]);
    }

    #[test]
    fn configure_rejects_unsorted_borders() {
        let mut classifier = StorageClassifier::new();
        let err = classifier.configure(&[0.7, 0.3], 0.0, 0).unwrap_err();
        assert!(matches!(err, PlacementError::InvalidBorders(_)));
        assert!(!classifier.is_configured());
    }

    #[test]
    fn unconfigured_classifier_has_one_class() {
        let classifier = StorageClassifier::new();
        let activity = ActivityTable::new(0.9);
        assert_eq!(classifier.class_count(), 1);
        assert_eq!(classifier.class_of_bundle(&bundle_of(1), &activity), 0);
    }

    #[test]
    fn registers_pods_into_classes() {
        let mut classifier = three_classes();
        let mut activity = ActivityTable::new(0.5);
        activity.set_pod(PodId(1), 0.1);
        activity.set_pod(PodId(2), 0.8);
        activity.set_pod(PodId(3), 0.2);

        classifier.register_pods([PodId(3), PodId(1), PodId(2), PodId(4)], &activity);

        assert_eq!(classifier.pods_in_class(0), &[PodId(1), PodId(3)]);
        assert_eq!(classifier.pods_in_class(1), &[PodId(4)]);
        assert_eq!(classifier.pods_in_class(2), &[PodId(2)]);
        assert_eq!(classifier.indexed_pods(), 4);
    }

    #[test]
    fn bundle_class_follows_item_activity() {
        let classifier = three_classes();
        let mut activity = ActivityTable::new(0.5);
        activity.set_item(ItemId(1), 0.05);
        activity.set_item(ItemId(2), 0.95);

        assert_eq!(classifier.class_of_bundle(&bundle_of(1), &activity), 0);
        assert_eq!(classifier.class_of_bundle(&bundle_of(2), &activity), 2);
        assert_eq!(classifier.class_of_bundle(&bundle_of(3), &activity), 1);
    }

    #[test]
    fn pod_class_lags_until_reallocation() {
        let mut classifier = three_classes();
        let mut activity = ActivityTable::new(0.5);
        activity.set_pod(PodId(1), 0.1);
        classifier.register_pods([PodId(1)], &activity);
        classifier.reallocate(0.0, &activity);

        activity.set_pod(PodId(1), 0.9);
        assert_eq!(classifier.class_of_pod(PodId(1), &activity), 0);

        // Delay not yet elapsed.
        assert_eq!(classifier.reallocate(50.0, &activity), 0);
        assert_eq!(classifier.class_of_pod(PodId(1), &activity), 0);

        assert_eq!(classifier.reallocate(100.0, &activity), 1);
        assert_eq!(classifier.class_of_pod(PodId(1), &activity), 2);
        assert!(classifier.pods_in_class(0).is_empty());
        assert_eq!(classifier.pods_in_class(2), &[PodId(1)]);
    }

    #[test]
    fn reallocation_walks_pods_in_batches() {
        let mut classifier = StorageClassifier::new();
        classifier.configure(&[0.5], 0.0, 2).unwrap();
        let mut activity = ActivityTable::new(0.1);
        classifier.register_pods([PodId(1), PodId(2), PodId(3)], &activity);

        activity.set_pod(PodId(1), 0.9);
        activity.set_pod(PodId(2), 0.9);
        activity.set_pod(PodId(3), 0.9);

        assert_eq!(classifier.reallocate(1.0, &activity), 2);
        assert_eq!(classifier.pods_in_class(1), &[PodId(1), PodId(2)]);
        assert_eq!(classifier.reallocate(2.0, &activity), 1);
        assert_eq!(classifier.pods_in_class(1), &[PodId(1), PodId(2), PodId(3)]);
    }

    #[test]
    fn unknown_pod_is_classified_from_activity() {
        let classifier = three_classes();
        let mut activity = ActivityTable::new(0.5);
        activity.set_pod(PodId(8), 0.75);
        assert_eq!(classifier.class_of_pod(PodId(8), &activity), 2);
    }

    #[test]
    fn out_of_range_class_is_rejected() {
        let classifier = three_classes();
        assert_eq!(
            classifier.try_pods_in_class(3),
            Err(PlacementError::UnknownClass { class: 3, class_count: 3 })
        );
        assert!(classifier.pods_in_class(3).is_empty());
    }
}

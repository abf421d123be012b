//! Placement engine: finds a pod for a bundle across storage classes.
//!
//! Given the desired class of a bundle, the placer:
//! 1. Probes classes in expanding-ring order around the desired class
//! 2. Within a class, recycles the last pod chosen for it while it still fits
//! 3. Otherwise scans the class and applies the configured tie-break

use std::collections::HashMap;

use rand::RngCore;
use stow_core::{ItemBundle, PodId};
use stowgrid_state::ReservationLedger;
use tracing::debug;

use crate::classifier::{ActivityOracle, StorageClassifier};
use crate::scorer::{TieBreak, pick_candidate};

/// Probe order over classes, starting at the desired class.
///
/// Each ring yields `low` (if in range) and then `high` (if in range and
/// different from `low`); afterwards `low` grows by one and `high` shrinks
/// by one. The iterator ends once `low >= class_count && high < 0`.
#[derive(Debug, Clone)]
pub struct ExpandingRing {
    low: usize,
    high: isize,
    class_count: usize,
    high_turn: bool,
}

/// Expanding-ring probe order for `desired` among `class_count` classes.
pub fn expanding_ring(desired: usize, class_count: usize) -> ExpandingRing {
    ExpandingRing {
        low: desired,
        high: desired as isize,
        class_count,
        high_turn: false,
    }
}

impl Iterator for ExpandingRing {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.low >= self.class_count && self.high < 0 {
                return None;
            }
            if !self.high_turn {
                self.high_turn = true;
                if self.low < self.class_count {
                    return Some(self.low);
                }
            } else {
                self.high_turn = false;
                let (low, high) = (self.low, self.high);
                self.low += 1;
                self.high -= 1;
                if high >= 0 && high as usize != low {
                    return Some(high as usize);
                }
            }
        }
    }
}

/// Last pod chosen per class, indexed in both directions.
///
/// A class maps to at most one pod and a pod to at most one class; both
/// maps are always updated together.
#[derive(Debug, Clone, Default)]
pub struct RecycleCache {
    by_class: HashMap<usize, PodId>,
    by_pod: HashMap<PodId, usize>,
}

impl RecycleCache {
    pub fn get(&self, class: usize) -> Option<PodId> {
        self.by_class.get(&class).copied()
    }

    pub fn class_of(&self, pod: PodId) -> Option<usize> {
        self.by_pod.get(&pod).copied()
    }

    /// Record `pod` as the last choice for `class`, superseding older entries.
    pub fn remember(&mut self, class: usize, pod: PodId) {
        if let Some(previous_pod) = self.by_class.insert(class, pod)
            && previous_pod != pod
        {
            self.by_pod.remove(&previous_pod);
        }
        if let Some(previous_class) = self.by_pod.insert(pod, class)
            && previous_class != class
        {
            self.by_class.remove(&previous_class);
        }
    }

    /// Drop the entry of `pod`, returning the class it was cached for.
    pub fn invalidate_pod(&mut self, pod: PodId) -> Option<usize> {
        let class = self.by_pod.remove(&pod)?;
        self.by_class.remove(&class);
        Some(class)
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}

/// How to choose a pod within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceOptions {
    pub tie_break: TieBreak,
    /// Try the cached pod of the class before scanning.
    pub recycle: bool,
}

impl Default for ChoiceOptions {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::Emptiest,
            recycle: true,
        }
    }
}

/// Read-only view of the collaborators a search consults.
#[derive(Clone, Copy)]
pub struct SearchScope<'a> {
    pub classifier: &'a StorageClassifier,
    pub activity: &'a dyn ActivityOracle,
    pub ledger: &'a dyn ReservationLedger,
}

/// Pod selection with a recycle cache and scan instrumentation.
#[derive(Debug, Default)]
pub struct PodChooser {
    cache: RecycleCache,
    /// Full class scans performed, per class.
    scans: Vec<u64>,
    recycled: u64,
}

impl PodChooser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &RecycleCache {
        &self.cache
    }

    /// Forget `pod` as a recycle candidate.
    pub fn invalidate_pod(&mut self, pod: PodId) -> Option<usize> {
        self.cache.invalidate_pod(pod)
    }

    pub fn scan_count(&self, class: usize) -> u64 {
        self.scans.get(class).copied().unwrap_or(0)
    }

    pub fn total_scans(&self) -> u64 {
        self.scans.iter().sum()
    }

    pub fn recycle_count(&self) -> u64 {
        self.recycled
    }

    /// Choose a pod of `class` that fits the bundle.
    ///
    /// The returned pod always satisfies `fits_for_reservation` at the
    /// moment of the call. The winner of a scan becomes the class's recycle
    /// candidate.
    pub fn choose_in_class(
        &mut self,
        scope: &SearchScope<'_>,
        class: usize,
        bundle: &ItemBundle,
        options: ChoiceOptions,
        rng: &mut dyn RngCore,
    ) -> Option<PodId> {
        if options.recycle
            && let Some(pod) = self.cache.get(class)
            && scope.ledger.fits_for_reservation(pod, bundle)
            && scope.classifier.class_of_pod(pod, scope.activity) == class
        {
            self.recycled += 1;
            debug!(%pod, class, bundle = %bundle.id, "recycled last pod of class");
            return Some(pod);
        }

        self.record_scan(class);
        let candidates: Vec<PodId> = scope
            .classifier
            .pods_in_class(class)
            .iter()
            .copied()
            .filter(|pod| scope.ledger.fits_for_reservation(*pod, bundle))
            .collect();
        let chosen = pick_candidate(&candidates, options.tie_break, bundle, scope.ledger, rng)?;
        self.cache.remember(class, chosen);
        debug!(
            pod = %chosen,
            class,
            candidates = candidates.len(),
            strategy = ?options.tie_break,
            "scanned class"
        );
        Some(chosen)
    }

    /// Expanding-ring search starting at `desired`.
    ///
    /// Returns the chosen pod and the class it was found in.
    pub fn search(
        &mut self,
        scope: &SearchScope<'_>,
        desired: usize,
        bundle: &ItemBundle,
        options: ChoiceOptions,
        rng: &mut dyn RngCore,
    ) -> Option<(PodId, usize)> {
        for class in expanding_ring(desired, scope.classifier.class_count()) {
            if let Some(pod) = self.choose_in_class(scope, class, bundle, options, rng) {
                return Some((pod, class));
            }
        }
        debug!(bundle = %bundle.id, desired, "no class has a fitting pod");
        None
    }

    fn record_scan(&mut self, class: usize) {
        if self.scans.len() <= class {
            self.scans.resize(class + 1, 0);
        }
        self.scans[class] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ActivityTable;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stow_core::{BundleId, ItemDescription, ItemId, Position};
    use stowgrid_state::{InMemoryLedger, PodRecord};

    /// Three classes with borders [0.3, 0.7]; `pods` lists (id, activity, capacity).
    fn setup(pods: &[(u32, f64, f64)]) -> (StorageClassifier, ActivityTable, InMemoryLedger) {
        let mut classifier = StorageClassifier::new();
        classifier.configure(&[0.3, 0.7], 60.0, 0).unwrap();
        let mut activity = ActivityTable::new(0.5);
        let mut ledger = InMemoryLedger::new();
        for &(id, rank, capacity) in pods {
            activity.set_pod(PodId(id), rank);
            ledger
                .insert_pod(PodRecord::new(PodId(id), capacity, Position::new(0, 0.0, 0.0)))
                .unwrap();
        }
        classifier.register_pods(pods.iter().map(|(id, _, _)| PodId(*id)), &activity);
        (classifier, activity, ledger)
    }

    fn bundle(id: u64, quantity: u32) -> ItemBundle {
        ItemBundle {
            id: BundleId(id),
            item: ItemDescription { id: ItemId(1), weight: 1.0 },
            quantity,
            arrival: 0.0,
        }
    }

    #[test]
    fn ring_order_from_middle_class() {
        let order: Vec<usize> = expanding_ring(1, 3).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn ring_order_from_edges() {
        assert_eq!(expanding_ring(0, 4).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(expanding_ring(3, 4).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        assert_eq!(expanding_ring(2, 5).collect::<Vec<_>>(), vec![2, 3, 1, 4, 0]);
    }

    #[test]
    fn ring_visits_every_class_once() {
        for count in 1..7 {
            for desired in 0..count {
                let mut order: Vec<usize> = expanding_ring(desired, count).collect();
                order.sort();
                assert_eq!(order, (0..count).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn cache_keeps_both_directions_in_sync() {
        let mut cache = RecycleCache::default();
        cache.remember(0, PodId(1));
        cache.remember(0, PodId(2));
        assert_eq!(cache.get(0), Some(PodId(2)));
        assert_eq!(cache.class_of(PodId(1)), None);

        // Moving a pod to another class drops its old class entry.
        cache.remember(1, PodId(2));
        assert_eq!(cache.get(0), None);
        assert_eq!(cache.get(1), Some(PodId(2)));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.invalidate_pod(PodId(2)), Some(1));
        assert!(cache.is_empty());
        assert_eq!(cache.class_of(PodId(2)), None);
    }

    #[test]
    fn recycling_avoids_rescans() {
        let (classifier, activity, mut ledger) = setup(&[(1, 0.1, 100.0), (2, 0.2, 100.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);

        for n in 0..5 {
            let b = bundle(n, 5);
            let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };
            let pod = chooser
                .choose_in_class(&scope, 0, &b, ChoiceOptions::default(), &mut rng)
                .unwrap();
            assert_eq!(pod, PodId(1));
            ledger.reserve(pod, &b).unwrap();
        }
        assert_eq!(chooser.scan_count(0), 1);
        assert_eq!(chooser.recycle_count(), 4);
    }

    #[test]
    fn disabled_recycling_scans_every_time() {
        let (classifier, activity, ledger) = setup(&[(1, 0.1, 100.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);
        let options = ChoiceOptions { tie_break: TieBreak::Consolidate, recycle: false };
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };

        for n in 0..3 {
            chooser.choose_in_class(&scope, 0, &bundle(n, 1), options, &mut rng).unwrap();
        }
        assert_eq!(chooser.scan_count(0), 3);
        assert_eq!(chooser.cache().get(0), Some(PodId(1)));
    }

    #[test]
    fn cached_pod_that_no_longer_fits_triggers_scan() {
        let (classifier, activity, mut ledger) = setup(&[(1, 0.1, 10.0), (2, 0.2, 10.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);

        let first = bundle(1, 8);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };
        let pod = chooser.choose_in_class(&scope, 0, &first, ChoiceOptions::default(), &mut rng);
        assert_eq!(pod, Some(PodId(1)));
        ledger.reserve(PodId(1), &first).unwrap();

        let second = bundle(2, 5);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };
        let pod = chooser.choose_in_class(&scope, 0, &second, ChoiceOptions::default(), &mut rng);
        assert_eq!(pod, Some(PodId(2)));
        assert!(ledger.fits_for_reservation(PodId(2), &second));
        assert_eq!(chooser.scan_count(0), 2);
        assert_eq!(chooser.cache().get(0), Some(PodId(2)));
    }

    #[test]
    fn invalidated_pod_is_not_recycled() {
        let (classifier, activity, ledger) = setup(&[(1, 0.1, 100.0), (2, 0.2, 100.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };

        chooser.choose_in_class(&scope, 0, &bundle(1, 1), ChoiceOptions::default(), &mut rng);
        assert_eq!(chooser.invalidate_pod(PodId(1)), Some(0));

        chooser.choose_in_class(&scope, 0, &bundle(2, 1), ChoiceOptions::default(), &mut rng);
        assert_eq!(chooser.scan_count(0), 2);
        assert_eq!(chooser.recycle_count(), 0);
    }

    #[test]
    fn search_falls_back_to_higher_class_before_lower() {
        // Class 1 is full, classes 2 and 0 each have one fitting pod.
        let (classifier, activity, ledger) =
            setup(&[(1, 0.1, 10.0), (2, 0.5, 0.0), (3, 0.9, 10.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };

        let found = chooser.search(&scope, 1, &bundle(1, 2), ChoiceOptions::default(), &mut rng);
        assert_eq!(found, Some((PodId(3), 2)));
        assert_eq!(chooser.scan_count(0), 0);
    }

    #[test]
    fn search_reaches_lower_class_when_higher_is_full() {
        let (classifier, activity, ledger) =
            setup(&[(1, 0.1, 10.0), (2, 0.5, 0.0), (3, 0.9, 1.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };

        let found = chooser.search(&scope, 1, &bundle(1, 2), ChoiceOptions::default(), &mut rng);
        assert_eq!(found, Some((PodId(1), 0)));
        assert_eq!(chooser.scan_count(1), 1);
        assert_eq!(chooser.scan_count(2), 1);
        assert_eq!(chooser.scan_count(0), 1);
    }

    #[test]
    fn search_exhausts_when_nothing_fits() {
        let (classifier, activity, ledger) = setup(&[(1, 0.1, 1.0), (2, 0.9, 1.0)]);
        let mut chooser = PodChooser::new();
        let mut rng = StdRng::seed_from_u64(7);
        let scope = SearchScope { classifier: &classifier, activity: &activity, ledger: &ledger };

        assert_eq!(chooser.search(&scope, 1, &bundle(1, 5), ChoiceOptions::default(), &mut rng), None);
        assert_eq!(chooser.total_scans(), 3);
        assert!(chooser.cache().is_empty());
    }
}

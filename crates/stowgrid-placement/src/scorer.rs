//! Tie-break strategies for choosing among fitting pods of one class.
//!
//! - **Emptiest**: lowest `(used + reserved) / capacity`
//! - **Random**: uniform choice from an injected random source
//! - **Consolidate**: pods already holding the item, then the fewest units of it
//!
//! Deterministic strategies keep the candidate order on ties, so the pod
//! with the lowest id wins when candidates come from the class index.

use rand::RngCore;
use rand::seq::SliceRandom;
use stow_core::{ItemBundle, PodId};
use stowgrid_state::ReservationLedger;

pub use stow_core::TieBreak;

/// Pick the winning pod among `candidates`, which must all fit the bundle.
pub fn pick_candidate(
    candidates: &[PodId],
    strategy: TieBreak,
    bundle: &ItemBundle,
    ledger: &dyn ReservationLedger,
    rng: &mut dyn RngCore,
) -> Option<PodId> {
    match strategy {
        TieBreak::Emptiest => candidates
            .iter()
            .copied()
            .min_by(|a, b| fill_ratio(*a, ledger).total_cmp(&fill_ratio(*b, ledger))),
        TieBreak::Random => candidates.choose(rng).copied(),
        TieBreak::Consolidate => candidates
            .iter()
            .copied()
            .min_by_key(|pod| consolidation_key(*pod, bundle, ledger)),
    }
}

fn fill_ratio(pod: PodId, ledger: &dyn ReservationLedger) -> f64 {
    ledger.pod(pod).map_or(1.0, |record| record.fill_ratio())
}

/// `(0, count)` for pods holding the item, `(1, 0)` for the rest.
fn consolidation_key(pod: PodId, bundle: &ItemBundle, ledger: &dyn ReservationLedger) -> (u8, u32) {
    match ledger.pod(pod) {
        Some(record) if record.is_contained(bundle.item.id) => {
            (0, record.count_contained(bundle.item.id))
        }
        Some(_) => (1, 0),
        None => (2, 0),
    }
}

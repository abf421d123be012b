//! Error types for the reservation ledger.

use stow_core::{BundleId, ItemId, PodId};
use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur when changing pod capacity through the ledger.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("unknown pod: {0}")]
    UnknownPod(PodId),

    #[error("pod already registered: {0}")]
    DuplicatePod(PodId),

    #[error("{pod} cannot hold {requested} more units of capacity ({free} free)")]
    InsufficientCapacity { pod: PodId, requested: f64, free: f64 },

    #[error("{0} already holds a reservation")]
    DuplicateReservation(BundleId),

    #[error("no reservation recorded for {0}")]
    UnknownReservation(BundleId),

    #[error("{pod} holds only {available} units of {item}")]
    InsufficientStock { pod: PodId, item: ItemId, available: u32 },
}

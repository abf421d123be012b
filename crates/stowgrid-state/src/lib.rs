//! stowgrid-state: the reservation ledger consumed by the allocators.
//!
//! The ledger is the single writer of pod capacity counters and of the
//! forbidden-resting marks on waypoints. Allocators read pod state through
//! [`ReservationLedger`] and only ever change it through reserve/forbid
//! calls.
//!
//! [`InMemoryLedger`] is a complete implementation used by the scenario
//! driver and by tests. A simulator embedding Stowgrid is expected to
//! implement the trait on top of its own pod bookkeeping.

pub mod error;
pub mod ledger;
pub mod store;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use ledger::ReservationLedger;
pub use store::InMemoryLedger;
pub use types::*;

//! stowgrid-scheduler: storage decisions over simulated time.
//!
//! Turns incoming bundles and the initial pod layout into assignments. The
//! scheduler:
//!
//! - Keeps arriving bundles pending until a pod in a suitable class fits
//! - Reserves capacity through the ledger as soon as a pod is chosen
//! - Parks decisions per pod and releases them by threshold or timeout
//! - Binds every pod once to its nearest storage waypoint
//!
//! # Architecture
//!
//! ```text
//! BundleStorageAllocator
//!   ├── StorageClassifier (shared, borrowed per call)
//!   ├── PodChooser (expanding-ring search + recycle cache)
//!   └── StorageBuffer
//!       ├── pending bundles (FIFO)
//!       └── parked assignments per pod → commit listener
//!
//! PodLocationAllocator
//!   └── pod ↔ waypoint bindings → ReservationLedger (forbidden resting)
//! ```

pub mod allocator;
pub mod buffer;
pub mod error;
pub mod pod_storage;

pub use allocator::{AllocationContext, BundleStorageAllocator, SearchMode};
pub use buffer::{Assignment, CommitListener, ReleaseRule, StorageBuffer};
pub use error::{SchedulerError, SchedulerResult};
pub use pod_storage::{PodBinding, PodLocationAllocator};

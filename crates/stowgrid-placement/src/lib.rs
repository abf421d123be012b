//! Stowgrid placement engine: activity classes and pod search.
//!
//! This crate decides *which* pod a bundle should go to. It does NOT own
//! pending bundles or release timing (that's `stowgrid-scheduler`). Instead,
//! it partitions pods into activity classes and searches them.
//!
//! # Components
//!
//! - **`classifier`**: activity classes (border lookup, reallocation batches)
//! - **`scorer`**: tie-break strategies within one class
//! - **`placer`**: expanding-ring search over classes with a recycle cache

pub mod classifier;
pub mod error;
pub mod placer;
pub mod scorer;

pub use classifier::{ActivityOracle, ActivityTable, ClassLayout, StorageClassifier};
pub use error::{PlacementError, PlacementResult};
pub use placer::{ChoiceOptions, ExpandingRing, PodChooser, RecycleCache, SearchScope, expanding_ring};
pub use scorer::{TieBreak, pick_candidate};

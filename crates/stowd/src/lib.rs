//! Scenario replay for the Stowgrid storage core.
//!
//! A scenario describes a facility (waypoints, pods, item types with their
//! activity ranks), an initial inventory and a timeline of events. The
//! [`sim::Simulation`] wires the classifier, ledger and both allocators
//! together and replays the timeline in simulated-time order.

pub mod scenario;
pub mod sim;

pub use scenario::{Scenario, ScenarioEvent, ScheduledEvent};
pub use sim::{RunSummary, Simulation};

//! Shared types used across Stowgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulated time in seconds since the start of the run.
pub type SimTime = f64;

/// Identifier of a mobile storage pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodId(pub u32);

/// Identifier of a waypoint in the facility graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(pub u32);

/// Identifier of a stock-keeping unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

/// Identifier of a replenishment bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub u64);

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pod-{}", self.0)
    }
}

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wp-{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle-{}", self.0)
    }
}

// ── Items ─────────────────────────────────────────────────────────

/// Immutable description of a stock-keeping unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemDescription {
    pub id: ItemId,
    /// Pod capacity consumed by a single unit.
    pub weight: f64,
}

/// A quantity of one item type waiting to be stored in a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBundle {
    pub id: BundleId,
    pub item: ItemDescription,
    pub quantity: u32,
    /// Simulated time at which the bundle arrived at the facility.
    pub arrival: SimTime,
}

impl ItemBundle {
    /// Pod capacity this bundle occupies once stored.
    pub fn volume(&self) -> f64 {
        self.item.weight * f64::from(self.quantity)
    }
}

// ── Geometry ──────────────────────────────────────────────────────

/// Physical coordinates on a facility tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub tier: u32,
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(tier: u32, x: f64, y: f64) -> Self {
        Self { tier, x, y }
    }

    /// Squared planar distance. Tiers are not compared.
    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Kind of station a pod was handled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    /// Replenishment station: bundles are put into the pod.
    Input,
    /// Picking station: items are taken out of the pod.
    Output,
}

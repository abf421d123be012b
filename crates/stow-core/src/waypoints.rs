//! Nearest-waypoint lookup.
//!
//! The facility graph itself lives outside Stowgrid. Allocators only need
//! one capability from it: "which waypoint is closest to this position".

use crate::types::{Position, WaypointId};

/// Resolves physical coordinates to a waypoint of the facility graph.
pub trait WaypointLocator {
    /// The waypoint closest to `position` on the same tier, if any.
    fn closest_waypoint(&self, position: &Position) -> Option<WaypointId>;
}

/// Flat list of waypoints searched linearly.
///
/// Ties are broken by the lower waypoint id so lookups are deterministic.
#[derive(Debug, Clone, Default)]
pub struct WaypointIndex {
    waypoints: Vec<(WaypointId, Position)>,
}

impl WaypointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: WaypointId, position: Position) {
        self.waypoints.push((id, position));
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

impl FromIterator<(WaypointId, Position)> for WaypointIndex {
    fn from_iter<T: IntoIterator<Item = (WaypointId, Position)>>(iter: T) -> Self {
        Self {
            waypoints: iter.into_iter().collect(),
        }
    }
}

impl WaypointLocator for WaypointIndex {
    fn closest_waypoint(&self, position: &Position) -> Option<WaypointId> {
        self.waypoints
            .iter()
            .filter(|(_, wp)| wp.tier == position.tier)
            .min_by(|(a_id, a), (b_id, b)| {
                a.distance_sq(position)
                    .total_cmp(&b.distance_sq(position))
                    .then(a_id.cmp(b_id))
            })
            .map(|(id, _)| *id)
    }
}

//! Scenario file format.
//!
//! ```toml
//! seed = 7
//!
//! [[waypoints]]
//! id = 1
//! x = 0.0
//! y = 0.0
//!
//! [[pods]]
//! id = 1
//! capacity = 100.0
//! x = 0.5
//! y = 0.0
//! activity = 0.2
//!
//! [[items]]
//! id = 1
//! weight = 1.0
//! activity = 0.5
//!
//! [[initial_inventory]]
//! item = 1
//! quantity = 10
//!
//! [[events]]
//! at = 5.0
//! kind = "arrival"
//! item = 1
//! quantity = 4
//!
//! [[events]]
//! at = 30.0
//! kind = "pod_handled"
//! pod = 1
//! station = "input"
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use stow_core::{ItemId, PodId, Position, SimTime, StationKind, WaypointId};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Random seed, overridden by the command line.
    pub seed: Option<u64>,
    /// Activity rank of pods and items without an explicit value.
    pub default_activity: Option<f64>,
    pub waypoints: Vec<WaypointSpec>,
    pub pods: Vec<PodSpec>,
    pub items: Vec<ItemSpec>,
    pub initial_inventory: Vec<StockSpec>,
    pub events: Vec<ScheduledEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaypointSpec {
    pub id: WaypointId,
    #[serde(default)]
    pub tier: u32,
    pub x: f64,
    pub y: f64,
}

impl WaypointSpec {
    pub fn position(&self) -> Position {
        Position::new(self.tier, self.x, self.y)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodSpec {
    pub id: PodId,
    pub capacity: f64,
    #[serde(default)]
    pub tier: u32,
    pub x: f64,
    pub y: f64,
    pub activity: Option<f64>,
}

impl PodSpec {
    pub fn position(&self) -> Position {
        Position::new(self.tier, self.x, self.y)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    pub id: ItemId,
    #[serde(default = "unit_weight")]
    pub weight: f64,
    pub activity: Option<f64>,
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockSpec {
    pub item: ItemId,
    pub quantity: u32,
}

/// Units taken out of a pod at an output station.
#[derive(Debug, Clone, Deserialize)]
pub struct PickSpec {
    pub item: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEvent {
    pub at: SimTime,
    #[serde(flatten)]
    pub event: ScenarioEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// A replenishment bundle arrives.
    Arrival { item: ItemId, quantity: u32 },
    /// A pod was handled at a station. Input handling stores the bundles
    /// released to the pod; output handling applies the picks.
    PodHandled {
        pod: PodId,
        station: StationKind,
        #[serde(default)]
        picks: Vec<PickSpec>,
    },
    /// The activity rank of a pod changed.
    PodActivity { pod: PodId, activity: f64 },
    /// The activity rank of an item type changed.
    ItemActivity { item: ItemId, activity: f64 },
    /// Force a decision pass.
    Tick,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading scenario {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check references and ranges.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut waypoints = HashSet::new();
        for waypoint in &self.waypoints {
            if !waypoints.insert(waypoint.id) {
                bail!("duplicate waypoint {}", waypoint.id);
            }
        }

        let mut pods = HashSet::new();
        for pod in &self.pods {
            if !pods.insert(pod.id) {
                bail!("duplicate pod {}", pod.id);
            }
            if !(pod.capacity.is_finite() && pod.capacity >= 0.0) {
                bail!("{} has invalid capacity {}", pod.id, pod.capacity);
            }
            check_activity(pod.activity)?;
        }

        let mut items = HashSet::new();
        for item in &self.items {
            if !items.insert(item.id) {
                bail!("duplicate item {}", item.id);
            }
            if !(item.weight.is_finite() && item.weight > 0.0) {
                bail!("{} has invalid weight {}", item.id, item.weight);
            }
            check_activity(item.activity)?;
        }
        check_activity(self.default_activity)?;

        for stock in &self.initial_inventory {
            if !items.contains(&stock.item) {
                bail!("initial inventory references unknown {}", stock.item);
            }
        }

        for scheduled in &self.events {
            if !scheduled.at.is_finite() || scheduled.at < 0.0 {
                bail!("event time {} is not a valid simulated time", scheduled.at);
            }
            match &scheduled.event {
                ScenarioEvent::Arrival { item, .. } if !items.contains(item) => {
                    bail!("arrival at {} references unknown {item}", scheduled.at);
                }
                ScenarioEvent::PodHandled { pod, picks, .. } => {
                    if !pods.contains(pod) {
                        bail!("event at {} references unknown {pod}", scheduled.at);
                    }
                    if let Some(pick) = picks.iter().find(|p| !items.contains(&p.item)) {
                        bail!("pick at {} references unknown {}", scheduled.at, pick.item);
                    }
                }
                ScenarioEvent::PodActivity { pod, activity } => {
                    if !pods.contains(pod) {
                        bail!("event at {} references unknown {pod}", scheduled.at);
                    }
                    check_activity(Some(*activity))?;
                }
                ScenarioEvent::ItemActivity { item, activity } => {
                    if !items.contains(item) {
                        bail!("event at {} references unknown {item}", scheduled.at);
                    }
                    check_activity(Some(*activity))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Events ordered by time; events at the same time keep file order.
    pub fn timeline(&self) -> Vec<ScheduledEvent> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.at.total_cmp(&b.at));
        events
    }
}

fn check_activity(activity: Option<f64>) -> anyhow::Result<()> {
    match activity {
        Some(value) if !(0.0..=1.0).contains(&value) => {
            bail!("activity {value} is outside [0, 1]")
        }
        _ => Ok(()),
    }
}

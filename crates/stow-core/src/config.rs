//! stow.toml configuration parser.
//!
//! Both storage policies carry their own copy of the class layout. They are
//! expected to agree because they share one classifier at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StowConfig {
    pub item_storage: ItemStorageConfig,
    pub pod_storage: PodStorageConfig,
}

/// Class layout shared by the item and pod storage policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    /// Class borders on the normalized activity rank. Sorted on load.
    pub class_borders: Vec<f64>,
    /// Minimum simulated seconds between two reallocation batches.
    pub reallocation_delay: f64,
    /// Pods re-evaluated per reallocation batch. 0 re-evaluates all pods.
    pub reallocation_batch_size: usize,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            class_borders: vec![0.3, 0.7],
            reallocation_delay: 600.0,
            reallocation_batch_size: 0,
        }
    }
}

impl ClassConfig {
    pub fn class_count(&self) -> usize {
        self.class_borders.len() + 1
    }
}

/// How to order fitting pods of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lowest `(used + reserved) / capacity` first.
    #[default]
    Emptiest,
    /// Uniformly random among fitting pods.
    Random,
    /// Pods already holding the item first, then the fewest units of it.
    Consolidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemStorageConfig {
    #[serde(flatten)]
    pub classes: ClassConfig,
    /// Parked capacity share per class above which a pod's buffered
    /// decisions are released. Empty means release immediately.
    pub buffer_threshold_per_class: Vec<f64>,
    /// Seconds per class after which buffered decisions are released
    /// regardless of the threshold. Empty means no timeout.
    pub buffer_timeout_per_class: Vec<f64>,
    /// Tie-break used when seeding the initial inventory.
    pub seeding_tie_break: TieBreak,
    /// Tie-break used by decision passes while the system runs.
    pub running_tie_break: TieBreak,
    /// Whether decision passes may reuse the last pod chosen for a class.
    pub recycle_while_running: bool,
}

impl Default for ItemStorageConfig {
    fn default() -> Self {
        Self {
            classes: ClassConfig::default(),
            buffer_threshold_per_class: Vec::new(),
            buffer_timeout_per_class: Vec::new(),
            seeding_tie_break: TieBreak::Emptiest,
            running_tie_break: TieBreak::Emptiest,
            recycle_while_running: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodStorageConfig {
    #[serde(flatten)]
    pub classes: ClassConfig,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("class border {0} is not a finite number")]
    NonFiniteBorder(f64),
    #[error("{field} must list one value per class: expected {expected}, got {actual}")]
    ClassValueCount {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{field} must be a finite number (got {value})")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("item storage and pod storage disagree on the class layout")]
    SharedClassMismatch,
}

impl StowConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, normalize and validate a configuration document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: StowConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Sort class borders ascending.
    pub fn normalize(&mut self) {
        self.item_storage.classes.normalize();
        self.pod_storage.classes.normalize();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.item_storage.validate()?;
        self.pod_storage.classes.validate()?;
        if self.item_storage.classes != self.pod_storage.classes {
            return Err(ConfigError::SharedClassMismatch);
        }
        Ok(())
    }
}

impl ClassConfig {
    fn normalize(&mut self) {
        self.class_borders.sort_by(f64::total_cmp);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.class_borders.iter().find(|b| !b.is_finite()) {
            return Err(ConfigError::NonFiniteBorder(*bad));
        }
        if !self.reallocation_delay.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "reallocation_delay",
                value: self.reallocation_delay,
            });
        }
        if self.reallocation_delay < 0.0 {
            return Err(ConfigError::Negative {
                field: "reallocation_delay",
                value: self.reallocation_delay,
            });
        }
        Ok(())
    }
}

impl ItemStorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classes.validate()?;
        let expected = self.classes.class_count();
        for (field, values) in [
            ("buffer_threshold_per_class", &self.buffer_threshold_per_class),
            ("buffer_timeout_per_class", &self.buffer_timeout_per_class),
        ] {
            if !values.is_empty() && values.len() != expected {
                return Err(ConfigError::ClassValueCount {
                    field,
                    expected,
                    actual: values.len(),
                });
            }
            if let Some(value) = values.iter().find(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite { field, value: *value });
            }
            if let Some(value) = values.iter().find(|v| **v < 0.0) {
                return Err(ConfigError::Negative { field, value: *value });
            }
        }
        Ok(())
    }
}

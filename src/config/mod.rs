//! Configuration parsing and validation.
//!
//! A kitchen is described by a topology file (YAML or JSON, inferred from the
//! extension): the station list, the timing/reliability model for robot
//! actions, and the manager's command script.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyTopologySnafu, InvalidReliabilitySnafu, InvalidVariationSnafu,
    JsonParseSnafu, NoOvensSnafu, ReadFileSnafu, UnrecognizedFormatSnafu, YamlParseSnafu,
};
use crate::worker::robot::StepPlan;

/// Main configuration structure for a kitchen run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered station list; robot ids are assigned in descriptor order.
    pub kitchen: Vec<StationConfig>,

    /// Timing and reliability model applied to every robot.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Command script the manager replays, in order. Entries are written
    /// as single-key maps (`- order: 2`), not YAML enum tags.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub commands: Vec<Command>,

    /// Delay between worker launches in milliseconds (default: 100).
    /// Reduces log interleaving at startup; not a correctness concern.
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One entry in the topology's station list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StationConfig {
    /// A robot role; `count` identical robots are instantiated from it.
    Robot {
        #[serde(default = "default_count")]
        count: usize,
        /// Physical action names interleaved with the reserved handoff
        /// tokens `sync1`, `sync2` and `free`.
        operations: Vec<String>,
        /// Intake queue if before the oven, output queue if after.
        border_state: String,
        /// Queue a failed order is returned to.
        reset_state: String,
        after_oven: bool,
    },
    /// An oven allotment; counts accumulate across entries.
    Oven {
        #[serde(default = "default_count")]
        count: usize,
    },
    /// The set of operations watched by quality cameras.
    CameraSystem { operations: Vec<String> },
}

fn default_count() -> usize {
    1
}

fn default_launch_delay_ms() -> u64 {
    100
}

/// Timing and reliability model for robot actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Success probability per operation; unlisted operations never fail.
    #[serde(default)]
    pub reliability: HashMap<String, f64>,

    /// Mean seconds per operation; unlisted operations use the built-in
    /// defaults, unknown operations take no time.
    #[serde(default)]
    pub seconds_per_action: HashMap<String, f64>,

    /// Multiplier interval applied to the mean duration of every action.
    #[serde(default = "default_variation")]
    pub variation: (f64, f64),
}

fn default_variation() -> (f64, f64) {
    (0.9, 1.2)
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reliability: HashMap::new(),
            seconds_per_action: HashMap::new(),
            variation: default_variation(),
        }
    }
}

impl TimingConfig {
    /// Built-in mean duration for the default action vocabulary.
    fn builtin_seconds(operation: &str) -> f64 {
        match operation {
            "take" => 3.0,
            "sauce" => 4.0,
            "cheese" => 4.0,
            "to_oven" => 3.0,
            "bake" => 30.0,
            "from_oven" => 3.0,
            "slice" => 8.0,
            "pack" => 6.0,
            "put" => 3.0,
            _ => 0.0,
        }
    }

    /// Mean duration of one action, before variation.
    pub fn action_seconds(&self, operation: &str) -> f64 {
        self.seconds_per_action
            .get(operation)
            .copied()
            .unwrap_or_else(|| Self::builtin_seconds(operation))
    }

    /// Success probability of one action.
    pub fn action_reliability(&self, operation: &str) -> f64 {
        self.reliability.get(operation).copied().unwrap_or(1.0)
    }
}

/// A single manager command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Create this many new orders, one at a time.
    Order(u32),
    /// Suspend the manager only for this many seconds.
    Sleep(f64),
    /// Ask the robot to fail at its next physical step. Unknown ids are
    /// silently accepted as a no-op.
    Break(u64),
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the metrics HTTP endpoint is enabled (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML or JSON file, inferring the format
    /// from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let content = std::fs::read_to_string(path).context(ReadFileSnafu)?;

        let config: Config = match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).context(YamlParseSnafu)?
            }
            Some("json") => serde_json::from_str(&content).context(JsonParseSnafu)?,
            _ => {
                return UnrecognizedFormatSnafu {
                    path: path.display().to_string(),
                }
                .fail();
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the topology, timing model, and every robot's step plan.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.kitchen.is_empty(), EmptyTopologySnafu);

        let (low, high) = self.timing.variation;
        ensure!(
            low > 0.0 && high >= low,
            InvalidVariationSnafu { low, high }
        );
        for (operation, &value) in &self.timing.reliability {
            ensure!(
                (0.0..=1.0).contains(&value),
                InvalidReliabilitySnafu {
                    operation: operation.clone(),
                    value,
                }
            );
        }

        let mut oven_bound_robots = false;
        for station in &self.kitchen {
            if let StationConfig::Robot {
                operations,
                after_oven,
                ..
            } = station
            {
                let plan = StepPlan::parse(operations, *after_oven)?;
                oven_bound_robots |= *after_oven || plan.acquires_oven();
            }
        }
        if oven_bound_robots {
            ensure!(self.oven_count() > 0, NoOvensSnafu);
        }
        Ok(())
    }

    /// Total number of ovens across all oven entries.
    pub fn oven_count(&self) -> usize {
        self.kitchen
            .iter()
            .map(|s| match s {
                StationConfig::Oven { count } => *count,
                _ => 0,
            })
            .sum()
    }

    /// Total number of orders the command script will place.
    pub fn total_ordered(&self) -> u64 {
        self.commands
            .iter()
            .map(|c| match c {
                Command::Order(amount) => u64::from(*amount),
                _ => 0,
            })
            .sum()
    }

    /// Delay between worker launches.
    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
kitchen:
  - kind: robot
    count: 2
    operations: [take, sauce, cheese, sync1, to_oven, sync2]
    border_state: freezer
    reset_state: freezer
    after_oven: false
  - kind: robot
    count: 2
    operations: [bake, free, from_oven, slice, pack, put]
    border_state: shelf
    reset_state: freezer
    after_oven: true
  - kind: oven
    count: 2
  - kind: camera-system
    operations: [cheese, slice]

timing:
  reliability:
    sauce: 0.97
  seconds_per_action:
    bake: 10
  variation: [0.9, 1.2]

commands:
  - order: 2
  - sleep: 10
  - order: 5
  - break: 0
"#
    }

    #[test]
    fn test_config_yaml_parsing() {
        let config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.kitchen.len(), 4);
        assert_eq!(config.oven_count(), 2);
        assert_eq!(config.total_ordered(), 7);
        assert_eq!(
            config.commands[1],
            Command::Sleep(10.0),
        );
        assert_eq!(config.commands[3], Command::Break(0));
    }

    #[test]
    fn test_timing_defaults_and_overrides() {
        let config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        // Overridden:
        assert_eq!(config.timing.action_seconds("bake"), 10.0);
        assert_eq!(config.timing.action_reliability("sauce"), 0.97);
        // Built-in default:
        assert_eq!(config.timing.action_seconds("slice"), 8.0);
        assert_eq!(config.timing.action_reliability("slice"), 1.0);
        // Unknown operation takes no time:
        assert_eq!(config.timing.action_seconds("garnish"), 0.0);
    }

    #[test]
    fn test_empty_topology_rejected() {
        let config: Config = serde_yaml::from_str("kitchen: []").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyTopology)
        ));
    }

    #[test]
    fn test_oven_bound_robots_require_ovens() {
        let yaml = r#"
kitchen:
  - kind: robot
    operations: [bake]
    border_state: shelf
    reset_state: freezer
    after_oven: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoOvens)));
    }

    #[test]
    fn test_invalid_variation_rejected() {
        let yaml = r#"
kitchen:
  - kind: oven
timing:
  variation: [1.2, 0.9]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidVariation { .. })
        ));
    }

    #[test]
    fn test_invalid_reliability_rejected() {
        let yaml = r#"
kitchen:
  - kind: oven
timing:
  reliability:
    sauce: 1.5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReliability { .. })
        ));
    }

    #[test]
    fn test_config_from_json_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"kitchen": [{{"kind": "oven", "count": 3}}], "commands": [{{"order": 1}}]}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.oven_count(), 3);
        assert_eq!(config.total_ordered(), 1);
    }

    #[test]
    fn test_demo_topology_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/pizzeria.yaml");
        let config = Config::from_file(path).unwrap();
        assert_eq!(config.oven_count(), 2);
        assert_eq!(config.commands.len(), 6);
        assert_eq!(config.total_ordered(), 7);
    }

    #[test]
    fn test_unrecognized_extension_rejected() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "kitchen = []").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::UnrecognizedFormat { .. })
        ));
    }
}

//! Error types for pizzeria using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Substrate Errors ============

/// Errors that can occur while talking to the coordination substrate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubstrateError {
    /// A payload read from the substrate did not decode as the expected type.
    ///
    /// Internal traffic is assumed well-formed; hitting this means a worker
    /// wrote garbage, which is a protocol defect rather than user input.
    #[snafu(display("Malformed {what} payload: {value:?}"))]
    Malformed { what: &'static str, value: String },

    /// A blocking queue pop returned nothing, which only happens when the
    /// substrate has been torn down under a still-running worker.
    #[snafu(display("Queue {queue} disconnected"))]
    Disconnected { queue: String },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Config file extension is not a recognized format.
    #[snafu(display("Unrecognized config format: {path} (expected .yaml, .yml or .json)"))]
    UnrecognizedFormat { path: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to parse JSON configuration.
    #[snafu(display("Failed to parse JSON configuration"))]
    JsonParse { source: serde_json::Error },

    /// Topology has no stations.
    #[snafu(display("Topology must have at least one station"))]
    EmptyTopology,

    /// A robot station has no operations.
    #[snafu(display("Robot station has an empty operations list"))]
    EmptyOperations,

    /// A robot references the oven but the topology configures none.
    #[snafu(display("Topology has oven-bound robots but no ovens"))]
    NoOvens,

    /// A handoff token appears where the robot's placement does not allow it.
    #[snafu(display("Illegal `{token}` in operations of a robot with after_oven={after_oven}"))]
    IllegalHandoffToken { token: String, after_oven: bool },

    /// Handoff tokens appear out of order or more than once.
    #[snafu(display("Invalid handoff sequence: {message}"))]
    InvalidHandoffSequence { message: String },

    /// Timing variation interval is not a valid non-empty range.
    #[snafu(display("Invalid timing variation interval ({low}, {high})"))]
    InvalidVariation { low: f64, high: f64 },

    /// A reliability value is outside [0, 1].
    #[snafu(display("Reliability for `{operation}` is {value}, must be in [0, 1]"))]
    InvalidReliability { operation: String, value: f64 },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Kitchen Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum KitchenError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Substrate error.
    #[snafu(display("Substrate error"))]
    Substrate { source: SubstrateError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },
}

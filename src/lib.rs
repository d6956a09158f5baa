//! pizzeria: a discrete-event pizza production line built on message passing.
//!
//! This library simulates an automated kitchen: robots execute configurable
//! step sequences on orders, hand scarce ovens to each other through a
//! rendezvous protocol, quality cameras score finished steps, and a manager
//! replays a scripted workload. All coordination flows through a pluggable
//! substrate of queues, hashes, sets, and pub/sub channels.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use pizzeria::{Config, error::KitchenError, run_kitchen};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), KitchenError> {
//!     let config = Config::from_file("pizzeria.yaml")?;
//!     let report = run_kitchen(config, Duration::from_secs(80)).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod kitchen;
pub mod metrics;
pub mod report;
pub mod substrate;
pub mod worker;

// Re-export main types
pub use config::Config;
pub use kitchen::{Kitchen, run_kitchen};
pub use report::Report;
pub use substrate::{MemorySubstrate, Substrate, SubstrateRef};

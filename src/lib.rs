//! # Rinnai Heater Control
//!
//! Protocol decoding and set-point convergence for network-attached Rinnai
//! water heaters.
//!
//! The heater exposes a small HTTP interface that answers with flat
//! comma-separated telemetry strings. It only understands relative
//! `inc`/`dec` steps and enforces a single-writer priority lock keyed by the
//! caller's IP address. This crate turns that into a typed API.
//!
//! ## Features
//!
//! - **Protocol decoding**: primary state, extended diagnostics and consumption
//!   counters into typed records
//! - **Priority arbitration**: claim/release of the device lock and detection of
//!   competing controllers
//! - **Convergence control**: iterative stepping to a requested set point with
//!   bounded retries and per-step contention checks
//! - **Simulation**: an in-process device model for tests and local development
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rinnai_control::{ControllerConfig, HeaterController};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControllerConfig::new("192.168.0.40", "192.168.0.2".parse()?);
//! let controller = HeaterController::connect(config)?;
//!
//! let outcome = controller.converge(42.0).await;
//! if let Some(set_point) = outcome.set_point() {
//!     println!("heater now at {set_point}°C");
//! }
//!
//! let consumption = controller.get_consumption().await?;
//! println!("gas used: {} m³", consumption.gas_m3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Request names and positional response decoding
//! - [`temperature`] - Set-point code table and clamping
//! - [`transport`] - Request/response abstraction and the HTTP implementation
//! - [`client`] - Per-request timeouts and telemetry reads
//! - [`arbiter`] - Device priority lock
//! - [`controller`] - Convergence loop, power and button commands
//! - [`simulator`] - Device model for tests and the `heater-sim` binary

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod arbiter;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod simulator;
pub mod temperature;
pub mod transport;

// Re-export main public types for convenience
pub use config::ControllerConfig;
pub use controller::{ConvergenceOutcome, HeaterController, PowerOutcome};
pub use error::{ConfigError, DeviceError};
pub use protocol::{ConsumptionSnapshot, DeviceCommand, DeviceParameters, DeviceState};
pub use transport::{DeviceTransport, HttpTransport};

//! Process-wide configuration shared by the trigger-cell distributor crates:
//! tracing setup, deterministic seeding and the layered run configuration.

pub mod determinism;
pub mod layered;
pub mod run;
pub mod tracing;

pub use layered::{ConfigChange, ConfigLayer, ConfigLayering, LayeredConfig, LayeredConfigError};
pub use run::{RunConfig, RunConfigError};

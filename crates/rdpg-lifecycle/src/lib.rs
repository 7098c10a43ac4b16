//! RDPG Lifecycle - service broker smoke verification
//!
//! Drives the full lifecycle of a Postgres service instance against a
//! live platform and checks the database through a deployed test app:
//! - Provisions, binds, unbinds and destroys instances per plan
//! - Runs CRUD against the default schema and a generated one
//! - Proves presence with eventually-matches polling
//! - Proves absence with consistently-not-matches polling
//! - Cleans up whatever was provisioned, however far a pass got
//!
//! # Example
//!
//! ```rust,ignore
//! use rdpg_lifecycle::{CfCli, HttpProbe, LifecycleOrchestrator, SmokeConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SmokeConfig::load(Some(Path::new("smoke.json")), None)?;
//! let probe = HttpProbe::new(config.probe_timeout())?;
//! let orchestrator = LifecycleOrchestrator::new(config, Arc::new(CfCli::new()), Arc::new(probe));
//!
//! let report = orchestrator.run().await;
//! println!("{}", report.generate_text());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod identifier;
pub mod orchestrator;
pub mod pattern;
pub mod platform;
pub mod polling;
pub mod probe;
pub mod report;
pub mod sql;

mod verification;

// Re-exports for convenience
pub use config::{ContextSettings, SmokeConfig, CONFIG_PATH_ENV, NUM_INSERTIONS_ENV};
pub use error::{ConfigError, IdentifierError, LifecycleError, PlatformError, ProbeError};
pub use identifier::{FirstChar, Identifier, IdentifierGenerator, MAX_KEY_LENGTH};
pub use orchestrator::{LifecycleOrchestrator, LifecycleState};
pub use pattern::Matcher;
pub use platform::{CfCli, PlatformClient, PlatformCommand, PushOptions};
pub use polling::{
    consistently_not_matches, eventually_matches, scale_timeout, Observation, PollOutcome,
    PollPolicy, Poller, MAX_TIMEOUT,
};
pub use probe::{AppEndpoints, HttpProbe, Method, Probe, ProbeRequest};
pub use report::{StepOutcome, StepReport, SuiteReport};
pub use sql::{RowValue, SchemaTarget, TableRef, DEFAULT_SCHEMA, KEY_COLUMN_WIDTH};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Backend-agnostic database workload engine.
//!
//! A [`Workload`] describes weighted tasks, each holding one backend command
//! template and the parameters that fill it. An [`Engine`] selects tasks by
//! weight, generates fresh parameter values per unit, and hands bound
//! commands to a [`Client`] that owns the actual database connection.

pub mod client;
pub mod command;
pub mod database;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod params;
pub mod rng;
pub mod selector;
pub mod simulated;
pub mod startup;
pub mod workload;

pub use client::{Client, Response};
pub use database::Backend;
pub use dispatch::{DispatchResult, UnitOutcome};
pub use engine::{Engine, EngineConfig};
pub use error::{ClientError, ConfigError, DispatchError, ErrorKind, GenerationError, UnitError};
pub use metrics::{ConcurrentMetrics, EventSink, TracingSink, UnitEvent};
pub use startup::{StartupOutcome, StartupRunState};
pub use workload::{StartupFrequency, Task, Workload};

#![allow(clippy::implicit_hasher)]
#![allow(unknown_lints)]
#![allow(clippy::manual_is_multiple_of)]

pub mod config;
pub mod constants;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod models;
pub mod planner;
pub mod resample;
pub mod scheduler;
pub mod simulation;
pub mod topology;

#[doc(hidden)]
pub use ::log as log_facade;

pub use config::SchedulerConfig;
pub use control::{drive_tick, TickReport};
pub use error::{ConfigError, PlanError, ScheduleError, SimulationError};
pub use scheduler::{AdmissionOutcome, MergeScheduler, ScheduleSnapshot};
pub use simulation::Simulation;

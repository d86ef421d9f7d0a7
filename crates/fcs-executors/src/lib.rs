//! FCS Executors - running conformance test cases and acquiring consent
//!
//! [`TestCaseRunner`] executes a run's test cases in order on a background
//! task, feeding a [`DaemonController`] with one [`TestResult`] per test.
//! Before the main run, [`get_psu_consent`] starts one consent flow per
//! token group and waits, under a single deadline, for every flow to report
//! its consent id.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fcs_executors::{BufferedDaemonController, HttpExecutor, RunConfig, RunDefinition, TestCaseRunner};
//!
//! let config = RunConfig::load("run.toml")?;
//! let executor = Arc::new(HttpExecutor::from_config(&config)?);
//! let definition = Arc::new(RunDefinition::new(run).with_config(config));
//! let controller = Arc::new(BufferedDaemonController::new());
//!
//! let runner = TestCaseRunner::new(executor, definition, controller.clone());
//! runner.run_test_cases(&ctx)?;
//! controller.wait_completed().await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod component;
mod config;
mod consent;
mod controller;
mod error;
mod exchange;
mod results;
mod runner;

pub use client::*;
pub use component::*;
pub use config::*;
pub use consent::*;
pub use controller::*;
pub use error::*;
pub use exchange::*;
pub use results::*;
pub use runner::*;

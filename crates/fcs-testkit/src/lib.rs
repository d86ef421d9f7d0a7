//! FCS Test Kit - mock ASPSP and fixtures for conformance suite tests
//!
//! - [`MockAspsp`] - wiremock server speaking just enough Open Banking for
//!   token, consent and resource requests
//! - [`fixtures`] - run contexts, signing keys and test case builders
//! - Assertion helpers over contexts and detailed errors
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use fcs_testkit::{MockAspsp, fixtures};
//!
//! #[tokio::test]
//! async fn accounts_are_listed() {
//!     fcs_testkit::init_test_tracing();
//!
//!     let aspsp = MockAspsp::start().await;
//!     aspsp.expect_get("/accounts", 200, serde_json::json!({"Data": {}})).await;
//!
//!     let mut ctx = fixtures::run_context(&aspsp.base_url());
//!     let test = fixtures::test_case("#t1000", "GET", "/accounts", 200);
//!     let request = test.prepare(&mut ctx).unwrap();
//!     assert!(request.url.ends_with("/accounts"));
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assertions;
pub mod fixtures;
mod mock_aspsp;
mod tracing_config;

pub use assertions::*;
pub use mock_aspsp::*;
pub use tracing_config::*;

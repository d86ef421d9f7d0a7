//! FCS Manifest - token requirements for a conformance run
//!
//! Each test case declares the permissions it needs (`permissions`) and the
//! ones it must not be granted (`permissions-excluded`). This crate groups
//! the tests of a specification into named tokens so that the consent
//! orchestrator knows which consents to acquire, and then points each test
//! at its token.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod resolver;
mod spec_type;

pub use error::*;
pub use resolver::*;
pub use spec_type::*;

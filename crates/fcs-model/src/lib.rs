//! FCS Model - test case definitions, context substitution, and response validation
//!
//! A [`TestCase`] is a request template plus expectations. Preparing it
//! against a [`Context`] substitutes `$name` tokens and yields a
//! [`PreparedRequest`]; validating an [`HttpResponse`] checks the
//! expectations and copies `contextPut` values back into the context so
//! later test cases can use them.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod claims;
mod context;
mod error;
mod expect;
mod input;
pub mod jsonpath;
mod response;
mod schema;
mod spec;
pub mod template;
mod testcase;

pub use claims::*;
pub use context::*;
pub use error::*;
pub use expect::*;
pub use input::*;
pub use response::*;
pub use schema::*;
pub use spec::*;
pub use template::{Substitution, replace};
pub use testcase::*;

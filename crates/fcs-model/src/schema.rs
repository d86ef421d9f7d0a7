//! Response schema validation seam.

use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::response::HttpResponse;

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaFailure {
    /// JSON pointer of the offending field (empty for the document root).
    pub field: String,
    pub message: String,
}

impl fmt::Display for SchemaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Checks a response body against the schema for its operation.
pub trait SchemaValidator: Send + Sync {
    /// Every violated constraint. Empty when valid or when no schema applies.
    fn validate(&self, response: &HttpResponse) -> Vec<SchemaFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

fn parse_template(template: &str) -> Vec<Segment> {
    template
        .trim_matches('/')
        .split('/')
        .map(|s| {
            if s.starts_with('{') && s.ends_with('}') {
                Segment::Param
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

fn path_matches(template: &[Segment], path: &str) -> bool {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    template.len() == parts.len()
        && template.iter().zip(parts).all(|(seg, part)| match seg {
            Segment::Literal(lit) => lit == part,
            Segment::Param => !part.is_empty(),
        })
}

struct Route {
    method: String,
    template: Vec<Segment>,
    status: u16,
    validator: Arc<Validator>,
}

/// [`SchemaValidator`] backed by compiled JSON Schemas keyed by
/// method, path template (`/accounts/{AccountId}`) and status.
#[derive(Default)]
pub struct JsonSchemaValidator {
    routes: Vec<Route>,
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl JsonSchemaValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema for one operation and status.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Definition`] if `schema` is not a valid JSON Schema.
    pub fn with_schema(
        mut self,
        method: &str,
        path_template: &str,
        status: u16,
        schema: &Value,
    ) -> ModelResult<Self> {
        let validator = Validator::new(schema)
            .map_err(|e| ModelError::Definition(format!("invalid JSON Schema: {e}")))?;
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            template: parse_template(path_template),
            status,
            validator: Arc::new(validator),
        });
        Ok(self)
    }

    fn route_for(&self, response: &HttpResponse) -> Option<&Route> {
        self.routes.iter().find(|r| {
            r.status == response.status
                && r.method.eq_ignore_ascii_case(&response.method)
                && path_matches(&r.template, &response.path)
        })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, response: &HttpResponse) -> Vec<SchemaFailure> {
        let Some(route) = self.route_for(response) else {
            tracing::debug!(
                method = %response.method,
                path = %response.path,
                status = response.status,
                "no schema registered"
            );
            return Vec::new();
        };
        let Some(body) = response.json() else {
            return vec![SchemaFailure {
                field: String::new(),
                message: "response body is not JSON".to_string(),
            }];
        };
        route
            .validator
            .iter_errors(&body)
            .map(|err| SchemaFailure {
                field: err.instance_path.to_string(),
                message: err.to_string(),
            })
            .collect()
    }
}

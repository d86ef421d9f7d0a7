//! Shared mutable key/value store used for `$name` substitution.
//!
//! A [`Context`] is created per run or per consent flow. Template processing
//! and the consent orchestrator write into it; later test cases read from it.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};

/// Context key holding the JWT signing key.
pub const SIGNING_KEY: &str = "signing_key";

/// A value held by a [`Context`].
#[derive(Clone)]
pub enum ContextValue {
    String(String),
    StringSlice(Vec<String>),
    /// Typed handle (for example a [`crate::SigningKey`]).
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl ContextValue {
    /// Human-readable kind name used in type-mismatch errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::StringSlice(_) => "string slice",
            Self::Opaque(_) => "opaque value",
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::StringSlice(v) => f.debug_tuple("StringSlice").field(v).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringSlice(value)
    }
}

/// String-keyed store of [`ContextValue`]s.
///
/// Lookups are exact. A missing key is always reported as
/// [`ContextError::NotFound`], never as an empty value.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> ContextResult<&ContextValue> {
        self.values
            .get(key)
            .ok_or_else(|| ContextError::NotFound(key.to_string()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Look up a string value.
    pub fn get_string(&self, key: &str) -> ContextResult<&str> {
        match self.get(key)? {
            ContextValue::String(s) => Ok(s),
            other => Err(mismatch(key, "string", other)),
        }
    }

    /// Look up a string-slice value.
    pub fn get_string_slice(&self, key: &str) -> ContextResult<&[String]> {
        match self.get(key)? {
            ContextValue::StringSlice(v) => Ok(v),
            other => Err(mismatch(key, "string slice", other)),
        }
    }

    /// Look up an opaque value of type `T`.
    pub fn get_opaque<T: Any + Send + Sync>(&self, key: &str) -> ContextResult<Arc<T>> {
        match self.get(key)? {
            ContextValue::Opaque(handle) => Arc::clone(handle)
                .downcast::<T>()
                .map_err(|_| ContextError::TypeMismatch {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                    actual: "opaque value",
                }),
            other => Err(mismatch(key, std::any::type_name::<T>(), other)),
        }
    }

    /// Insert any value, replacing what was there.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), ContextValue::String(value.into()));
    }

    pub fn put_string_slice(&mut self, key: impl Into<String>, value: Vec<String>) {
        self.values
            .insert(key.into(), ContextValue::StringSlice(value));
    }

    pub fn put_opaque<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values
            .insert(key.into(), ContextValue::Opaque(Arc::new(value)));
    }

    /// Bulk-insert string values.
    pub fn put_map<K, V, I>(&mut self, entries: I)
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put_string(key, value);
        }
    }

    /// Merge `other` into `self`.
    ///
    /// Every key of `other` is copied, overwriting an equal key in `self`.
    /// Keys only present in `self` are left untouched.
    pub fn put_context(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Remove a key, returning its previous value.
    pub fn delete(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Log every entry at trace level with keys matching `redact_fields` masked.
    ///
    /// Nothing is serialized unless trace output is enabled.
    pub fn dump(&self, redact_fields: &[&str]) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        let snapshot = serde_json::to_value(self).unwrap_or_default();
        let redacted = fcs_telemetry::redact_sensitive(&snapshot, redact_fields);
        tracing::trace!(context = %redacted, entries = self.len(), "context dump");
    }
}

fn mismatch(key: &str, expected: &'static str, actual: &ContextValue) -> ContextError {
    ContextError::TypeMismatch {
        key: key.to_string(),
        expected,
        actual: actual.kind(),
    }
}

impl<K: Into<String>, V: Into<ContextValue>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Self::new();
        for (key, value) in iter {
            ctx.put(key, value);
        }
        ctx
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde
// ─────────────────────────────────────────────────────────────────────────────

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let visible: Vec<_> = self
            .values
            .iter()
            .filter(|(_, v)| !matches!(v, ContextValue::Opaque(_)))
            .collect();
        let mut map = serializer.serialize_map(Some(visible.len()))?;
        for (key, value) in visible {
            match value {
                ContextValue::String(s) => map.serialize_entry(key, s)?,
                ContextValue::StringSlice(v) => map.serialize_entry(key, v)?,
                ContextValue::Opaque(_) => {}
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlainValue {
    String(String),
    StringSlice(Vec<String>),
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContextVisitor;

        impl<'de> Visitor<'de> for ContextVisitor {
            type Value = Context;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of strings or string arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Context, A::Error> {
                let mut ctx = Context::new();
                while let Some((key, value)) = access.next_entry::<String, PlainValue>()? {
                    match value {
                        PlainValue::String(s) => ctx.put_string(key, s),
                        PlainValue::StringSlice(v) => ctx.put_string_slice(key, v),
                    }
                }
                Ok(ctx)
            }
        }

        deserializer.deserialize_map(ContextVisitor)
    }
}

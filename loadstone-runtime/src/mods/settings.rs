//! Settings Collaborators and Persistence Helpers
//!
//! Settings-value semantics live outside the core: the lifecycle only decides
//! *when* values load and save. A declared setting exposes a factory
//! ([`Setting`]) that creates its default value handler; the handler
//! ([`SettingValue`]) moves values in and out of JSON.
//!
//! Persisted files are rewritten wholesale on every save, pretty-printed
//! with a 4-space indent. Keys found on disk that no registered handler
//! covers are round-tripped verbatim so stale data is never silently dropped.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};

use crate::error::{ModError, ModResult};

/// A live handler for one setting key.
pub trait SettingValue: Send {
    /// Load the handler's state from a JSON value.
    ///
    /// Returns `false` if the value was not acceptable; the lifecycle logs
    /// and keeps going.
    fn load(&mut self, value: &Value) -> bool;

    /// Save the handler's state into `out`.
    ///
    /// Returns `false` on failure; the lifecycle logs and keeps going.
    fn save(&self, out: &mut Value) -> bool;
}

/// A declared setting definition.
pub trait Setting: Send {
    /// Create the default value handler for this setting, if it has one.
    fn create_default_value(&self) -> Option<Box<dyn SettingValue>>;
}

/// Handler that stores the raw JSON value as-is.
///
/// Useful for hosts that treat settings opaquely, and as a minimal
/// collaborator in tests.
#[derive(Debug, Clone)]
pub struct RawSettingValue {
    value: Value,
}

impl RawSettingValue {
    /// Create a handler holding `value`.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl SettingValue for RawSettingValue {
    fn load(&mut self, value: &Value) -> bool {
        self.value = value.clone();
        true
    }

    fn save(&self, out: &mut Value) -> bool {
        *out = self.value.clone();
        true
    }
}

/// Declaration of a raw (schema-less) setting with a default value.
#[derive(Debug, Clone)]
pub struct RawSetting {
    default: Value,
}

impl RawSetting {
    /// Declare a raw setting whose default is `default`.
    pub fn new(default: Value) -> Self {
        Self { default }
    }
}

impl Setting for RawSetting {
    fn create_default_value(&self) -> Option<Box<dyn SettingValue>> {
        Some(Box::new(RawSettingValue::new(self.default.clone())))
    }
}

/// Serialize a JSON value pretty-printed with a 4-space indent.
pub fn to_pretty_json(value: &Value) -> ModResult<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ModError::parse(format!("unable to serialize JSON: {}", e)))?;
    String::from_utf8(buf).map_err(|e| ModError::parse(format!("invalid UTF-8 in JSON: {}", e)))
}

//! JSON value assembly helpers.

use serde::Serialize;
use serde_json::{Map, Value};

/// Incremental builder for JSON objects, for printers that assemble a
/// record before deciding how to emit it.
#[derive(Default)]
pub struct JsonValueBuilder {
    map: Map<String, Value>,
}

impl JsonValueBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field.
    pub fn string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.map.insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// Add a string field if the value is Some.
    pub fn string_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.string(key, v),
            None => self,
        }
    }

    /// Add an unsigned integer field.
    pub fn u64(mut self, key: &str, value: u64) -> Self {
        self.map.insert(key.to_string(), Value::Number(value.into()));
        self
    }

    /// Add an unsigned integer field if the value is Some.
    pub fn u64_opt(self, key: &str, value: Option<u64>) -> Self {
        match value {
            Some(v) => self.u64(key, v),
            None => self,
        }
    }

    /// Add a boolean field.
    pub fn bool(mut self, key: &str, value: bool) -> Self {
        self.map.insert(key.to_string(), Value::Bool(value));
        self
    }

    /// Add any serializable field.
    pub fn field<T: Serialize>(mut self, key: &str, value: &T) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.map.insert(key.to_string(), v);
        }
        self
    }

    /// Finish into a JSON value.
    pub fn build(self) -> Value {
        Value::Object(self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let value = JsonValueBuilder::new()
            .string("ifname", "eth0")
            .u64("mtu", 1500)
            .u64_opt("master", None)
            .bool("up", true)
            .build();

        assert_eq!(value["ifname"], "eth0");
        assert_eq!(value["mtu"], 1500);
        assert!(value.get("master").is_none());
        assert_eq!(value["up"], true);
    }
}

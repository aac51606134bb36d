//! Ordered key/value parameter sets handed to the engine at creation time.
//!
//! The builder is the only mutable view; once built, a [`Settings`] is a
//! read-only value that is moved into the creation call that consumes it.
//! No validation happens here, the engine validates keys when it receives them.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A typed scalar stored under a settings key.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for SettingsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsValue::Bool(v) => write!(f, "{v}"),
            SettingsValue::Int(v) => write!(f, "{v}"),
            SettingsValue::Double(v) => write!(f, "{v}"),
            SettingsValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SettingsValue {
    fn from(v: bool) -> Self {
        SettingsValue::Bool(v)
    }
}

impl From<i64> for SettingsValue {
    fn from(v: i64) -> Self {
        SettingsValue::Int(v)
    }
}

impl From<i32> for SettingsValue {
    fn from(v: i32) -> Self {
        SettingsValue::Int(v as i64)
    }
}

impl From<f64> for SettingsValue {
    fn from(v: f64) -> Self {
        SettingsValue::Double(v)
    }
}

impl From<&str> for SettingsValue {
    fn from(v: &str) -> Self {
        SettingsValue::String(v.to_string())
    }
}

impl From<String> for SettingsValue {
    fn from(v: String) -> Self {
        SettingsValue::String(v)
    }
}

/// Immutable, insertion-ordered settings map.
///
/// Built through [`SettingsBuilder`]; consumers only read. A key written twice
/// keeps its first position and the last value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    entries: Vec<(String, SettingsValue)>,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    pub fn get(&self, key: &str) -> Option<&SettingsValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(SettingsValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(SettingsValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(SettingsValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(SettingsValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingsValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// Fluent, chainable builder for [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    entries: Vec<(String, SettingsValue)>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from an initial mapping.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<SettingsValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut builder = Self::new();
        for (key, value) in pairs {
            builder = builder.set(key, value);
        }
        builder
    }

    /// Insert or overwrite a key. Last write wins, first write fixes position.
    pub fn set<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<SettingsValue>,
    {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn set_string<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        self.set(key, SettingsValue::String(value.into()))
    }

    pub fn set_int<K: Into<String>>(self, key: K, value: i64) -> Self {
        self.set(key, SettingsValue::Int(value))
    }

    pub fn set_double<K: Into<String>>(self, key: K, value: f64) -> Self {
        self.set(key, SettingsValue::Double(value))
    }

    pub fn set_bool<K: Into<String>>(self, key: K, value: bool) -> Self {
        self.set(key, SettingsValue::Bool(value))
    }

    pub fn build(self) -> Settings {
        Settings {
            entries: self.entries,
        }
    }
}

// Serialized as a plain JSON object; deserialization keeps document order,
// which is what fixes the map order for settings loaded from a config file.
impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match value {
                SettingsValue::Bool(v) => map.serialize_entry(key, v)?,
                SettingsValue::Int(v) => map.serialize_entry(key, v)?,
                SettingsValue::Double(v) => map.serialize_entry(key, v)?,
                SettingsValue::String(v) => map.serialize_entry(key, v)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SettingsVisitor;

        impl<'de> Visitor<'de> for SettingsVisitor {
            type Value = Settings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of scalar settings values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Settings, A::Error> {
                let mut builder = SettingsBuilder::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::Bool(v) => SettingsValue::Bool(v),
                        serde_json::Value::Number(n) => {
                            if let Some(v) = n.as_i64() {
                                SettingsValue::Int(v)
                            } else if let Some(v) = n.as_f64() {
                                SettingsValue::Double(v)
                            } else {
                                return Err(serde::de::Error::custom(format!(
                                    "unsupported number for settings key '{key}'"
                                )));
                            }
                        }
                        serde_json::Value::String(v) => SettingsValue::String(v),
                        other => {
                            return Err(serde::de::Error::custom(format!(
                                "unsupported value type for settings key '{key}': {other}"
                            )));
                        }
                    };
                    builder = builder.set(key, value);
                }
                Ok(builder.build())
            }
        }

        deserializer.deserialize_map(SettingsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_is_chainable() {
        let settings = Settings::builder()
            .set_string("rate_control", "CQP")
            .set_int("cqp", 23)
            .set_string("preset", "medium")
            .set_bool("capture_cursor", false)
            .build();

        assert_eq!(settings.get_string("rate_control"), Some("CQP"));
        assert_eq!(settings.get_int("cqp"), Some(23));
        assert_eq!(settings.get_bool("capture_cursor"), Some(false));
        assert_eq!(settings.len(), 4);
    }

    #[test]
    fn test_last_write_wins_keeps_position() {
        let settings = Settings::builder()
            .set_int("bitrate", 128)
            .set_string("rate_control", "CBR")
            .set_int("bitrate", 192)
            .build();

        assert_eq!(settings.get_int("bitrate"), Some(192));
        let keys: Vec<&str> = settings.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["bitrate", "rate_control"]);
    }

    #[test]
    fn test_from_pairs_preserves_order() {
        let settings = SettingsBuilder::from_pairs([
            ("preset", SettingsValue::from("medium")),
            ("profile", SettingsValue::from("high")),
        ])
        .build();

        let keys: Vec<&str> = settings.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["preset", "profile"]);
    }

    #[test]
    fn test_typed_getter_rejects_mismatched_type() {
        let settings = Settings::builder().set_int("monitor", 1).build();
        assert_eq!(settings.get_string("monitor"), None);
        assert_eq!(settings.get_int("monitor"), Some(1));
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        let settings: Settings = serde_json::from_str(
            r#"{"rate_control": "CBR", "bitrate": 192, "vbr": false, "quality": 0.8}"#,
        )
        .unwrap();

        let keys: Vec<&str> = settings.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["rate_control", "bitrate", "vbr", "quality"]);
        assert_eq!(settings.get_double("quality"), Some(0.8));
    }
}

//! Instance Configuration
//!
//! `TigerStyle`: A complete, validated [`StoreConfig`] per instance, changed
//! only by merging sparse [`ConfigOptions`] through validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    CONFIG_NAME_DEFAULT, CONFIG_SIZE_BYTES_DEFAULT, CONFIG_STORE_NAME_DEFAULT,
    CONFIG_VERSION_DEFAULT, DRIVER_NAMES_RESERVED,
};
use crate::error::{ForageError, ForageResult};

// =============================================================================
// Driver List
// =============================================================================

/// One driver name or an ordered preference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriverList {
    /// A single driver
    One(String),
    /// Candidates in preference order, first wins
    Many(Vec<String>),
}

impl DriverList {
    /// Candidate names in preference order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name.clone()],
            Self::Many(names) => names.clone(),
        }
    }
}

impl Default for DriverList {
    fn default() -> Self {
        Self::Many(DRIVER_NAMES_RESERVED.iter().map(|s| (*s).to_string()).collect())
    }
}

impl From<&str> for DriverList {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for DriverList {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<Vec<String>> for DriverList {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl From<Vec<&str>> for DriverList {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for DriverList {
    fn from(names: [&str; N]) -> Self {
        Self::Many(names.iter().map(|s| (*s).to_string()).collect())
    }
}

// =============================================================================
// Store Config
// =============================================================================

/// Complete configuration of one façade instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Driver preference; after initialisation, the driver that won
    pub driver: DriverList,
    /// Database name
    pub name: String,
    /// Store (namespace) name, sanitized
    pub store_name: String,
    /// Schema version
    pub version: f64,
    /// Size hint in bytes
    pub size: u64,
    /// Free-form description
    pub description: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: DriverList::default(),
            name: CONFIG_NAME_DEFAULT.to_string(),
            store_name: CONFIG_STORE_NAME_DEFAULT.to_string(),
            version: CONFIG_VERSION_DEFAULT,
            size: CONFIG_SIZE_BYTES_DEFAULT,
            description: String::new(),
        }
    }
}

impl StoreConfig {
    /// Apply `options` on top of this config.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a value is rejected; `self` is untouched.
    pub fn merge(&self, options: &ConfigOptions) -> ForageResult<Self> {
        let mut merged = self.clone();

        if let Some(driver) = &options.driver {
            if driver.names().is_empty() {
                return Err(ForageError::invalid_config(
                    "driver",
                    "at least one driver name is required",
                ));
            }
            merged.driver = driver.clone();
        }
        if let Some(name) = &options.name {
            if name.is_empty() {
                return Err(ForageError::invalid_config("name", "must not be empty"));
            }
            merged.name.clone_from(name);
        }
        if let Some(store_name) = &options.store_name {
            if store_name.is_empty() {
                return Err(ForageError::invalid_config("storeName", "must not be empty"));
            }
            merged.store_name = sanitize_store_name(store_name);
        }
        if let Some(version) = options.version {
            if !version.is_finite() || version <= 0.0 {
                return Err(ForageError::invalid_config(
                    "version",
                    format!("database version must be a positive number, got {version}"),
                ));
            }
            merged.version = version;
        }
        if let Some(size) = options.size {
            merged.size = size;
        }
        if let Some(description) = &options.description {
            merged.description.clone_from(description);
        }

        Ok(merged)
    }

    /// Read one option by its camelCase name.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(key),
            _ => None,
        }
    }

    /// Integer schema version (truncated, at least 1).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn version_number(&self) -> u64 {
        (self.version.trunc() as u64).max(1)
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_store_name(store_name: &str) -> String {
    store_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// =============================================================================
// Config Options
// =============================================================================

/// Sparse configuration overrides; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOptions {
    /// Driver preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverList>,
    /// Database name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Store name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    /// Schema version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<f64>,
    /// Size hint in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigOptions {
    /// Empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse overrides from JSON (camelCase keys).
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the JSON does not describe options.
    pub fn from_json(json: &str) -> ForageResult<Self> {
        serde_json::from_str(json).map_err(|e| ForageError::invalid_config("options", e.to_string()))
    }

    /// Set the driver preference.
    #[must_use]
    pub fn with_driver(mut self, driver: impl Into<DriverList>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the store name.
    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Set the schema version.
    #[must_use]
    pub fn with_version(mut self, version: f64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the size hint.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DRIVER_NAME_LOCAL;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "forage");
        assert_eq!(config.store_name, "keyvaluepairs");
        assert!((config.version - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.size, 4_980_736);
        assert_eq!(config.driver.names().len(), 3);
    }

    #[test]
    fn test_merge_sanitizes_store_name() {
        let config = StoreConfig::default()
            .merge(&ConfigOptions::new().with_store_name("my-store.v2"))
            .unwrap();
        assert_eq!(config.store_name, "my_store_v2");
    }

    #[test]
    fn test_merge_rejects_bad_version() {
        let base = StoreConfig::default();
        for version in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = base
                .merge(&ConfigOptions::new().with_version(version))
                .unwrap_err();
            assert!(matches!(err, ForageError::InvalidConfig { ref field, .. } if field == "version"));
        }
    }

    #[test]
    fn test_merge_leaves_unset_fields() {
        let base = StoreConfig::default()
            .merge(&ConfigOptions::new().with_description("cache"))
            .unwrap();
        let merged = base.merge(&ConfigOptions::new().with_size(10)).unwrap();
        assert_eq!(merged.description, "cache");
        assert_eq!(merged.size, 10);
        assert_eq!(merged.name, base.name);
    }

    #[test]
    fn test_merge_rejects_empty_name_and_driver_list() {
        let base = StoreConfig::default();
        assert!(base.merge(&ConfigOptions::new().with_name("")).is_err());
        assert!(base
            .merge(&ConfigOptions::new().with_driver(Vec::<String>::new()))
            .is_err());
    }

    #[test]
    fn test_value_uses_camel_case_keys() {
        let config = StoreConfig::default();
        assert_eq!(
            config.value("storeName"),
            Some(Value::String("keyvaluepairs".to_string()))
        );
        assert_eq!(config.value("store_name"), None);
        assert_eq!(config.value("missing"), None);
    }

    #[test]
    fn test_options_from_json() {
        let options = ConfigOptions::from_json(
            r#"{"driver": "localStorageWrapper", "storeName": "s", "version": 2}"#,
        )
        .unwrap();
        assert_eq!(options.driver, Some(DriverList::from(DRIVER_NAME_LOCAL)));
        assert_eq!(options.store_name.as_deref(), Some("s"));
        assert_eq!(options.version, Some(2.0));

        let list = ConfigOptions::from_json(r#"{"driver": ["a", "b"]}"#).unwrap();
        assert_eq!(list.driver.unwrap().names(), vec!["a", "b"]);

        assert!(ConfigOptions::from_json(r#"{"version": "two"}"#).is_err());
    }

    #[test]
    fn test_version_number() {
        let config = StoreConfig::default()
            .merge(&ConfigOptions::new().with_version(2.7))
            .unwrap();
        assert_eq!(config.version_number(), 2);

        let fractional = StoreConfig::default()
            .merge(&ConfigOptions::new().with_version(0.5))
            .unwrap();
        assert_eq!(fractional.version_number(), 1);
    }
}

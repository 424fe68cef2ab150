//! Configuration for the memory store.

use std::env;

/// Environment variable toggling schema validation on save.
pub const VALIDATE_ON_SAVE_VAR: &str = "PLAINSYNC_VALIDATE_ON_SAVE";
/// Environment variable toggling visibility of uncommitted inserts in fetches.
pub const INCLUDE_PENDING_VAR: &str = "PLAINSYNC_INCLUDE_PENDING";

/// Memory store behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Validate every payload against its entity description before commit
    pub validate_on_save: bool,
    /// Let fetches return entities inserted but not yet saved.
    ///
    /// Duplicate suppression within one sync pass relies on this.
    pub include_pending_changes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            validate_on_save: true,
            include_pending_changes: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let validate_on_save = match lookup(VALIDATE_ON_SAVE_VAR) {
            Some(value) => parse_flag(VALIDATE_ON_SAVE_VAR, &value)?,
            None => defaults.validate_on_save,
        };

        let include_pending_changes = match lookup(INCLUDE_PENDING_VAR) {
            Some(value) => parse_flag(INCLUDE_PENDING_VAR, &value)?,
            None => defaults.include_pending_changes,
        };

        Ok(Self {
            validate_on_save,
            include_pending_changes,
        })
    }

    pub fn with_validate_on_save(mut self, validate: bool) -> Self {
        self.validate_on_save = validate;
        self
    }

    pub fn with_include_pending_changes(mut self, include: bool) -> Self {
        self.include_pending_changes = include;
        self
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}: expected true or false")]
    InvalidFlag { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.validate_on_save);
        assert!(config.include_pending_changes);
    }

    #[test]
    fn reads_flags() {
        let config = StoreConfig::from_lookup(lookup(&[
            (VALIDATE_ON_SAVE_VAR, "0"),
            (INCLUDE_PENDING_VAR, " False "),
        ]))
        .unwrap();
        assert!(!config.validate_on_save);
        assert!(!config.include_pending_changes);
    }

    #[test]
    fn rejects_garbage() {
        let result = StoreConfig::from_lookup(lookup(&[(VALIDATE_ON_SAVE_VAR, "maybe")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidFlag {
                name: VALIDATE_ON_SAVE_VAR,
                value: "maybe".into()
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid value 'maybe' for PLAINSYNC_VALIDATE_ON_SAVE: expected true or false"
        );
    }

    #[test]
    fn builder_methods() {
        let config = StoreConfig::default()
            .with_validate_on_save(false)
            .with_include_pending_changes(false);
        assert!(!config.validate_on_save);
        assert!(!config.include_pending_changes);
    }
}

//! Environment overrides
//!
//! The only place the orchestrator reads the process environment. Every
//! `OMNIBOOT_*` variable becomes a lower-case key with the prefix
//! stripped (`OMNIBOOT_APP_MAX_ATTEMPTS` → `app_max_attempts`).

use std::collections::BTreeMap;
use std::str::FromStr;

pub const ENV_PREFIX: &str = "OMNIBOOT_";

/// Unprefixed variables honoured for compatibility with existing deployments
const ALIASES: &[(&str, &str)] = &[("ENVIRONMENT", "environment")];

/// Flat mapping of named settings, consumed once by the synthesizer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<String, String>,
}

impl Overrides {
    /// Snapshot the current process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from `(name, value)` pairs in environment-variable form
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prefixed = BTreeMap::new();
        let mut aliased = BTreeMap::new();

        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                if !key.is_empty() {
                    prefixed.insert(key.to_ascii_lowercase(), value);
                }
            } else if let Some((_, key)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
                aliased.insert(key.to_string(), value);
            }
        }

        // Prefixed names win over aliases
        aliased.extend(prefixed);
        Self { values: aliased }
    }

    /// Builder-style insertion of an already-normalized key
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Parse a typed value; an unparseable value is reported in `rejected`
    /// and treated as unset.
    pub fn parse<T: FromStr>(&self, key: &str, rejected: &mut Vec<String>) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                rejected.push(key.to_string());
                None
            }
        }
    }

    /// Like [`parse`](Self::parse), but a zero value is rejected too
    pub fn positive<T>(&self, key: &str, rejected: &mut Vec<String>) -> Option<T>
    where
        T: FromStr + Default + PartialEq,
    {
        match self.parse::<T>(key, rejected) {
            Some(value) if value == T::default() => {
                rejected.push(key.to_string());
                None
            }
            other => other,
        }
    }

    /// Parse a boolean switch (`1/true/yes/on`, `0/false/no/off`)
    pub fn flag(&self, key: &str, rejected: &mut Vec<String>) -> Option<bool> {
        let raw = self.get(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                rejected.push(key.to_string());
                None
            }
        }
    }

    /// Non-empty string value
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

//! Typed settings on top of the shared config store.
//!
//! This layer owns the two pieces of derived state the agent cares about:
//! the API key (validated against the expected shape before it is trusted or
//! persisted) and the debug flag (cached per instance after first read,
//! refreshed whenever the setting changes).

use crate::config::{ConfigError, ConfigStore};
use regex::Regex;
use std::sync::{Mutex, OnceLock};

const SETTINGS_SECTION: &str = "settings";
const API_KEY_KEY: &str = "api_key";
const DEBUG_KEY: &str = "debug";

fn api_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("API key pattern is valid")
    })
}

/// Check whether a string has the shape of a Tempo API key.
///
/// Keys look like version-4 UUIDs: 8-4-4-4-12 hex digits with the version
/// nibble fixed to `4` and the variant nibble in `8`, `9`, `a`, `b`.
/// Matching is case-insensitive. Anything else is treated as no key at all.
pub fn is_valid_api_key(key: &str) -> bool {
    !key.is_empty() && api_key_pattern().is_match(key)
}

/// Agent settings persisted in the shared config file.
pub struct Settings {
    store: ConfigStore,
    debug_cache: Mutex<Option<bool>>,
}

impl Settings {
    /// Create settings backed by the given store.
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            debug_cache: Mutex::new(None),
        }
    }

    /// Get the backing store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Get the saved API key, or an empty string when it is absent or does
    /// not look like a key.
    pub fn api_key(&self) -> String {
        let key = self.store.read(SETTINGS_SECTION, API_KEY_KEY);
        if is_valid_api_key(&key) {
            key
        } else {
            String::new()
        }
    }

    /// Check whether a usable API key is saved.
    pub fn has_api_key(&self) -> bool {
        !self.api_key().is_empty()
    }

    /// Persist the API key. Invalid values are rejected without writing;
    /// returns whether the key was saved.
    pub fn set_api_key(&self, key: &str) -> Result<bool, ConfigError> {
        if !is_valid_api_key(key) {
            return Ok(false);
        }
        self.store.write(SETTINGS_SECTION, API_KEY_KEY, key)?;
        Ok(true)
    }

    /// Check whether debug logging is enabled.
    ///
    /// The value is read from the config file once and cached for the life
    /// of this instance; [`Settings::set_debug`] refreshes the cache.
    /// Absent or unparseable values count as disabled.
    pub fn debug_enabled(&self) -> bool {
        let mut cache = self.debug_cache.lock().expect("debug cache lock poisoned");
        match *cache {
            Some(enabled) => enabled,
            None => {
                let enabled = self.store.read(SETTINGS_SECTION, DEBUG_KEY) == "true";
                *cache = Some(enabled);
                enabled
            }
        }
    }

    /// Persist the debug flag and refresh the cached value.
    pub fn set_debug(&self, enabled: bool) -> Result<(), ConfigError> {
        self.store.write(
            SETTINGS_SECTION,
            DEBUG_KEY,
            if enabled { "true" } else { "false" },
        )?;
        let mut cache = self.debug_cache.lock().expect("debug cache lock poisoned");
        *cache = Some(enabled);
        Ok(())
    }
}

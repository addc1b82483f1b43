//! Configuration for creating a credential manager.

use crate::{CredStoreError, CredentialPersistence, CredentialType, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment variable selecting the API (`win32` or `mock`).
pub const ENV_API: &str = "CREDSTORE_API";
/// Environment variable overriding the default credential type.
pub const ENV_DEFAULT_TYPE: &str = "CREDSTORE_DEFAULT_TYPE";
/// Environment variable overriding the default persistence.
pub const ENV_DEFAULT_PERSISTENCE: &str = "CREDSTORE_DEFAULT_PERSISTENCE";

/// Credential API identifier.
///
/// Each variant corresponds to a [`CredentialApi`](crate::native::CredentialApi)
/// implementation registered with the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// The Windows Credential Manager (Windows only)
    Win32,
    /// In-memory store (requires the `mock` feature)
    Mock,
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win32 => write!(f, "win32"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for ApiType {
    type Err = CredStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "win32" | "wincred" => Ok(Self::Win32),
            "mock" => Ok(Self::Mock),
            other => Err(CredStoreError::Other(anyhow::anyhow!(
                "unknown credential API: {}",
                other
            ))),
        }
    }
}

/// Configuration for creating a [`CredentialManager`](crate::CredentialManager).
///
/// Use the builder pattern for ergonomic configuration:
///
/// ```
/// use credstore::{ApiType, Config, CredentialPersistence, CredentialType};
///
/// let config = Config::new(ApiType::Mock)
///     .with_default_type(CredentialType::DomainPassword)
///     .with_default_persistence(CredentialPersistence::Session)
///     .with_option("label", "tests");
/// assert_eq!(config.get_option("label").map(String::as_str), Some("tests"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API implementation
    pub api: ApiType,

    /// Type used by `find_default` and the manager's builder (default: Generic)
    pub default_type: CredentialType,

    /// Persistence used by the manager's builder (default: LocalMachine)
    pub default_persistence: CredentialPersistence,

    /// API-specific options
    pub options: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: if cfg!(windows) {
                ApiType::Win32
            } else {
                ApiType::Mock
            },
            default_type: CredentialType::Generic,
            default_persistence: CredentialPersistence::LocalMachine,
            options: HashMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration for the specified API.
    ///
    /// # Example
    ///
    /// ```
    /// use credstore::{ApiType, Config};
    ///
    /// let config = Config::new(ApiType::Win32);
    /// assert_eq!(config.api, ApiType::Win32);
    /// ```
    pub fn new(api: ApiType) -> Self {
        Self {
            api,
            ..Default::default()
        }
    }

    /// Builds a configuration from `CREDSTORE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses a configuration from JSON. Missing fields keep their defaults.
    ///
    /// ```
    /// use credstore::{ApiType, Config, CredentialType};
    ///
    /// let config = Config::from_json(r#"{"api": "mock", "default_type": "DomainPassword"}"#)?;
    /// assert_eq!(config.api, ApiType::Mock);
    /// assert_eq!(config.default_type, CredentialType::DomainPassword);
    /// # Ok::<(), credstore::CredStoreError>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(api) = lookup(ENV_API) {
            config.api = api.parse()?;
        }
        if let Some(cred_type) = lookup(ENV_DEFAULT_TYPE) {
            config.default_type = cred_type.parse()?;
        }
        if let Some(persistence) = lookup(ENV_DEFAULT_PERSISTENCE) {
            config.default_persistence = persistence.parse()?;
        }
        Ok(config)
    }

    /// Sets the default credential type.
    pub fn with_default_type(mut self, cred_type: CredentialType) -> Self {
        self.default_type = cred_type;
        self
    }

    /// Sets the default persistence.
    pub fn with_default_persistence(mut self, persistence: CredentialPersistence) -> Self {
        self.default_persistence = persistence;
        self
    }

    /// Adds an API-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Gets an API-specific option value.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }
}

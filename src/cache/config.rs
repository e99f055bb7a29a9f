//! Configuration for [`CacheMiddleware`](super::CacheMiddleware).

use std::{convert::Infallible, str::FromStr};

use serde::{Deserialize, Deserializer};

use crate::http::QueryMap;

/// Deployment environment the middleware runs in.
///
/// Cache failures are logged as warnings everywhere except [`Production`](Self::Production).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = Infallible;

    /// `"production"` or `"prod"` (any case) is production; anything else is development.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("production") || s.eq_ignore_ascii_case("prod") {
            Ok(Self::Production)
        } else {
            Ok(Self::Development)
        }
    }
}

/// Accepts the same spellings as [`FromStr`].
impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let Ok(environment) = raw.parse::<Self>();
        Ok(environment)
    }
}

/// Per-middleware settings, fixed at construction.
///
/// Every field is optional when deserializing; missing fields take their
/// defaults.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{CacheConfig, Environment};
///
/// let config: CacheConfig = serde_json::from_str(
///     r#"{ "prefix": "api", "cacheControlAccessibility": "private", "defaults": { "page": 1 } }"#,
/// ).unwrap();
/// assert_eq!(config.prefix, "api");
/// assert_eq!(config.environment, Environment::Development);
///
/// let config = CacheConfig::new().prefix("api").environment(Environment::Production);
/// assert_eq!(config.cache_control_accessibility, "public");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Prepended to every cache key, separated by a single `:`.
    pub prefix: String,
    /// Token placed before `max-age` in the replayed `Cache-Control` header.
    pub cache_control_accessibility: String,
    /// Query parameter values assumed when a request omits them.
    pub defaults: QueryMap,
    pub environment: Environment,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            cache_control_accessibility: "public".to_string(),
            defaults: QueryMap::new(),
            environment: Environment::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn cache_control_accessibility(mut self, accessibility: impl Into<String>) -> Self {
        self.cache_control_accessibility = accessibility.into();
        self
    }

    /// Adds a default value for one query parameter.
    #[must_use]
    pub fn default_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

//! Per-scope rate restrictions.
//!
//! A restriction pairs an interval with the number of events allowed in it.
//! Restrictions are registered programmatically on the limiter or loaded in
//! bulk from a YAML restriction file:
//!
//! ```yaml
//! restrictions:
//!   login:
//!     interval: 60s
//!     max_events: 5
//!   search:
//!     requests_per_unit: 100
//!     unit: minute
//!     name: search queries
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RateFoldError, Result};

/// The `(interval, max_events)` pair governing a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restriction {
    /// Base interval covered by the smallest window
    pub interval: Duration,
    /// Events allowed per interval
    pub max_events: u64,
}

impl Restriction {
    pub fn new(interval: Duration, max_events: u64) -> Self {
        Self {
            interval,
            max_events,
        }
    }
}

/// Thread-safe scope → restriction table.
///
/// Writers replace the whole entry, so readers always observe a complete
/// restriction and the last write wins.
#[derive(Debug, Default)]
pub struct RestrictionRegistry {
    restrictions: RwLock<HashMap<String, Restriction>>,
}

impl RestrictionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite the restriction for `scope`.
    pub fn set(&self, scope: &str, restriction: Restriction) {
        self.restrictions
            .write()
            .insert(scope.to_string(), restriction);
    }

    /// Look up the restriction for `scope`.
    pub fn get(&self, scope: &str) -> Option<Restriction> {
        self.restrictions.read().get(scope).copied()
    }

    /// Number of configured scopes.
    pub fn len(&self) -> usize {
        self.restrictions.read().len()
    }
}

/// A set of restrictions as read from a restriction file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestrictionSet {
    /// Map of scope name to its rule
    #[serde(default)]
    pub restrictions: HashMap<String, RestrictionRule>,
}

/// A restriction as written in configuration.
///
/// The window is given either as a free-form `interval` or as an Envoy-style
/// `unit`; exactly one of the two must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionRule {
    /// Number of events allowed per window
    #[serde(alias = "requests_per_unit")]
    pub max_events: u64,
    /// Window length, e.g. `500ms`, `60s`, `5m`, or integer milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalSpec>,
    /// Window length as a named unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TimeUnit>,
    /// Optional description of this restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Interval as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSpec {
    /// Plain milliseconds
    Millis(u64),
    /// Number followed by `ms`, `s`, `m`, `h`, or `d`
    Text(String),
}

/// Named time unit for restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl IntervalSpec {
    /// Resolve the configured text into a duration.
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            IntervalSpec::Millis(ms) => Ok(Duration::from_millis(*ms)),
            IntervalSpec::Text(text) => parse_interval(text),
        }
    }
}

/// Parse an interval such as `250ms`, `60s`, `5m`, `1h` or `1d`.
///
/// A bare number is taken as milliseconds.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| RateFoldError::Config(format!("Invalid interval '{}'", text)))?;

    let duration = match suffix.trim() {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(3600)),
        "d" => Duration::from_secs(value.saturating_mul(86400)),
        other => {
            return Err(RateFoldError::Config(format!(
                "Unknown interval unit '{}' in '{}'",
                other, text
            )))
        }
    };
    Ok(duration)
}

impl RestrictionRule {
    /// Validate the rule and turn it into a [`Restriction`].
    pub fn to_restriction(&self) -> Result<Restriction> {
        let interval = match (&self.interval, self.unit) {
            (Some(spec), None) => spec.to_duration()?,
            (None, Some(unit)) => unit.duration(),
            (Some(_), Some(_)) => {
                return Err(RateFoldError::Config(
                    "Set either 'interval' or 'unit', not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(RateFoldError::Config(
                    "Missing 'interval' or 'unit'".to_string(),
                ))
            }
        };

        if interval.is_zero() {
            return Err(RateFoldError::Config(
                "Interval must be positive".to_string(),
            ));
        }
        if self.max_events == 0 {
            return Err(RateFoldError::Config(
                "max_events must be positive".to_string(),
            ));
        }

        Ok(Restriction::new(interval, self.max_events))
    }
}

impl RestrictionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load restrictions from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading restriction file");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load restrictions from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            RateFoldError::Config(format!("Failed to parse restriction file: {}", e))
        })
    }

    /// Add a rule in code.
    pub fn insert(&mut self, scope: &str, rule: RestrictionRule) {
        self.restrictions.insert(scope.to_string(), rule);
    }

    /// Resolve every rule, failing on the first invalid one.
    pub fn resolve(&self) -> Result<Vec<(String, Restriction)>> {
        let mut resolved = Vec::with_capacity(self.restrictions.len());
        for (scope, rule) in &self.restrictions {
            let restriction = rule.to_restriction().map_err(|e| match e {
                RateFoldError::Config(msg) => {
                    RateFoldError::Config(format!("Scope '{}': {}", scope, msg))
                }
                other => other,
            })?;
            resolved.push((scope.clone(), restriction));
        }
        Ok(resolved)
    }
}

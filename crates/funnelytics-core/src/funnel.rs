//! User-authored funnel definitions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FunnelError;
use crate::schema::{DataSource, TimestampUnit};

/// How a step parameter filter matches an event parameter value.
///
/// Classified once when the raw value is parsed: a value containing the `%`
/// wildcard is a LIKE-style pattern, anything else is an exact equality
/// match. Renderers and matchers never re-inspect the raw string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMatch {
    Equals(String),
    Pattern(String),
}

impl ParamMatch {
    pub fn parse(raw: &str) -> Self {
        if raw.contains('%') {
            Self::Pattern(raw.to_string())
        } else {
            Self::Equals(raw.to_string())
        }
    }

    /// In-memory equivalent of the rendered SQL predicate: prefix, suffix or
    /// substring match depending on where the wildcard sits.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Pattern(pattern) => match_like(pattern, value),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::Equals(raw) | Self::Pattern(raw) => raw,
        }
    }
}

fn match_like(pattern: &str, value: &str) -> bool {
    let leading = pattern.starts_with('%');
    let trailing = pattern.len() > 1 && pattern.ends_with('%');
    let needle = pattern.trim_matches('%');
    match (leading, trailing) {
        (true, true) => value.contains(needle),
        (true, false) => value.ends_with(needle),
        (false, true) => value.starts_with(needle),
        (false, false) => match pattern.split_once('%') {
            Some((prefix, suffix)) => {
                value.len() >= prefix.len() + suffix.len()
                    && value.starts_with(prefix)
                    && value.ends_with(suffix)
            }
            None => value == pattern,
        },
    }
}

/// One required action in the funnel sequence. Position in the containing
/// `steps` vector defines the required chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStep {
    pub name: String,
    /// Parameter filters applied to this step only. Ordered map so derived
    /// plans are structurally identical across builds.
    #[serde(default)]
    pub params: BTreeMap<String, ParamMatch>,
}

impl EventStep {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, raw_value: &str) -> Self {
        self.params.insert(key.into(), ParamMatch::parse(raw_value));
        self
    }
}

/// Maximum time span for completing later steps, measured from the user's
/// step-0 match. Held in seconds; guaranteed positive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    seconds: i64,
}

impl Window {
    pub fn from_seconds(seconds: i64) -> Result<Self, FunnelError> {
        if seconds <= 0 {
            return Err(FunnelError::Validation(
                "window must be a positive duration".to_string(),
            ));
        }
        Ok(Self { seconds })
    }

    /// Parse a compact duration such as `"90s"`, `"30m"`, `"8h"` or `"7d"`.
    pub fn parse(raw: &str) -> Result<Self, FunnelError> {
        let trimmed = raw.trim();
        let mut chars = trimmed.chars();
        let unit = chars.next_back().ok_or_else(|| {
            FunnelError::Validation(format!("invalid window '{raw}': expected a value like '24h'"))
        })?;
        let magnitude = chars.as_str();
        let value: i64 = magnitude.parse().map_err(|_| {
            FunnelError::Validation(format!("invalid window magnitude '{magnitude}'"))
        })?;
        let multiplier = match unit.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            other => {
                return Err(FunnelError::Validation(format!(
                    "unsupported window unit '{other}': use s, m, h or d"
                )))
            }
        };
        Self::from_seconds(value * multiplier)
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// The window expressed in a schema profile's timestamp unit.
    pub fn in_unit(&self, unit: TimestampUnit) -> i64 {
        match unit {
            TimestampUnit::Seconds => self.seconds,
            TimestampUnit::Microseconds => self.seconds * 1_000_000,
        }
    }
}

/// Inclusive calendar date range for the funnel's base event scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FunnelError> {
        let range = Self { start, end };
        range.check()?;
        Ok(range)
    }

    pub(crate) fn check(&self) -> Result<(), FunnelError> {
        if self.start > self.end {
            return Err(FunnelError::Validation(format!(
                "date range start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// The complete declarative description of a funnel. Validated once at the
/// plan-builder boundary and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub steps: Vec<EventStep>,
    pub date_range: DateRange,
    pub window: Window,
    /// Global equality constraints applied to every step.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub data_source: DataSource,
}

impl FunnelDefinition {
    pub fn validate(&self) -> Result<(), FunnelError> {
        if self.steps.len() < 2 {
            return Err(FunnelError::Validation(format!(
                "a funnel needs at least 2 steps, got {}",
                self.steps.len()
            )));
        }
        for (idx, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(FunnelError::Validation(format!(
                    "step {idx} has an empty event name"
                )));
            }
        }
        self.date_range.check()
    }
}

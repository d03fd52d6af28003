//! Schema profiles for the supported event-log variants.
//!
//! Every column, unit and accessor difference between the generic event
//! table and the GA4 export flows through [`SchemaProfile`], resolved once
//! from the [`DataSource`] tag. Downstream code never branches on the data
//! source directly.

use serde::{Deserialize, Serialize};

use crate::error::FunnelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Standard,
    Ga4,
}

impl DataSource {
    pub fn parse(raw: &str) -> Result<Self, FunnelError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "ga4" => Ok(Self::Ga4),
            other => Err(FunnelError::Configuration(format!(
                "unknown data source '{other}': expected standard or ga4"
            ))),
        }
    }
}

/// Unit of the raw timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampUnit {
    Seconds,
    Microseconds,
}

/// How the date-range filter binds to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    /// Filter on `DATE(timestamp_column)`.
    CastTimestamp,
    /// Filter on a dedicated partition column (GA4 `event_date`).
    Column(&'static str),
}

/// How a named event parameter is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamAccess {
    /// The parameter is a flat column on the event row.
    FlatColumn,
    /// The parameter lives in a nested repeated key/value record
    /// (GA4 `event_params`).
    NestedKeyValue,
}

/// Whether the backend aggregates with an explicit key list or the
/// group-by-all-non-aggregated-columns shorthand. Both must produce the
/// same logical result; the directive only changes the rendered clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    ExplicitKeys,
    AllNonAggregatedImplicit,
}

/// Concrete column/unit mapping for one data-source variant. Selected once,
/// immutable, carried inside every derived plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaProfile {
    pub timestamp_column: &'static str,
    pub timestamp_unit: TimestampUnit,
    pub date_filter: DateFilter,
    pub user_id_column: &'static str,
    pub event_name_column: &'static str,
    pub param_access: ParamAccess,
    pub grouping: GroupingStrategy,
}

impl SchemaProfile {
    pub fn for_source(source: DataSource) -> Self {
        match source {
            DataSource::Standard => Self {
                timestamp_column: "timestamp",
                timestamp_unit: TimestampUnit::Seconds,
                date_filter: DateFilter::CastTimestamp,
                user_id_column: "user_id",
                event_name_column: "event_name",
                param_access: ParamAccess::FlatColumn,
                grouping: GroupingStrategy::ExplicitKeys,
            },
            DataSource::Ga4 => Self {
                timestamp_column: "event_timestamp",
                timestamp_unit: TimestampUnit::Microseconds,
                date_filter: DateFilter::Column("event_date"),
                user_id_column: "user_pseudo_id",
                event_name_column: "event_name",
                param_access: ParamAccess::NestedKeyValue,
                grouping: GroupingStrategy::AllNonAggregatedImplicit,
            },
        }
    }
}

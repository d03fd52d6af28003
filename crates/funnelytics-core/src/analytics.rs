//! Funnel results, derived reports and the executor boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::funnel::DateRange;
use crate::plan::FunnelQueryPlan;

/// Distinct users who reached one funnel step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStepCount {
    pub step_index: usize,
    pub label: String,
    pub users: i64,
}

/// The tabular outcome of executing a funnel plan: one row per step, in
/// step order. Produced by the executor; read-only to the analyzers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelResult {
    pub steps: Vec<FunnelStepCount>,
}

impl FunnelResult {
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        Self {
            steps: counts
                .into_iter()
                .enumerate()
                .map(|(step_index, (label, users))| FunnelStepCount {
                    step_index,
                    label,
                    users,
                })
                .collect(),
        }
    }

    /// Lookup by label, not position.
    pub fn step_by_label(&self, label: &str) -> Option<&FunnelStepCount> {
        self.steps.iter().find(|step| step.label == label)
    }
}

/// Dry-run outcome of a plan or custom query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub bytes_processed: i64,
}

/// Conversion between two adjacent steps. Rates are fractions in `0..=1`
/// for well-formed input; a non-monotonic result reports whatever the
/// arithmetic yields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepConversion {
    pub from_index: usize,
    pub to_index: usize,
    pub from_label: String,
    pub to_label: String,
    pub users_before: i64,
    pub users_after: i64,
    pub conversion_rate: f64,
    pub drop_off_count: i64,
    pub drop_off_rate: f64,
}

/// The step boundary with the largest relative loss.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttritionPoint {
    pub from_index: usize,
    pub to_index: usize,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub total_entered: i64,
    /// `users[last] / users[0]`, as a fraction.
    pub overall_conversion: f64,
    pub steps: Vec<StepConversion>,
    pub primary_attrition: Option<AttritionPoint>,
}

/// One boundary of the dropoff breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropoffRow {
    pub from_index: usize,
    pub to_index: usize,
    pub from_label: String,
    pub to_label: String,
    pub users_before: i64,
    pub users_after: i64,
    pub drop_off_count: i64,
    /// Loss as a fraction of the users at `from_index`.
    pub drop_off_rate: f64,
    /// Loss as a fraction of the users who entered the funnel.
    pub drop_off_rate_of_total: f64,
    pub retention_rate: f64,
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropoffReport {
    pub rows: Vec<DropoffRow>,
}

/// Backend location of the session-to-arm assignment data for one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ABTestConfig {
    /// Fully qualified table holding arm assignments.
    pub table: String,
    /// Test identifier; assignment rows carry it as a `GroupCode` prefix.
    pub test_code: String,
    /// Column holding the user identifier joined against funnel results.
    pub user_id_column: String,
}

/// Cohort membership of one user. `Unassigned` users are excluded from both
/// result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    Control,
    Test,
    Unassigned,
}

impl Arm {
    /// GroupCode convention: `<TEST_CODE>-A…` is the control arm,
    /// `<TEST_CODE>-B…` the test arm. Codes of other tests, or suffixes
    /// outside the A/B convention, are unassigned.
    pub fn classify(group_code: &str, test_code: &str) -> Self {
        let Some(suffix) = group_code
            .strip_prefix(test_code)
            .and_then(|rest| rest.strip_prefix('-'))
        else {
            return Self::Unassigned;
        };
        if suffix.starts_with('A') {
            Self::Control
        } else if suffix.starts_with('B') {
            Self::Test
        } else {
            Self::Unassigned
        }
    }
}

/// Advisory verdict attached to a significance report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Significant improvement: ship the tested change.
    Adopt,
    /// Significant regression: discard the tested change.
    Reject,
    /// No significant difference yet.
    KeepRunning,
}

/// Two-proportion comparison between the control and test arms.
/// Conversion, difference and lift fields are percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceReport {
    pub control_conversion: f64,
    pub test_conversion: f64,
    pub absolute_difference: f64,
    pub relative_lift: f64,
    pub z_score: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub confidence_level: f64,
    pub recommendation: Recommendation,
}

/// A scalar value bound to a custom-query placeholder, tagged with the
/// BigQuery parameter type it maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl ParamValue {
    pub fn bigquery_type(&self) -> &'static str {
        match self {
            Self::String(_) => "STRING",
            Self::Integer(_) => "INT64",
            Self::Float(_) => "FLOAT64",
            Self::Date(_) => "DATE",
        }
    }
}

/// Rows of an ad-hoc query, column name to JSON value.
pub type QueryRow = BTreeMap<String, serde_json::Value>;

/// Outcome of the custom query façade: rows, or a cost estimate when the
/// call was a dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryOutcome {
    Rows(Vec<QueryRow>),
    Estimate(CostEstimate),
}

/// Executes funnel plans against the backing event log.
///
/// Implementations own transport, authentication, timeouts and retry of
/// transient failures; the core hands over a finished plan and receives a
/// complete result. No partial results, no streaming, no caching.
#[async_trait]
pub trait PlanExecutor: Send + Sync + 'static {
    async fn run_funnel(&self, plan: &FunnelQueryPlan) -> anyhow::Result<FunnelResult>;

    /// Validate and price the plan without running it.
    async fn estimate_funnel(&self, plan: &FunnelQueryPlan) -> anyhow::Result<CostEstimate>;
}

/// Parameterized ad-hoc query execution.
#[async_trait]
pub trait QueryFacade: Send + Sync + 'static {
    async fn custom_query(
        &self,
        query: &str,
        params: &BTreeMap<String, ParamValue>,
        dry_run: bool,
    ) -> anyhow::Result<QueryOutcome>;
}

/// Resolves cohort membership for an A/B comparison.
#[async_trait]
pub trait ArmResolver: Send + Sync + 'static {
    /// Exactly one arm per user; unassigned users are dropped by callers.
    async fn resolve_arms(
        &self,
        config: &ABTestConfig,
        range: &DateRange,
    ) -> anyhow::Result<BTreeMap<String, Arm>>;
}

//! Renders a logical funnel plan to BigQuery SQL.
//!
//! The shape is a CTE chain: `scoped_events` applies the date-range and
//! global filters once, then one `step_N` CTE per funnel step selects each
//! user's earliest qualifying timestamp. `step_1` defines the user's anchor;
//! every later step requires a timestamp strictly after the previous step's
//! match and no later than the anchor plus the funnel window. Values are
//! never inlined: the renderer emits `@name` placeholders and returns the
//! bindings alongside the SQL.

use tracing::debug;

use funnelytics_core::analytics::ParamValue;
use funnelytics_core::config::TableRef;
use funnelytics_core::funnel::ParamMatch;
use funnelytics_core::plan::{AggregationDirective, FunnelQueryPlan, StepPredicate};
use funnelytics_core::schema::{DateFilter, ParamAccess, TimestampUnit};

use crate::params::BoundParam;

/// SQL text plus the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<BoundParam>,
}

pub(crate) struct FunnelParts {
    pub ctes: Vec<String>,
    pub params: Vec<BoundParam>,
}

/// Per-step distinct-user counts: one output column `step_N_users` per step.
pub fn render_funnel_counts_sql(plan: &FunnelQueryPlan, table: &TableRef) -> RenderedQuery {
    let parts = build_funnel_parts(plan, table);
    let mut sql = format!(
        "WITH {}\n{}",
        parts.ctes.join(",\n"),
        counts_select(plan)
    );
    match plan.aggregation {
        AggregationDirective::CountDistinctUsersExplicit => {}
        AggregationDirective::CountDistinctUsersImplicitAll => sql.push_str("\nGROUP BY ALL"),
    }
    debug!(steps = plan.steps.len(), "rendered funnel counts sql");
    RenderedQuery {
        sql,
        params: parts.params,
    }
}

/// Per-user step membership: `user_id` plus one `step_N_at` timestamp
/// column per step, NULL where the step was not reached.
pub fn render_funnel_membership_sql(plan: &FunnelQueryPlan, table: &TableRef) -> RenderedQuery {
    let parts = build_funnel_parts(plan, table);
    let sql = format!(
        "WITH {}\n{}",
        parts.ctes.join(",\n"),
        membership_select(plan)
    );
    debug!(steps = plan.steps.len(), "rendered funnel membership sql");
    RenderedQuery {
        sql,
        params: parts.params,
    }
}

pub(crate) fn build_funnel_parts(plan: &FunnelQueryPlan, table: &TableRef) -> FunnelParts {
    let mut renderer = Renderer {
        plan,
        params: Vec::new(),
    };
    let mut ctes = vec![renderer.scoped_events_cte(table)];
    for step in &plan.steps {
        ctes.push(renderer.step_cte(step));
    }
    FunnelParts {
        ctes,
        params: renderer.params,
    }
}

pub(crate) fn counts_select(plan: &FunnelQueryPlan) -> String {
    let columns: Vec<String> = plan
        .steps
        .iter()
        .map(|step| {
            let n = step.index + 1;
            format!("    COUNT(DISTINCT s{n}.user_id) AS step_{n}_users")
        })
        .collect();
    format!("SELECT\n{}\n{}", columns.join(",\n"), step_joins(plan))
}

pub(crate) fn membership_select(plan: &FunnelQueryPlan) -> String {
    let mut columns = vec!["    s1.user_id AS user_id".to_string()];
    for step in &plan.steps {
        let n = step.index + 1;
        columns.push(format!("    s{n}.matched_at AS step_{n}_at"));
    }
    format!("SELECT\n{}\n{}", columns.join(",\n"), step_joins(plan))
}

fn step_joins(plan: &FunnelQueryPlan) -> String {
    let mut lines = vec!["FROM step_1 s1".to_string()];
    for step in plan.steps.iter().skip(1) {
        let n = step.index + 1;
        lines.push(format!(
            "LEFT JOIN step_{n} s{n} ON s{n}.user_id = s1.user_id"
        ));
    }
    lines.join("\n")
}

struct Renderer<'a> {
    plan: &'a FunnelQueryPlan,
    params: Vec<BoundParam>,
}

impl Renderer<'_> {
    fn bind(&mut self, name: String, value: ParamValue) -> String {
        let placeholder = format!("@{name}");
        self.params.push(BoundParam::new(name, value));
        placeholder
    }

    fn scoped_events_cte(&mut self, table: &TableRef) -> String {
        let start = self.bind(
            "start_date".to_string(),
            ParamValue::Date(self.plan.date_range.start),
        );
        let end = self.bind(
            "end_date".to_string(),
            ParamValue::Date(self.plan.date_range.end),
        );
        let date_condition = match self.plan.profile.date_filter {
            DateFilter::CastTimestamp => format!(
                "DATE(e.{}) BETWEEN {start} AND {end}",
                self.plan.profile.timestamp_column
            ),
            DateFilter::Column(column) => format!("e.{column} BETWEEN {start} AND {end}"),
        };

        let mut conditions = vec![date_condition];
        let global_filters: Vec<_> = self.plan.global_filters.clone();
        for (idx, filter) in global_filters.iter().enumerate() {
            let placeholder = self.bind(
                format!("global_filter_{}", idx + 1),
                ParamValue::String(filter.value.clone()),
            );
            conditions.push(format!("e.{} = {placeholder}", filter.field));
        }

        format!(
            "scoped_events AS (\n    SELECT *\n    FROM `{}` e\n    WHERE {}\n)",
            table.full_id(),
            conditions.join("\n      AND ")
        )
    }

    fn step_cte(&mut self, step: &StepPredicate) -> String {
        let n = step.index + 1;
        let user = self.plan.profile.user_id_column;
        let ts = self.plan.profile.timestamp_column;
        let condition = self.step_condition(step);

        if step.index == 0 {
            return format!(
                "step_1 AS (\n    SELECT e.{user} AS user_id, MIN(e.{ts}) AS matched_at\n    FROM scoped_events e\n    WHERE {condition}\n    GROUP BY e.{user}\n)"
            );
        }

        let prev = step.index;
        let anchor_alias = if step.index == 1 { "prev" } else { "anchor" };
        let anchor_join = if step.index == 1 {
            String::new()
        } else {
            format!("\n    JOIN step_1 anchor ON anchor.user_id = e.{user}")
        };
        let window_bound = self.window_bound(anchor_alias);

        format!(
            "step_{n} AS (\n    SELECT e.{user} AS user_id, MIN(e.{ts}) AS matched_at\n    FROM scoped_events e\n    JOIN step_{prev} prev ON prev.user_id = e.{user}{anchor_join}\n    WHERE e.{ts} > prev.matched_at\n      AND {window_bound}\n      AND {condition}\n    GROUP BY e.{user}\n)"
        )
    }

    fn window_bound(&self, anchor_alias: &str) -> String {
        let ts = self.plan.profile.timestamp_column;
        let window = self.plan.window_in_unit;
        match self.plan.profile.timestamp_unit {
            TimestampUnit::Seconds => format!(
                "e.{ts} <= TIMESTAMP_ADD({anchor_alias}.matched_at, INTERVAL {window} SECOND)"
            ),
            TimestampUnit::Microseconds => {
                format!("e.{ts} <= {anchor_alias}.matched_at + {window}")
            }
        }
    }

    fn step_condition(&mut self, step: &StepPredicate) -> String {
        let n = step.index + 1;
        let event_placeholder = self.bind(
            format!("step_{n}_event"),
            ParamValue::String(step.event_name.clone()),
        );
        let mut conditions = vec![format!(
            "e.{} = {event_placeholder}",
            self.plan.profile.event_name_column
        )];

        for (pidx, param) in step.params.iter().enumerate() {
            let expr = self.param_expr(n, pidx + 1, &param.key);
            let value_placeholder = self.bind(
                format!("step_{n}_param_{}", pidx + 1),
                ParamValue::String(param.matcher.raw().to_string()),
            );
            let comparison = match param.matcher {
                ParamMatch::Equals(_) => format!("{expr} = {value_placeholder}"),
                ParamMatch::Pattern(_) => format!("{expr} LIKE {value_placeholder}"),
            };
            conditions.push(comparison);
        }
        conditions.join(" AND ")
    }

    fn param_expr(&mut self, step_num: usize, param_num: usize, key: &str) -> String {
        match self.plan.profile.param_access {
            ParamAccess::FlatColumn => format!("e.{key}"),
            ParamAccess::NestedKeyValue => {
                let key_placeholder = self.bind(
                    format!("step_{step_num}_param_{param_num}_key"),
                    ParamValue::String(key.to_string()),
                );
                format!(
                    "(SELECT ep.value.string_value FROM UNNEST(e.event_params) AS ep WHERE ep.key = {key_placeholder})"
                )
            }
        }
    }
}

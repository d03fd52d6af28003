//! The logical funnel query plan.
//!
//! A [`FunnelQueryPlan`] is the backend-agnostic description of the per-user
//! step-completion computation: which events qualify for each step, the
//! strict ordering between steps, and the single global window anchored at
//! the user's earliest step-0 match. It is derived deterministically from a
//! [`FunnelDefinition`] and a [`SchemaProfile`], never mutated afterwards,
//! and rebuilt wholesale when either input changes.

use serde::Serialize;
use tracing::debug;

use crate::error::FunnelError;
use crate::funnel::{DateRange, FunnelDefinition, ParamMatch};
use crate::schema::{GroupingStrategy, SchemaProfile};

/// One parameter filter attached to a step predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamPredicate {
    pub key: String,
    pub matcher: ParamMatch,
}

/// One global equality constraint applied to every step's event scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalFilter {
    pub field: String,
    pub value: String,
}

/// The qualifying condition for one funnel step.
///
/// Steps after the first additionally require (encoded by position, not
/// repeated here): a timestamp strictly greater than the user's previous
/// step match, and at most `window_in_unit` past the step-0 anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPredicate {
    pub index: usize,
    pub label: String,
    pub event_name: String,
    pub params: Vec<ParamPredicate>,
}

/// The aggregation the executor must apply: distinct users reaching each
/// step, with the grouping clause dictated by the schema profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationDirective {
    /// COUNT(DISTINCT user) per step with an explicit (possibly empty)
    /// GROUP BY key list.
    CountDistinctUsersExplicit,
    /// Same logical aggregation through the backend's group-by-all
    /// shorthand. Backends without the shorthand expand it mechanically to
    /// the explicit list.
    CountDistinctUsersImplicitAll,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelQueryPlan {
    pub profile: SchemaProfile,
    pub steps: Vec<StepPredicate>,
    pub global_filters: Vec<GlobalFilter>,
    pub date_range: DateRange,
    /// The funnel window converted to the profile's timestamp unit.
    pub window_in_unit: i64,
    pub aggregation: AggregationDirective,
}

impl FunnelQueryPlan {
    /// Compile a validated definition against a schema profile. Pure;
    /// identical inputs produce structurally identical plans.
    pub fn build(
        definition: &FunnelDefinition,
        profile: &SchemaProfile,
    ) -> Result<Self, FunnelError> {
        definition.validate()?;

        let steps = definition
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepPredicate {
                index,
                label: step.name.clone(),
                event_name: step.name.clone(),
                params: step
                    .params
                    .iter()
                    .map(|(key, matcher)| ParamPredicate {
                        key: key.clone(),
                        matcher: matcher.clone(),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        let global_filters = definition
            .filters
            .iter()
            .map(|(field, value)| GlobalFilter {
                field: field.clone(),
                value: value.clone(),
            })
            .collect::<Vec<_>>();

        let aggregation = match profile.grouping {
            GroupingStrategy::ExplicitKeys => AggregationDirective::CountDistinctUsersExplicit,
            GroupingStrategy::AllNonAggregatedImplicit => {
                AggregationDirective::CountDistinctUsersImplicitAll
            }
        };

        let plan = Self {
            profile: profile.clone(),
            steps,
            global_filters,
            date_range: definition.date_range,
            window_in_unit: definition.window.in_unit(profile.timestamp_unit),
            aggregation,
        };
        debug!(
            steps = plan.steps.len(),
            window_in_unit = plan.window_in_unit,
            "built funnel query plan"
        );
        Ok(plan)
    }

    /// Convenience: resolve the profile from the definition's data source
    /// and build against it.
    pub fn for_definition(definition: &FunnelDefinition) -> Result<Self, FunnelError> {
        let profile = SchemaProfile::for_source(definition.data_source);
        Self::build(definition, &profile)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::funnel::{EventStep, Window};
    use crate::schema::DataSource;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().expect("date literal")
    }

    fn sample_definition(source: DataSource) -> FunnelDefinition {
        let mut filters = BTreeMap::new();
        filters.insert("platform".to_string(), "web".to_string());
        FunnelDefinition {
            steps: vec![
                EventStep::named("view_item").with_param("page_location", "/products/%"),
                EventStep::named("add_to_cart"),
                EventStep::named("purchase"),
            ],
            date_range: DateRange::new(date("2026-01-01"), date("2026-01-31")).expect("range"),
            window: Window::parse("24h").expect("window"),
            filters,
            data_source: source,
        }
    }

    #[test]
    fn build_is_deterministic() {
        let definition = sample_definition(DataSource::Standard);
        let profile = SchemaProfile::for_source(DataSource::Standard);
        let first = FunnelQueryPlan::build(&definition, &profile).expect("plan");
        let second = FunnelQueryPlan::build(&definition, &profile).expect("plan");
        assert_eq!(first, second);
    }

    #[test]
    fn build_converts_window_to_profile_unit() {
        let standard = FunnelQueryPlan::for_definition(&sample_definition(DataSource::Standard))
            .expect("standard plan");
        assert_eq!(standard.window_in_unit, 86_400);

        let ga4 =
            FunnelQueryPlan::for_definition(&sample_definition(DataSource::Ga4)).expect("ga4 plan");
        assert_eq!(ga4.window_in_unit, 86_400_000_000);
    }

    #[test]
    fn build_selects_aggregation_from_grouping() {
        let standard = FunnelQueryPlan::for_definition(&sample_definition(DataSource::Standard))
            .expect("standard plan");
        assert_eq!(
            standard.aggregation,
            AggregationDirective::CountDistinctUsersExplicit
        );

        let ga4 =
            FunnelQueryPlan::for_definition(&sample_definition(DataSource::Ga4)).expect("ga4 plan");
        assert_eq!(
            ga4.aggregation,
            AggregationDirective::CountDistinctUsersImplicitAll
        );
    }

    #[test]
    fn build_preserves_step_order_and_params() {
        let plan = FunnelQueryPlan::for_definition(&sample_definition(DataSource::Standard))
            .expect("plan");
        let labels: Vec<&str> = plan.steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["view_item", "add_to_cart", "purchase"]);
        assert_eq!(plan.steps[0].params.len(), 1);
        assert_eq!(plan.steps[0].params[0].key, "page_location");
        assert!(matches!(
            plan.steps[0].params[0].matcher,
            ParamMatch::Pattern(_)
        ));
        assert_eq!(plan.global_filters.len(), 1);
    }

    #[test]
    fn build_rejects_short_funnel() {
        let mut definition = sample_definition(DataSource::Standard);
        definition.steps.truncate(1);
        let profile = SchemaProfile::for_source(DataSource::Standard);
        assert!(matches!(
            FunnelQueryPlan::build(&definition, &profile),
            Err(FunnelError::Validation(_))
        ));
    }

    #[test]
    fn build_rejects_inverted_date_range() {
        let mut definition = sample_definition(DataSource::Standard);
        definition.date_range = DateRange {
            start: date("2026-02-01"),
            end: date("2026-01-01"),
        };
        let profile = SchemaProfile::for_source(DataSource::Standard);
        assert!(matches!(
            FunnelQueryPlan::build(&definition, &profile),
            Err(FunnelError::Validation(_))
        ));
    }
}

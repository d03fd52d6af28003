//! Boundary contracts: the custom query façade binds every referenced
//! placeholder before dispatch, and the arm resolver yields exactly one arm
//! per user with unassigned users dropped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use funnelytics_bigquery::bind_named_params;
use funnelytics_core::analytics::{
    ABTestConfig, Arm, ArmResolver, CostEstimate, ParamValue, QueryFacade, QueryOutcome, QueryRow,
};
use funnelytics_core::funnel::DateRange;
use funnelytics_core::FunnelError;

/// Validates bindings like a real façade would, then returns canned rows.
struct CannedFacade {
    rows: Vec<QueryRow>,
}

#[async_trait]
impl QueryFacade for CannedFacade {
    async fn custom_query(
        &self,
        query: &str,
        params: &BTreeMap<String, ParamValue>,
        dry_run: bool,
    ) -> anyhow::Result<QueryOutcome> {
        let bound = bind_named_params(query, params)?;
        if dry_run {
            return Ok(QueryOutcome::Estimate(CostEstimate {
                bytes_processed: 4096 * bound.len() as i64,
            }));
        }
        Ok(QueryOutcome::Rows(self.rows.clone()))
    }
}

struct GroupCodeResolver {
    assignments: Vec<(String, String)>,
}

#[async_trait]
impl ArmResolver for GroupCodeResolver {
    async fn resolve_arms(
        &self,
        config: &ABTestConfig,
        _range: &DateRange,
    ) -> anyhow::Result<BTreeMap<String, Arm>> {
        Ok(self
            .assignments
            .iter()
            .map(|(user, group_code)| {
                (user.clone(), Arm::classify(group_code, &config.test_code))
            })
            .collect())
    }
}

fn sample_row() -> QueryRow {
    let mut row = QueryRow::new();
    row.insert("country".to_string(), json!("AE"));
    row.insert("users".to_string(), json!(42));
    row
}

#[tokio::test]
async fn custom_query_runs_with_complete_bindings() {
    let facade = CannedFacade {
        rows: vec![sample_row()],
    };
    let mut params = BTreeMap::new();
    params.insert("country".to_string(), ParamValue::String("AE".to_string()));
    params.insert("unused".to_string(), ParamValue::Integer(9));

    let outcome = facade
        .custom_query(
            "SELECT country, COUNT(*) AS users FROM t WHERE country = @country GROUP BY country",
            &params,
            false,
        )
        .await
        .expect("outcome");
    match outcome {
        QueryOutcome::Rows(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["users"], json!(42));
        }
        QueryOutcome::Estimate(_) => panic!("expected rows"),
    }
}

#[tokio::test]
async fn custom_query_dry_run_estimates_cost() {
    let facade = CannedFacade { rows: vec![] };
    let mut params = BTreeMap::new();
    params.insert("country".to_string(), ParamValue::String("AE".to_string()));

    let outcome = facade
        .custom_query("SELECT 1 FROM t WHERE country = @country", &params, true)
        .await
        .expect("outcome");
    assert!(matches!(
        outcome,
        QueryOutcome::Estimate(CostEstimate {
            bytes_processed: 4096
        })
    ));
}

#[tokio::test]
async fn custom_query_rejects_unbound_placeholder() {
    let facade = CannedFacade { rows: vec![] };
    let err = facade
        .custom_query("SELECT 1 FROM t WHERE country = @country", &BTreeMap::new(), false)
        .await
        .expect_err("must fail");
    let funnel_err = err.downcast::<FunnelError>().expect("funnel error");
    assert!(matches!(funnel_err, FunnelError::MissingParameter(name) if name == "country"));
}

#[tokio::test]
async fn arm_resolver_classifies_and_drops_unassigned() {
    let resolver = GroupCodeResolver {
        assignments: vec![
            ("u1".to_string(), "CHECKOUTV2-A1".to_string()),
            ("u2".to_string(), "CHECKOUTV2-B1".to_string()),
            ("u3".to_string(), "OTHERTEST-A1".to_string()),
        ],
    };
    let config = ABTestConfig {
        table: "proj.experiments.ab_sessions".to_string(),
        test_code: "CHECKOUTV2".to_string(),
        user_id_column: "user_id".to_string(),
    };
    let range = DateRange::new(
        "2026-01-01".parse().expect("start"),
        "2026-01-31".parse().expect("end"),
    )
    .expect("range");

    let arms = resolver.resolve_arms(&config, &range).await.expect("arms");
    assert_eq!(arms["u1"], Arm::Control);
    assert_eq!(arms["u2"], Arm::Test);
    assert_eq!(arms["u3"], Arm::Unassigned);

    let assigned: Vec<_> = arms
        .iter()
        .filter(|(_, arm)| **arm != Arm::Unassigned)
        .collect();
    assert_eq!(assigned.len(), 2);
}

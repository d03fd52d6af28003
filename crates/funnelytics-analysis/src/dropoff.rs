//! Attrition ranking and the per-boundary dropoff breakdown.

use funnelytics_core::analytics::{
    AttritionPoint, DropoffReport, DropoffRow, FunnelResult, StepConversion,
};
use funnelytics_core::FunnelError;

use crate::conversion::analyze;

/// The boundary with the largest *relative* loss. Ties resolve to the
/// earlier boundary: only a strictly greater rate displaces the current
/// leader.
pub fn rank_attrition(steps: &[StepConversion]) -> Option<AttritionPoint> {
    let mut best: Option<&StepConversion> = None;
    for step in steps {
        let replace = match best {
            None => true,
            Some(current) => step.drop_off_rate > current.drop_off_rate,
        };
        if replace {
            best = Some(step);
        }
    }
    best.map(|step| AttritionPoint {
        from_index: step.from_index,
        to_index: step.to_index,
        drop_off_rate: step.drop_off_rate,
    })
}

/// Expand a funnel result into per-boundary dropoff rows: loss relative to
/// the preceding step, loss relative to the funnel entrants, retention, and
/// the critical-boundary flag.
pub fn analyze_dropoffs(result: &FunnelResult) -> Result<DropoffReport, FunnelError> {
    let report = analyze(result)?;
    let total = report.total_entered;
    let critical = report.primary_attrition.as_ref();

    let rows = report
        .steps
        .iter()
        .map(|step| DropoffRow {
            from_index: step.from_index,
            to_index: step.to_index,
            from_label: step.from_label.clone(),
            to_label: step.to_label.clone(),
            users_before: step.users_before,
            users_after: step.users_after,
            drop_off_count: step.drop_off_count,
            drop_off_rate: step.drop_off_rate,
            drop_off_rate_of_total: if total > 0 {
                step.drop_off_count as f64 / total as f64
            } else {
                0.0
            },
            retention_rate: 1.0 - step.drop_off_rate,
            is_critical: critical
                .is_some_and(|point| point.from_index == step.from_index),
        })
        .collect();

    Ok(DropoffReport { rows })
}

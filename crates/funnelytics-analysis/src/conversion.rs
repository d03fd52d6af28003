//! Step-over-step conversion analysis of a funnel result.

use tracing::warn;

use funnelytics_core::analytics::{ConversionReport, FunnelResult, StepConversion};
use funnelytics_core::FunnelError;

use crate::dropoff::rank_attrition;

/// Compute adjacent-step conversion rates, overall conversion and the
/// primary attrition boundary for one funnel result.
///
/// Rows must arrive sorted by step index ascending and the first step must
/// have at least one user; conversion rates are undefined otherwise. A zero
/// count at a *later* step is legitimate input and propagates as 0%
/// conversion for the following boundary. A later step exceeding its
/// predecessor indicates an executor bug; the rates are still reported as
/// computed.
pub fn analyze(result: &FunnelResult) -> Result<ConversionReport, FunnelError> {
    check_row_order(result)?;

    let first = &result.steps[0];
    if first.users <= 0 {
        return Err(FunnelError::EmptyFunnel);
    }

    for pair in result.steps.windows(2) {
        if pair[1].users > pair[0].users {
            warn!(
                from = pair[0].step_index,
                to = pair[1].step_index,
                before = pair[0].users,
                after = pair[1].users,
                "later funnel step exceeds its predecessor; reporting counts as supplied"
            );
        }
    }

    let steps: Vec<StepConversion> = result
        .steps
        .windows(2)
        .map(|pair| {
            let before = &pair[0];
            let after = &pair[1];
            let conversion_rate = if before.users > 0 {
                after.users as f64 / before.users as f64
            } else {
                0.0
            };
            let drop_off_count = before.users - after.users;
            let drop_off_rate = if before.users > 0 {
                drop_off_count as f64 / before.users as f64
            } else {
                0.0
            };
            StepConversion {
                from_index: before.step_index,
                to_index: after.step_index,
                from_label: before.label.clone(),
                to_label: after.label.clone(),
                users_before: before.users,
                users_after: after.users,
                conversion_rate,
                drop_off_count,
                drop_off_rate,
            }
        })
        .collect();

    let last = &result.steps[result.steps.len() - 1];
    Ok(ConversionReport {
        total_entered: first.users,
        overall_conversion: last.users as f64 / first.users as f64,
        primary_attrition: rank_attrition(&steps),
        steps,
    })
}

pub(crate) fn check_row_order(result: &FunnelResult) -> Result<(), FunnelError> {
    if result.steps.is_empty() {
        return Err(FunnelError::Validation(
            "funnel result has no steps".to_string(),
        ));
    }
    for pair in result.steps.windows(2) {
        if pair[1].step_index <= pair[0].step_index {
            return Err(FunnelError::Validation(
                "funnel result rows must be sorted by step index ascending".to_string(),
            ));
        }
    }
    Ok(())
}

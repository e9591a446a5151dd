//! Settle-all fan-out for repair stages.

use crate::error::{GlossaError, Result};
use crate::models::{RepairFailure, StageReport};
use futures::future::join_all;
use std::future::Future;
use tracing::{debug, warn};

/// Run every item repair concurrently and wait for all of them.
///
/// A failing item never cancels its siblings. Failures are logged and
/// collected into the returned report in item order.
pub async fn settle_all<I, F>(stage: &str, repairs: I) -> StageReport
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<()>>,
{
    let (items, futures): (Vec<String>, Vec<F>) = repairs.into_iter().unzip();
    let attempted = items.len();
    if attempted == 0 {
        return StageReport {
            stage: stage.to_string(),
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        };
    }

    debug!(stage, count = attempted, "running repairs");
    let outcomes = join_all(futures).await;

    let mut failures = Vec::new();
    for (item, outcome) in items.into_iter().zip(outcomes) {
        if let Err(e) = outcome {
            let err = GlossaError::ItemRepairFailed {
                stage: stage.to_string(),
                item: item.clone(),
                message: e.to_string(),
            };
            warn!(error = %err, "repair failed");
            failures.push(RepairFailure {
                item,
                error: e.to_string(),
            });
        }
    }

    StageReport {
        stage: stage.to_string(),
        attempted,
        succeeded: attempted - failures.len(),
        failures,
    }
}

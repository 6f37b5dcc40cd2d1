//! Retry scheduler sweep. Invoked by an external cron hitting the internal
//! sweep endpoint; there is no in-process timer.

use tracing::{info, warn};

use crate::ingest;
use crate::processors::{ProcessOutcome, process_raw_event};
use crate::state::AppState;
use crate::types::{SweepSummary, WebhookFailureStatus};

use super::store::{self, StoreError};

/// Batch ceiling per sweep tick; anything left stays due for the next tick.
const SWEEP_BATCH_LIMIT: i64 = 50;

/// Re-attempts every due failure through the same idempotent processing
/// entrypoint the webhook endpoint uses. Success clears the failure record;
/// failure reschedules or dead-letters it (that bookkeeping happens inside
/// the processing boundary).
pub async fn sweep(state: &AppState) -> Result<SweepSummary, StoreError> {
    // A worker that died after claiming leaves its event in `processing`
    // forever; reset timed-out claims first so their retries can land.
    let requeued = ingest::requeue_stale(&state.pool, state.config.retry.stale_claim_secs).await?;
    if requeued > 0 {
        warn!(requeued, "requeued raw events with abandoned claims");
    }

    let due = store::due_failures(&state.pool, SWEEP_BATCH_LIMIT).await?;

    let mut summary = SweepSummary {
        examined: due.len() as u64,
        requeued,
        ..SweepSummary::default()
    };

    for failure in due {
        let Some(raw_event_id) = failure.raw_event_id else {
            // No raw event to re-enter through; nothing will ever make this
            // retry succeed.
            warn!(
                failure_key = %failure.failure_key,
                "due failure has no raw event reference, dead-lettering"
            );
            store::record_failure(
                &state.pool,
                &state.config.retry,
                failure.platform,
                &failure.event_type,
                &failure.failure_key,
                &failure.payload,
                None,
                "retry skipped: no raw event reference",
                false,
            )
            .await?;
            summary.dead_lettered += 1;
            continue;
        };

        match process_raw_event(state, raw_event_id, true).await {
            Ok(ProcessOutcome::Skipped) => {
                // Skipped is ambiguous: either the processor ran and decided
                // nothing was needed (record cleared), or the claim was lost
                // to a concurrent owner (record untouched, stays due).
                if store::find_by_key(&state.pool, &failure.failure_key)
                    .await?
                    .is_none()
                {
                    summary.succeeded += 1;
                } else {
                    summary.stalled += 1;
                }
            }
            Ok(_) => {
                summary.succeeded += 1;
            }
            Err(_) => {
                // The boundary already incremented the failure record;
                // inspect where it landed.
                let current = store::find_by_key(&state.pool, &failure.failure_key).await?;
                match current {
                    Some(failure) if failure.status == WebhookFailureStatus::Exhausted => {
                        summary.dead_lettered += 1;
                    }
                    _ => {
                        summary.rescheduled += 1;
                    }
                }
            }
        }
    }

    info!(
        examined = summary.examined,
        succeeded = summary.succeeded,
        rescheduled = summary.rescheduled,
        dead_lettered = summary.dead_lettered,
        requeued = summary.requeued,
        stalled = summary.stalled,
        "retry sweep finished"
    );

    Ok(summary)
}

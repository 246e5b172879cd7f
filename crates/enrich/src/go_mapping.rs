use anyhow::{Context, Result};
use graphstore::{GraphRepository, PendingDrug, SetOutcome};
use lookup::{LookupError, QuickGoClient};
use tracing::{info, warn};

use crate::retry::RetryPolicy;
use crate::runner::{BatchRunner, ItemOutcome, RunReport};
use crate::tally::FailureReason;

/// Resolve each drug's process names to GO IDs and store them as
/// `affectedGoProcessId`. Names without a match are skipped.
pub async fn map_go_terms(
    repo: &dyn GraphRepository,
    client: &QuickGoClient,
    runner: &BatchRunner,
    retry: &RetryPolicy,
) -> Result<RunReport<Vec<String>>> {
    let pending = repo
        .drugs_pending_go_mapping()
        .await
        .context("Failed to list drugs pending GO mapping")?;
    info!(drugs = pending.len(), "Mapping process names to GO terms");

    let items = pending
        .into_iter()
        .map(|drug| (drug.drugbank_id.clone(), drug))
        .collect();

    let report = runner
        .run("go-mapping", items, |_, drug: PendingDrug| async move {
            let mut go_ids = Vec::new();
            let mut lookup_errors = 0;

            for name in &drug.processes {
                match retry
                    .retry_if("quickgo", || client.resolve(name), LookupError::is_transient)
                    .await
                {
                    Ok(Some(go_id)) => go_ids.push(go_id),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(drug_id = %drug.drugbank_id, term = %name, error = %e, "GO lookup failed");
                        lookup_errors += 1;
                    }
                }
            }

            if go_ids.is_empty() {
                return if lookup_errors > 0 {
                    ItemOutcome::Failed(FailureReason::Transport)
                } else {
                    ItemOutcome::Skipped
                };
            }

            match repo.set_go_term_ids(&drug.drugbank_id, &go_ids).await {
                Ok(SetOutcome::Written) => {
                    info!(drug_id = %drug.drugbank_id, resolved = go_ids.len(), "GO IDs stored");
                    ItemOutcome::Done(go_ids)
                }
                Ok(SetOutcome::NotFound) => ItemOutcome::Failed(FailureReason::TargetNotFound),
                Err(e) => {
                    warn!(drug_id = %drug.drugbank_id, error = %e, "GO ID write failed");
                    ItemOutcome::Failed(FailureReason::Graph)
                }
            }
        })
        .await;

    Ok(report)
}

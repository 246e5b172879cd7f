use anyhow::{Context, Result};
use graphstore::{GraphRepository, NodeLabel};
use tracing::{debug, info, warn};

use crate::runner::{BatchRunner, ItemOutcome, RunReport};
use crate::tally::FailureReason;

/// Connect every drug to the processes named in its `affectedGoProcessId`
pub async fn link_processes(
    repo: &dyn GraphRepository,
    runner: &BatchRunner,
) -> Result<RunReport<usize>> {
    let ids = repo
        .fetch_identifiers(NodeLabel::Drug)
        .await
        .context("Failed to list drugs")?;

    let items = ids.into_iter().map(|id| (id.clone(), id)).collect();
    let report = runner
        .run("linking", items, |_, drugbank_id| async move {
            match repo.link_drug_to_processes(&drugbank_id).await {
                Ok(0) => {
                    debug!(drug_id = %drugbank_id, "No known processes to link");
                    ItemOutcome::Skipped
                }
                Ok(linked) => ItemOutcome::Done(linked),
                Err(e) => {
                    warn!(drug_id = %drugbank_id, error = %e, "Linking failed");
                    ItemOutcome::Failed(FailureReason::Graph)
                }
            }
        })
        .await;

    let edges: usize = report.results.values().sum();
    info!(drugs = report.succeeded(), edges, "Drugs linked to processes");
    Ok(report)
}

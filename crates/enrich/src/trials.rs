use anyhow::{Context, Result};
use graphstore::{DrugProperty, GraphRepository, NodeLabel};
use lookup::{ClinicalTrialsClient, LookupError};
use serde_json::Value;
use tracing::{debug, info, warn};
use workitems::{WorkItemStore, sanitize_file_stem};

use crate::retry::RetryPolicy;
use crate::runner::{BatchRunner, ItemOutcome, RunReport};
use crate::tally::FailureReason;

/// Every study registered for a search term, following `nextPageToken`
pub async fn fetch_all_studies(
    client: &ClinicalTrialsClient,
    retry: &RetryPolicy,
    term: &str,
) -> Result<Vec<Value>, LookupError> {
    let mut studies = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let token = page_token.as_deref();
        let page = retry
            .retry_if(
                "clinical_trials",
                || client.fetch_page(term, token),
                LookupError::is_transient,
            )
            .await?;

        studies.extend(page.studies);
        match page.next_page_token {
            Some(next) if !next.is_empty() => page_token = Some(next),
            _ => break,
        }
    }

    Ok(studies)
}

/// Download the trial registry entries of every drug, one file per drug
/// name. Drugs with an existing file are skipped.
pub async fn download_trials(
    repo: &dyn GraphRepository,
    client: &ClinicalTrialsClient,
    store: &WorkItemStore,
    runner: &BatchRunner,
    retry: &RetryPolicy,
) -> Result<RunReport<usize>> {
    let ids = repo
        .fetch_identifiers(NodeLabel::Drug)
        .await
        .context("Failed to list drugs")?;
    info!(drugs = ids.len(), dir = %store.dir().display(), "Downloading clinical trials");

    let items = ids.into_iter().map(|id| (id.clone(), id)).collect();
    let report = runner
        .run("trials", items, |_, drugbank_id| async move {
            let name = match repo.fetch_attributes(&drugbank_id, &[DrugProperty::Name]).await {
                Ok(Some(attrs)) => attrs
                    .get("name")
                    .and_then(|v| v.as_text())
                    .map(str::to_string),
                Ok(None) => return ItemOutcome::Failed(FailureReason::TargetNotFound),
                Err(e) => {
                    warn!(drug_id = %drugbank_id, error = %e, "Name fetch failed");
                    return ItemOutcome::Failed(FailureReason::Graph);
                }
            };

            let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
                debug!(drug_id = %drugbank_id, "Drug has no name");
                return ItemOutcome::Skipped;
            };
            let stem = sanitize_file_stem(&name);
            if store.contains_named(&stem) {
                return ItemOutcome::Skipped;
            }

            let studies = match fetch_all_studies(client, retry, &name).await {
                Ok(studies) => studies,
                Err(e) => {
                    warn!(drug = %name, error = %e, "Trial download failed");
                    return if e.is_transient() {
                        ItemOutcome::Failed(FailureReason::Transport)
                    } else {
                        ItemOutcome::Failed(FailureReason::MalformedEnvelope)
                    };
                }
            };

            match store.save_named(&stem, &studies).await {
                Ok(_) => {
                    info!(drug = %name, studies = studies.len(), "Trials saved");
                    ItemOutcome::Done(studies.len())
                }
                Err(e) => {
                    warn!(drug = %name, error = %e, "Trial file write failed");
                    ItemOutcome::Failed(FailureReason::Io)
                }
            }
        })
        .await;

    Ok(report)
}

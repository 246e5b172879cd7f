use anyhow::{Context, Result};
use graphstore::{DrugProperty, GraphRepository, IndexedProperty, NodeLabel};
use prompting::{InferenceClient, InferenceError, PipelineKind, PromptBuilder, UnitAttributes};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use workitems::{PromptItem, ResponseItem, WorkItemStore, target_id_from_path};

use crate::integrator::{IntegrationReport, ResponseIntegrator};
use crate::retry::RetryPolicy;
use crate::runner::{BatchRunner, ItemOutcome, RunReport};
use crate::tally::FailureReason;

/// Drug properties shown to the model for each pipeline.
/// `source_run` selects which rating run feeds the classification prompt.
pub fn pipeline_properties(kind: PipelineKind, source_run: u32) -> Vec<DrugProperty> {
    match kind {
        PipelineKind::Rating => vec![
            DrugProperty::Name,
            DrugProperty::Pharmacodynamics,
            DrugProperty::Description,
            DrugProperty::ClinicalDescription,
            DrugProperty::MechanismOfAction,
            DrugProperty::AffectedGoProcess,
        ],
        PipelineKind::GoClassification => vec![
            DrugProperty::Name,
            DrugProperty::Indexed(IndexedProperty::ReasonRating, source_run),
            DrugProperty::AffectedGoProcess,
        ],
    }
}

/// Fetch every drug, render its prompt and save it as a work item
pub async fn generate_prompts(
    repo: &dyn GraphRepository,
    builder: &PromptBuilder,
    store: &WorkItemStore,
    runner: &BatchRunner,
    source_run: u32,
) -> Result<RunReport<PathBuf>> {
    let ids = repo
        .fetch_identifiers(NodeLabel::Drug)
        .await
        .context("Failed to list drugs")?;
    info!(drugs = ids.len(), pipeline = %builder.kind(), "Generating prompts");

    let wanted = pipeline_properties(builder.kind(), source_run);
    let properties = wanted.as_slice();
    let items = ids.into_iter().map(|id| (id.clone(), id)).collect();

    let report = runner
        .run("prompts", items, |_, drugbank_id| async move {
            let attrs = match repo.fetch_attributes(&drugbank_id, properties).await {
                Ok(Some(attrs)) => attrs,
                Ok(None) => return ItemOutcome::Failed(FailureReason::TargetNotFound),
                Err(e) => {
                    warn!(drug_id = %drugbank_id, error = %e, "Attribute fetch failed");
                    return ItemOutcome::Failed(FailureReason::Graph);
                }
            };

            let name = attrs
                .get("name")
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string();
            let mut unit = UnitAttributes::new(drugbank_id.clone(), name.clone());
            for (key, value) in attrs.iter().filter(|(k, _)| k.as_str() != "name") {
                unit = unit.with_field(key.clone(), value.to_json());
            }

            if builder.kind() == PipelineKind::Rating {
                match repo.fetch_process_labels(&drugbank_id).await {
                    Ok(labels) => unit = unit.with_processes(labels),
                    Err(e) => {
                        warn!(drug_id = %drugbank_id, error = %e, "Process label fetch failed");
                        return ItemOutcome::Failed(FailureReason::Graph);
                    }
                }
            }

            let item = PromptItem::new(drugbank_id.clone(), name, builder.build(&unit));
            match store.save_prompt(&item).await {
                Ok(path) => ItemOutcome::Done(path),
                Err(e) => {
                    warn!(drug_id = %drugbank_id, error = %e, "Prompt save failed");
                    ItemOutcome::Failed(FailureReason::Io)
                }
            }
        })
        .await;

    Ok(report)
}

fn inference_failure(err: &InferenceError) -> FailureReason {
    match err {
        InferenceError::Envelope(_) => FailureReason::MalformedEnvelope,
        _ => FailureReason::Transport,
    }
}

/// Send every prompt in `input` to the model and save the raw responses in
/// `output`. Responses already produced by an identical prompt are skipped.
pub async fn run_inference(
    input: &WorkItemStore,
    output: &WorkItemStore,
    client: &InferenceClient,
    runner: &BatchRunner,
    retry: &RetryPolicy,
) -> Result<RunReport<PathBuf>> {
    let files = input.list().await?;
    let items: Vec<(String, PathBuf)> = files
        .into_iter()
        .filter(|path| target_id_from_path(path).is_some())
        .filter(|path| {
            !path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("response_"))
        })
        .map(|path| (path.display().to_string(), path))
        .collect();
    info!(
        prompts = items.len(),
        model = client.model(),
        output = %output.dir().display(),
        "Running inference"
    );

    let report = runner
        .run("inference", items, |_, path| async move {
            let prompt = match input.load_prompt(&path).await {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Prompt unreadable");
                    return ItemOutcome::Failed(FailureReason::Io);
                }
            };

            if output
                .has_response_for(&prompt.drugbank_id, &prompt.fingerprint())
                .await
            {
                return ItemOutcome::Skipped;
            }

            let raw = match retry
                .retry_if(
                    "inference",
                    || client.infer(&prompt.prompt),
                    InferenceError::is_transient,
                )
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(drug_id = %prompt.drugbank_id, error = %e, "Inference failed");
                    return ItemOutcome::Failed(inference_failure(&e));
                }
            };

            match output.save_response(&ResponseItem::for_prompt(&prompt, raw)).await {
                Ok(path) => {
                    debug!(drug_id = %prompt.drugbank_id, "Response saved");
                    ItemOutcome::Done(path)
                }
                Err(e) => {
                    warn!(drug_id = %prompt.drugbank_id, error = %e, "Response save failed");
                    ItemOutcome::Failed(FailureReason::Io)
                }
            }
        })
        .await;

    Ok(report)
}

/// Directory for ensemble iteration `n`: `{base}_iteration_{n}`
pub fn iteration_dir(base: &Path, n: u32) -> PathBuf {
    PathBuf::from(format!("{}_iteration_{}", base.display(), n))
}

/// Repeat inference `iterations` times, one output directory per iteration
pub async fn run_inference_iterations(
    input: &WorkItemStore,
    output_base: &Path,
    iterations: u32,
    start_iteration: u32,
    client: &InferenceClient,
    runner: &BatchRunner,
    retry: &RetryPolicy,
) -> Result<Vec<(PathBuf, RunReport<PathBuf>)>> {
    let mut reports = Vec::new();

    for n in start_iteration..start_iteration + iterations {
        let dir = iteration_dir(output_base, n);
        info!(iteration = n, dir = %dir.display(), "Starting inference iteration");

        let output = WorkItemStore::open(&dir).await?;
        let report = run_inference(input, &output, client, runner, retry).await?;
        reports.push((dir, report));
    }

    Ok(reports)
}

/// Integrate every response directory. The directory at position `k` is
/// written as run index `start_index + k`.
pub async fn integrate_responses(
    dirs: &[PathBuf],
    start_index: u32,
    integrator: &ResponseIntegrator,
    runner: &BatchRunner,
) -> Result<Vec<RunReport<IntegrationReport>>> {
    let mut reports = Vec::new();

    for (k, dir) in dirs.iter().enumerate() {
        let run_index = start_index + k as u32;
        let store = WorkItemStore::existing(dir)?;
        let files = store.list().await?;
        info!(
            dir = %dir.display(),
            run_index,
            files = files.len(),
            pipeline = %integrator.kind(),
            "Integrating responses"
        );

        let items = files
            .into_iter()
            .map(|path| (path.display().to_string(), path))
            .collect();

        let store = &store;
        let report = runner
            .run("integration", items, |_, path| async move {
                let Some(target_id) = target_id_from_path(&path) else {
                    warn!(file = %path.display(), "Cannot derive drug id from file name");
                    return ItemOutcome::Failed(FailureReason::TargetNotFound);
                };

                let output = match store.read_raw(&path).await {
                    Ok(file_text) => ResponseItem::model_output(&file_text),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Response unreadable");
                        return ItemOutcome::Failed(FailureReason::Io);
                    }
                };

                match integrator.integrate(&output, &target_id, run_index).await {
                    Ok(report) => ItemOutcome::Done(report),
                    Err(e) => {
                        warn!(drug_id = %target_id, run_index, error = %e, "Integration failed");
                        ItemOutcome::Failed(e.reason())
                    }
                }
            })
            .await;

        reports.push(report);
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_dir_naming() {
        assert_eq!(
            iteration_dir(Path::new("/data/responses"), 3),
            PathBuf::from("/data/responses_iteration_3")
        );
    }

    #[test]
    fn test_classification_reads_selected_rating_run() {
        let props = pipeline_properties(PipelineKind::GoClassification, 2);
        assert!(props.contains(&DrugProperty::Indexed(IndexedProperty::ReasonRating, 2)));
        assert!(!props.contains(&DrugProperty::Pharmacodynamics));
    }
}

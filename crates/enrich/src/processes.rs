use anyhow::{Context, Result};
use graphstore::{BiologicalProcess, GraphRepository};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub created: usize,
    pub merged: usize,
    pub failed: usize,
}

/// Merge a JSON array of process annotations into the graph, in file order
pub async fn load_processes(repo: &dyn GraphRepository, path: &Path) -> Result<LoadReport> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read process file: {:?}", path))?;
    let records: Vec<BiologicalProcess> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid process file: {:?}", path))?;
    info!(records = records.len(), "Loading biological processes");

    let mut report = LoadReport::default();
    for record in &records {
        match repo.merge_biological_process(record).await {
            Ok(outcome) if outcome.created => report.created += 1,
            Ok(_) => report.merged += 1,
            Err(e) => {
                warn!(go_term = %record.go_term, error = %e, "Process merge failed");
                report.failed += 1;
            }
        }
    }

    info!(
        created = report.created,
        merged = report.merged,
        failed = report.failed,
        "Processes loaded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphstore::{InMemoryGraph, PropertyValue};

    #[tokio::test]
    async fn test_repeated_rows_merge_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.json");
        tokio::fs::write(
            &path,
            r#"[
                {"goTerm": "GO:0006954", "goName": "inflammatory response", "reference": "PMID:1"},
                {"goTerm": "GO:0006954", "goName": "inflammatory response", "reference": "PMID:2"},
                {"goTerm": "GO:0006915", "goName": "apoptotic process"}
            ]"#,
        )
        .await
        .unwrap();

        let graph = InMemoryGraph::new();
        let report = load_processes(&graph, &path).await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.merged, 1);
        let node = graph.process("GO:0006954").await.unwrap();
        assert_eq!(node["reference"], PropertyValue::from("PMID:1, PMID:2"));
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{}").await.unwrap();

        assert!(load_processes(&InMemoryGraph::new(), &path).await.is_err());
    }
}

use anyhow::{Context, Result};
use graphstore::GraphRepository;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathologyReport {
    pub links: usize,
    pub relinked: usize,
    pub still_unlinked: usize,
}

/// Ensure the Alzheimer node exists, relate every process (and optionally
/// protein) to it, then verify and repair missing links.
pub async fn link_pathology(
    repo: &dyn GraphRepository,
    include_proteins: bool,
) -> Result<PathologyReport> {
    repo.ensure_pathology().await?;
    repo.link_to_pathology(include_proteins)
        .await
        .context("Failed to link nodes to pathology")?;

    let unlinked = repo.unlinked_to_pathology().await?;
    let mut relinked = 0;
    if unlinked.is_empty() {
        info!("All processes and proteins are related to the pathology");
    } else {
        warn!(count = unlinked.len(), "Nodes missing the pathology link");
        for node in &unlinked {
            match repo.link_node_to_pathology(node).await {
                Ok(()) => relinked += 1,
                Err(e) => warn!(label = %node.label, key = %node.key, error = %e, "Re-link failed"),
            }
        }
    }

    let still_unlinked = repo.unlinked_to_pathology().await?.len();
    let links = repo.stats().await?.pathology_links;
    info!(links, relinked, still_unlinked, "Pathology linking finished");

    Ok(PathologyReport {
        links,
        relinked,
        still_unlinked,
    })
}

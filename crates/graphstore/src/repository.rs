use anyhow::Result;
use async_trait::async_trait;

use crate::model::{
    Attributes, BiologicalProcess, DrugProperty, GraphStats, IndexedProperty, MergeOutcome,
    NodeLabel, PendingDrug, PropertyValue, SetOutcome, UnlinkedNode,
};

/// Read and write access to the knowledge graph.
///
/// Every method is a single statement against the store, so implementations
/// are free to hand each call its own connection.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Unique keys of every node with the label
    async fn fetch_identifiers(&self, label: NodeLabel) -> Result<Vec<String>>;

    /// Selected properties of one drug, `None` when no such drug exists
    async fn fetch_attributes(
        &self,
        drugbank_id: &str,
        properties: &[DrugProperty],
    ) -> Result<Option<Attributes>>;

    /// Labels of the processes the drug `AFFECTS`
    async fn fetch_process_labels(&self, drugbank_id: &str) -> Result<Vec<String>>;

    async fn merge_biological_process(&self, process: &BiologicalProcess) -> Result<MergeOutcome>;

    /// Write all enrichment properties of one item in one statement
    async fn set_indexed_properties(
        &self,
        drugbank_id: &str,
        run_index: u32,
        values: &[(IndexedProperty, PropertyValue)],
    ) -> Result<SetOutcome>;

    async fn get_indexed_property(
        &self,
        drugbank_id: &str,
        property: IndexedProperty,
        run_index: u32,
    ) -> Result<Option<PropertyValue>>;

    /// Drugs with process names but no resolved GO IDs yet
    async fn drugs_pending_go_mapping(&self) -> Result<Vec<PendingDrug>>;

    async fn set_go_term_ids(&self, drugbank_id: &str, go_ids: &[String]) -> Result<SetOutcome>;

    /// Create `AFFECTS` edges to every known process in `affectedGoProcessId`,
    /// returns how many processes matched
    async fn link_drug_to_processes(&self, drugbank_id: &str) -> Result<usize>;

    async fn ensure_pathology(&self) -> Result<()>;

    async fn link_to_pathology(&self, include_proteins: bool) -> Result<()>;

    async fn unlinked_to_pathology(&self) -> Result<Vec<UnlinkedNode>>;

    async fn link_node_to_pathology(&self, node: &UnlinkedNode) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;
}

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::model::{
    ALZHEIMER, Attributes, BiologicalProcess, DrugProperty, GraphStats, IndexedProperty,
    MergeOutcome, NodeLabel, PendingDrug, PropertyValue, SetOutcome, UnlinkedNode,
};
use crate::repository::GraphRepository;

#[derive(Default)]
struct State {
    drugs: BTreeMap<String, Attributes>,
    processes: BTreeMap<String, Attributes>,
    proteins: BTreeSet<String>,
    pathologies: BTreeSet<String>,
    affects: BTreeSet<(String, String)>,
    related: BTreeSet<UnlinkedNode>,
}

/// Graph held in memory, with the same semantics as the Neo4j repository
#[derive(Default)]
pub struct InMemoryGraph {
    state: RwLock<State>,
    writes: AtomicUsize,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_drug(&self, drugbank_id: &str, mut attrs: Attributes) {
        attrs.insert("drugbankId".to_string(), drugbank_id.into());
        self.state
            .write()
            .await
            .drugs
            .insert(drugbank_id.to_string(), attrs);
    }

    pub async fn insert_protein(&self, uuid: &str) {
        self.state.write().await.proteins.insert(uuid.to_string());
    }

    pub async fn drug_property(&self, drugbank_id: &str, key: &str) -> Option<PropertyValue> {
        self.state
            .read()
            .await
            .drugs
            .get(drugbank_id)
            .and_then(|attrs| attrs.get(key))
            .cloned()
    }

    pub async fn process(&self, go_term: &str) -> Option<Attributes> {
        self.state.read().await.processes.get(go_term).cloned()
    }

    pub async fn affects(&self, drugbank_id: &str, go_term: &str) -> bool {
        self.state
            .read()
            .await
            .affects
            .contains(&(drugbank_id.to_string(), go_term.to_string()))
    }

    /// Successful write statements issued so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraph {
    async fn fetch_identifiers(&self, label: NodeLabel) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(match label {
            NodeLabel::Drug => state.drugs.keys().cloned().collect(),
            NodeLabel::BiologicalProcess => state.processes.keys().cloned().collect(),
            NodeLabel::Pathology => state.pathologies.iter().cloned().collect(),
            NodeLabel::Protein => state.proteins.iter().cloned().collect(),
        })
    }

    async fn fetch_attributes(
        &self,
        drugbank_id: &str,
        properties: &[DrugProperty],
    ) -> Result<Option<Attributes>> {
        let state = self.state.read().await;
        let Some(drug) = state.drugs.get(drugbank_id) else {
            return Ok(None);
        };

        let attrs = properties
            .iter()
            .filter_map(|p| {
                let key = p.key();
                drug.get(&key).cloned().map(|v| (key, v))
            })
            .collect();
        Ok(Some(attrs))
    }

    async fn fetch_process_labels(&self, drugbank_id: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut labels: Vec<String> = state
            .affects
            .iter()
            .filter(|(drug, _)| drug == drugbank_id)
            .filter_map(|(_, go_term)| {
                let process = state.processes.get(go_term)?;
                ["label", "goName", "goTerm"]
                    .iter()
                    .find_map(|k| process.get(*k).and_then(|v| v.as_text()))
                    .map(str::to_string)
            })
            .collect();
        labels.sort();
        Ok(labels)
    }

    async fn merge_biological_process(&self, process: &BiologicalProcess) -> Result<MergeOutcome> {
        let mut state = self.state.write().await;
        self.record_write();

        let Some(existing) = state.processes.get_mut(&process.go_term) else {
            let uuid = uuid::Uuid::new_v4().to_string();
            state
                .processes
                .insert(process.go_term.clone(), process.create_attributes(&uuid));
            return Ok(MergeOutcome { created: true });
        };

        for (field, incoming) in process.evidence() {
            let current = existing.get(field).and_then(|v| v.as_text());
            if let Some(merged) = BiologicalProcess::rule_for(field).apply(current, incoming) {
                existing.insert(field.to_string(), merged.into());
            }
        }
        Ok(MergeOutcome { created: false })
    }

    async fn set_indexed_properties(
        &self,
        drugbank_id: &str,
        run_index: u32,
        values: &[(IndexedProperty, PropertyValue)],
    ) -> Result<SetOutcome> {
        let mut state = self.state.write().await;
        let Some(drug) = state.drugs.get_mut(drugbank_id) else {
            return Ok(SetOutcome::NotFound);
        };

        for (property, value) in values {
            drug.insert(property.key(run_index), value.clone());
        }
        self.record_write();
        Ok(SetOutcome::Written)
    }

    async fn get_indexed_property(
        &self,
        drugbank_id: &str,
        property: IndexedProperty,
        run_index: u32,
    ) -> Result<Option<PropertyValue>> {
        Ok(self.drug_property(drugbank_id, &property.key(run_index)).await)
    }

    async fn drugs_pending_go_mapping(&self) -> Result<Vec<PendingDrug>> {
        let state = self.state.read().await;
        Ok(state
            .drugs
            .iter()
            .filter(|(_, attrs)| !attrs.contains_key("affectedGoProcessId"))
            .filter_map(|(id, attrs)| {
                let processes = attrs.get("affectedGoProcess")?.as_list();
                (!processes.is_empty()).then(|| PendingDrug {
                    drugbank_id: id.clone(),
                    processes,
                })
            })
            .collect())
    }

    async fn set_go_term_ids(&self, drugbank_id: &str, go_ids: &[String]) -> Result<SetOutcome> {
        let mut state = self.state.write().await;
        let Some(drug) = state.drugs.get_mut(drugbank_id) else {
            return Ok(SetOutcome::NotFound);
        };
        drug.insert("affectedGoProcessId".to_string(), go_ids.to_vec().into());
        self.record_write();
        Ok(SetOutcome::Written)
    }

    async fn link_drug_to_processes(&self, drugbank_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let go_ids = state
            .drugs
            .get(drugbank_id)
            .and_then(|attrs| attrs.get("affectedGoProcessId"))
            .map(|v| v.as_list())
            .unwrap_or_default();

        let matched: Vec<String> = go_ids
            .into_iter()
            .filter(|id| state.processes.contains_key(id))
            .collect();
        for go_term in &matched {
            state
                .affects
                .insert((drugbank_id.to_string(), go_term.clone()));
        }
        if !matched.is_empty() {
            self.record_write();
        }
        Ok(matched.len())
    }

    async fn ensure_pathology(&self) -> Result<()> {
        self.state
            .write()
            .await
            .pathologies
            .insert(ALZHEIMER.to_string());
        self.record_write();
        Ok(())
    }

    async fn link_to_pathology(&self, include_proteins: bool) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.pathologies.contains(ALZHEIMER) {
            return Ok(());
        }

        let mut nodes: Vec<UnlinkedNode> = state
            .processes
            .keys()
            .map(|key| UnlinkedNode {
                label: NodeLabel::BiologicalProcess,
                key: key.clone(),
            })
            .collect();
        if include_proteins {
            nodes.extend(state.proteins.iter().map(|key| UnlinkedNode {
                label: NodeLabel::Protein,
                key: key.clone(),
            }));
        }
        state.related.extend(nodes);
        self.record_write();
        Ok(())
    }

    async fn unlinked_to_pathology(&self) -> Result<Vec<UnlinkedNode>> {
        let state = self.state.read().await;
        let processes = state.processes.keys().map(|key| UnlinkedNode {
            label: NodeLabel::BiologicalProcess,
            key: key.clone(),
        });
        let proteins = state.proteins.iter().map(|key| UnlinkedNode {
            label: NodeLabel::Protein,
            key: key.clone(),
        });
        Ok(processes
            .chain(proteins)
            .filter(|node| !state.related.contains(node))
            .collect())
    }

    async fn link_node_to_pathology(&self, node: &UnlinkedNode) -> Result<()> {
        if !matches!(node.label, NodeLabel::BiologicalProcess | NodeLabel::Protein) {
            bail!("{} nodes are not linked to the pathology", node.label);
        }
        let mut state = self.state.write().await;
        if state.pathologies.contains(ALZHEIMER) {
            state.related.insert(node.clone());
            self.record_write();
        }
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let state = self.state.read().await;
        Ok(GraphStats {
            drug_count: state.drugs.len(),
            process_count: state.processes.len(),
            affects_count: state.affects.len(),
            drugs_with_go_ids: state
                .drugs
                .values()
                .filter(|attrs| attrs.contains_key("affectedGoProcessId"))
                .count(),
            pathology_links: state.related.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drug(name: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), name.into());
        attrs
    }

    #[tokio::test]
    async fn test_merge_concatenates_evidence_without_dedup() {
        let graph = InMemoryGraph::new();
        let mut process = BiologicalProcess::new("GO:0006915", "apoptotic process");
        process.reference = Some("PMID:1".to_string());

        assert!(graph.merge_biological_process(&process).await.unwrap().created);

        let mut again = process.clone();
        again.go_name = Some("renamed".to_string());
        assert!(!graph.merge_biological_process(&again).await.unwrap().created);

        let node = graph.process("GO:0006915").await.unwrap();
        assert_eq!(node["reference"], PropertyValue::from("PMID:1, PMID:1"));
        assert_eq!(node["goName"], PropertyValue::from("apoptotic process"));
        assert_eq!(node["label"], PropertyValue::from("apoptotic process"));
    }

    #[tokio::test]
    async fn test_merge_keeps_evidence_when_incoming_is_absent() {
        let graph = InMemoryGraph::new();
        let mut first = BiologicalProcess::new("GO:1", "p");
        first.symbol = Some("APP".to_string());
        graph.merge_biological_process(&first).await.unwrap();

        let mut second = BiologicalProcess::new("GO:1", "p");
        second.taxon_id = Some("9606".to_string());
        graph.merge_biological_process(&second).await.unwrap();

        let node = graph.process("GO:1").await.unwrap();
        assert_eq!(node["symbol"], PropertyValue::from("APP"));
        assert_eq!(node["taxonId"], PropertyValue::from("9606"));
    }

    #[tokio::test]
    async fn test_set_indexed_properties_on_missing_drug() {
        let graph = InMemoryGraph::new();
        let outcome = graph
            .set_indexed_properties("DB404", 0, &[(IndexedProperty::Rating, 0.5.into())])
            .await
            .unwrap();

        assert_eq!(outcome, SetOutcome::NotFound);
        assert_eq!(graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_runs_accumulate_side_by_side() {
        let graph = InMemoryGraph::new();
        graph.insert_drug("DB1", drug("Aspirin")).await;

        for (run, rating) in [(0, 0.3), (1, 0.6)] {
            graph
                .set_indexed_properties("DB1", run, &[(IndexedProperty::Rating, rating.into())])
                .await
                .unwrap();
        }

        assert_eq!(
            graph.get_indexed_property("DB1", IndexedProperty::Rating, 0).await.unwrap(),
            Some(PropertyValue::Float(0.3))
        );
        assert_eq!(
            graph.get_indexed_property("DB1", IndexedProperty::Rating, 1).await.unwrap(),
            Some(PropertyValue::Float(0.6))
        );
    }

    #[tokio::test]
    async fn test_link_drug_to_known_processes_only() {
        let graph = InMemoryGraph::new();
        graph.insert_drug("DB1", drug("Aspirin")).await;
        graph
            .merge_biological_process(&BiologicalProcess::new("GO:1", "inflammation"))
            .await
            .unwrap();
        graph
            .set_go_term_ids("DB1", &["GO:1".to_string(), "GO:2".to_string()])
            .await
            .unwrap();

        assert_eq!(graph.link_drug_to_processes("DB1").await.unwrap(), 1);
        assert!(graph.affects("DB1", "GO:1").await);
        assert_eq!(graph.fetch_process_labels("DB1").await.unwrap(), vec!["inflammation"]);
        assert!(graph.drugs_pending_go_mapping().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pathology_links_and_verification() {
        let graph = InMemoryGraph::new();
        graph
            .merge_biological_process(&BiologicalProcess::new("GO:1", "a"))
            .await
            .unwrap();
        graph.insert_protein("p-1").await;

        graph.ensure_pathology().await.unwrap();
        graph.link_to_pathology(false).await.unwrap();

        let unlinked = graph.unlinked_to_pathology().await.unwrap();
        assert_eq!(
            unlinked,
            vec![UnlinkedNode {
                label: NodeLabel::Protein,
                key: "p-1".to_string()
            }]
        );

        graph.link_node_to_pathology(&unlinked[0]).await.unwrap();
        assert!(graph.unlinked_to_pathology().await.unwrap().is_empty());
        assert_eq!(graph.stats().await.unwrap().pathology_links, 2);
    }
}

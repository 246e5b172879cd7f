use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{BoltType, Graph, Query, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::model::{
    ALZHEIMER, Attributes, BiologicalProcess, DrugProperty, EVIDENCE_FIELDS, EVIDENCE_SEPARATOR,
    GraphStats, IndexedProperty, MergeOutcome, NodeLabel, PendingDrug, PropertyValue, SetOutcome,
    UnlinkedNode, ValueKind,
};
use crate::repository::GraphRepository;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

/// Neo4j backed repository.
///
/// Every statement is one of the fixed templates below. Labels and property
/// names come from closed enums, values travel as parameters.
pub struct Neo4jRepository {
    graph: Graph,
}

const DRUG_EXISTS: &str = "MATCH (d:Drug {drugbankId: $id}) RETURN count(d) AS count";

const DRUG_PROPERTY: &str = "MATCH (d:Drug {drugbankId: $id}) RETURN d[$key] AS value";

const SET_DRUG_PROPERTIES: &str = r#"
    MATCH (d:Drug {drugbankId: $id})
    SET d += $props
    RETURN count(d) AS updated
"#;

const PROCESS_LABELS: &str = r#"
    MATCH (d:Drug {drugbankId: $id})-[:AFFECTS]->(b:BiologicalProcess)
    RETURN coalesce(b.label, b.goName, b.goTerm) AS label
    ORDER BY label
"#;

const PENDING_GO_MAPPING: &str = r#"
    MATCH (d:Drug)
    WHERE d.affectedGoProcess IS NOT NULL AND d.affectedGoProcessId IS NULL
    RETURN d.drugbankId AS id, d.affectedGoProcess AS processes
    ORDER BY id
"#;

const SET_GO_IDS: &str = r#"
    MATCH (d:Drug {drugbankId: $id})
    SET d.affectedGoProcessId = $ids
    RETURN count(d) AS updated
"#;

const LINK_DRUG_PROCESSES: &str = r#"
    MATCH (d:Drug {drugbankId: $id})
    WHERE d.affectedGoProcessId IS NOT NULL
    UNWIND d.affectedGoProcessId AS goId
    MATCH (b:BiologicalProcess {goTerm: trim(goId)})
    MERGE (d)-[:AFFECTS]->(b)
    RETURN count(b) AS linked
"#;

const ENSURE_PATHOLOGY: &str = r#"
    MERGE (p:Pathology {pathologyName: $name})
    ON CREATE SET p.uuid = $uuid
"#;

const LINK_PROCESSES_TO_PATHOLOGY: &str = r#"
    MATCH (p:Pathology {pathologyName: $name})
    MATCH (b:BiologicalProcess)
    MERGE (b)-[:RELATED_TO]->(p)
"#;

const LINK_PROTEINS_TO_PATHOLOGY: &str = r#"
    MATCH (p:Pathology {pathologyName: $name})
    MATCH (pr:Protein)
    MERGE (pr)-[:RELATED_TO]->(p)
"#;

const UNLINKED_PROCESSES: &str = r#"
    MATCH (n:BiologicalProcess)
    WHERE NOT EXISTS { (n)-[:RELATED_TO]->(:Pathology {pathologyName: $name}) }
    RETURN n.goTerm AS key
"#;

const UNLINKED_PROTEINS: &str = r#"
    MATCH (n:Protein)
    WHERE n.uuid IS NOT NULL
      AND NOT EXISTS { (n)-[:RELATED_TO]->(:Pathology {pathologyName: $name}) }
    RETURN n.uuid AS key
"#;

const RELINK_PROCESS: &str = r#"
    MATCH (p:Pathology {pathologyName: $name})
    MATCH (n:BiologicalProcess {goTerm: $key})
    MERGE (n)-[:RELATED_TO]->(p)
"#;

const RELINK_PROTEIN: &str = r#"
    MATCH (p:Pathology {pathologyName: $name})
    MATCH (n:Protein {uuid: $key})
    MERGE (n)-[:RELATED_TO]->(p)
"#;

/// MERGE template for processes: identity fields on create, evidence fields
/// appended on match. Field names come from `EVIDENCE_FIELDS`.
fn merge_process_cypher() -> &'static str {
    static CYPHER: OnceLock<String> = OnceLock::new();
    CYPHER.get_or_init(|| {
        let on_match: Vec<String> = EVIDENCE_FIELDS
            .iter()
            .map(|f| {
                format!(
                    "b.{f} = CASE WHEN $evidence.{f} IS NULL THEN b.{f} \
                     WHEN b.{f} IS NULL THEN $evidence.{f} \
                     ELSE b.{f} + $sep + $evidence.{f} END"
                )
            })
            .collect();

        format!(
            "MERGE (b:BiologicalProcess {{goTerm: $goTerm}})\n\
             ON CREATE SET b += $create\n\
             ON MATCH SET {}\n\
             RETURN b.uuid = $uuid AS created",
            on_match.join(",\n    ")
        )
    })
}

fn identifiers_cypher(label: NodeLabel) -> &'static str {
    match label {
        NodeLabel::Drug => "MATCH (n:Drug) WHERE n.drugbankId IS NOT NULL RETURN n.drugbankId AS key ORDER BY key",
        NodeLabel::BiologicalProcess => "MATCH (n:BiologicalProcess) RETURN n.goTerm AS key ORDER BY key",
        NodeLabel::Pathology => "MATCH (n:Pathology) RETURN n.pathologyName AS key ORDER BY key",
        NodeLabel::Protein => "MATCH (n:Protein) WHERE n.uuid IS NOT NULL RETURN n.uuid AS key ORDER BY key",
    }
}

fn to_bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Integer(i) => (*i).into(),
        PropertyValue::Float(f) => (*f).into(),
        PropertyValue::Text(s) => s.clone().into(),
        PropertyValue::TextList(list) => list.clone().into(),
    }
}

fn to_bolt_map(attrs: &Attributes) -> HashMap<String, BoltType> {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), to_bolt(value)))
        .collect()
}

/// Read a column as the expected kind. Null or mismatched values read as `None`.
fn read_value(row: &Row, column: &str, kind: ValueKind) -> Option<PropertyValue> {
    match kind {
        ValueKind::Text => row.get::<String>(column).ok().map(PropertyValue::Text),
        ValueKind::TextList => row
            .get::<Vec<String>>(column)
            .ok()
            .map(PropertyValue::TextList)
            .or_else(|| row.get::<String>(column).ok().map(PropertyValue::Text)),
        ValueKind::Float => row
            .get::<f64>(column)
            .ok()
            .or_else(|| row.get::<i64>(column).ok().map(|i| i as f64))
            .map(PropertyValue::Float),
        ValueKind::Integer => row.get::<i64>(column).ok().map(PropertyValue::Integer),
    }
}

impl Neo4jRepository {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let graph = Graph::new(
            config.uri.as_str(),
            config.username.as_str(),
            config.password.as_str(),
        )
        .await
        .with_context(|| format!("Failed to connect to Neo4j at {}", config.uri))?;

        info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create lookup indexes for the keys every statement matches on
    pub async fn init_schema(&self) -> Result<()> {
        self.graph
            .run(Query::new(
                "CREATE INDEX drug_id_index IF NOT EXISTS FOR (d:Drug) ON (d.drugbankId)".to_string(),
            ))
            .await
            .context("Failed to create index on Drug.drugbankId")?;

        self.graph
            .run(Query::new(
                "CREATE INDEX process_go_term_index IF NOT EXISTS FOR (b:BiologicalProcess) ON (b.goTerm)"
                    .to_string(),
            ))
            .await
            .context("Failed to create index on BiologicalProcess.goTerm")?;

        debug!("Neo4j indexes ensured");
        Ok(())
    }

    async fn single_count(&self, query: Query, column: &str) -> Result<usize> {
        let mut result = self.graph.execute(query).await?;
        let count = if let Some(row) = result.next().await? {
            row.get::<i64>(column).unwrap_or(0) as usize
        } else {
            0
        };
        Ok(count)
    }

    async fn keys(&self, query: Query) -> Result<Vec<String>> {
        let mut result = self.graph.execute(query).await?;
        let mut keys = Vec::new();
        while let Some(row) = result.next().await? {
            if let Ok(key) = row.get::<String>("key") {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn drug_property(
        &self,
        drugbank_id: &str,
        key: String,
        kind: ValueKind,
    ) -> Result<Option<PropertyValue>> {
        let query = Query::new(DRUG_PROPERTY.to_string())
            .param("id", drugbank_id.to_string())
            .param("key", key);

        let mut result = self.graph.execute(query).await?;
        Ok(match result.next().await? {
            Some(row) => read_value(&row, "value", kind),
            None => None,
        })
    }
}

#[async_trait]
impl GraphRepository for Neo4jRepository {
    async fn fetch_identifiers(&self, label: NodeLabel) -> Result<Vec<String>> {
        self.keys(Query::new(identifiers_cypher(label).to_string()))
            .await
            .with_context(|| format!("Failed to list {} identifiers", label))
    }

    async fn fetch_attributes(
        &self,
        drugbank_id: &str,
        properties: &[DrugProperty],
    ) -> Result<Option<Attributes>> {
        let exists = Query::new(DRUG_EXISTS.to_string()).param("id", drugbank_id.to_string());
        if self.single_count(exists, "count").await? == 0 {
            return Ok(None);
        }

        let mut attrs = Attributes::new();
        for property in properties {
            let key = property.key();
            if let Some(value) = self
                .drug_property(drugbank_id, key.clone(), property.kind())
                .await
                .with_context(|| format!("Failed to read {} of {}", key, drugbank_id))?
            {
                attrs.insert(key, value);
            }
        }
        Ok(Some(attrs))
    }

    async fn fetch_process_labels(&self, drugbank_id: &str) -> Result<Vec<String>> {
        let query = Query::new(PROCESS_LABELS.to_string()).param("id", drugbank_id.to_string());
        let mut result = self.graph.execute(query).await?;

        let mut labels = Vec::new();
        while let Some(row) = result.next().await? {
            if let Ok(label) = row.get::<String>("label") {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    async fn merge_biological_process(&self, process: &BiologicalProcess) -> Result<MergeOutcome> {
        let uuid = uuid::Uuid::new_v4().to_string();

        let mut evidence: HashMap<String, BoltType> = HashMap::new();
        for (field, value) in process.evidence() {
            if let Some(value) = value {
                evidence.insert(field.to_string(), value.to_string().into());
            }
        }

        let query = Query::new(merge_process_cypher().to_string())
            .param("goTerm", process.go_term.clone())
            .param("create", to_bolt_map(&process.create_attributes(&uuid)))
            .param("evidence", evidence)
            .param("sep", EVIDENCE_SEPARATOR)
            .param("uuid", uuid.clone());

        let mut result = self
            .graph
            .execute(query)
            .await
            .with_context(|| format!("Failed to merge process {}", process.go_term))?;

        let created = match result.next().await? {
            Some(row) => row.get::<bool>("created").unwrap_or(false),
            None => false,
        };

        debug!(go_term = %process.go_term, created, "Merged biological process");
        Ok(MergeOutcome { created })
    }

    async fn set_indexed_properties(
        &self,
        drugbank_id: &str,
        run_index: u32,
        values: &[(IndexedProperty, PropertyValue)],
    ) -> Result<SetOutcome> {
        let props: HashMap<String, BoltType> = values
            .iter()
            .map(|(property, value)| (property.key(run_index), to_bolt(value)))
            .collect();

        let query = Query::new(SET_DRUG_PROPERTIES.to_string())
            .param("id", drugbank_id.to_string())
            .param("props", props);

        let updated = self
            .single_count(query, "updated")
            .await
            .with_context(|| format!("Failed to write run {} for {}", run_index, drugbank_id))?;

        Ok(if updated > 0 {
            SetOutcome::Written
        } else {
            SetOutcome::NotFound
        })
    }

    async fn get_indexed_property(
        &self,
        drugbank_id: &str,
        property: IndexedProperty,
        run_index: u32,
    ) -> Result<Option<PropertyValue>> {
        self.drug_property(drugbank_id, property.key(run_index), property.kind())
            .await
    }

    async fn drugs_pending_go_mapping(&self) -> Result<Vec<PendingDrug>> {
        let mut result = self
            .graph
            .execute(Query::new(PENDING_GO_MAPPING.to_string()))
            .await?;

        let mut pending = Vec::new();
        while let Some(row) = result.next().await? {
            let Ok(drugbank_id) = row.get::<String>("id") else {
                continue;
            };
            let processes = read_value(&row, "processes", ValueKind::TextList)
                .map(|v| v.as_list())
                .unwrap_or_default();
            if !processes.is_empty() {
                pending.push(PendingDrug {
                    drugbank_id,
                    processes,
                });
            }
        }
        Ok(pending)
    }

    async fn set_go_term_ids(&self, drugbank_id: &str, go_ids: &[String]) -> Result<SetOutcome> {
        let query = Query::new(SET_GO_IDS.to_string())
            .param("id", drugbank_id.to_string())
            .param("ids", go_ids.to_vec());

        let updated = self.single_count(query, "updated").await?;
        Ok(if updated > 0 {
            SetOutcome::Written
        } else {
            SetOutcome::NotFound
        })
    }

    async fn link_drug_to_processes(&self, drugbank_id: &str) -> Result<usize> {
        let query =
            Query::new(LINK_DRUG_PROCESSES.to_string()).param("id", drugbank_id.to_string());
        self.single_count(query, "linked")
            .await
            .with_context(|| format!("Failed to link processes for {}", drugbank_id))
    }

    async fn ensure_pathology(&self) -> Result<()> {
        let query = Query::new(ENSURE_PATHOLOGY.to_string())
            .param("name", ALZHEIMER)
            .param("uuid", uuid::Uuid::new_v4().to_string());
        self.graph
            .run(query)
            .await
            .context("Failed to ensure pathology node")?;
        Ok(())
    }

    async fn link_to_pathology(&self, include_proteins: bool) -> Result<()> {
        self.graph
            .run(Query::new(LINK_PROCESSES_TO_PATHOLOGY.to_string()).param("name", ALZHEIMER))
            .await
            .context("Failed to link processes to pathology")?;

        if include_proteins {
            self.graph
                .run(Query::new(LINK_PROTEINS_TO_PATHOLOGY.to_string()).param("name", ALZHEIMER))
                .await
                .context("Failed to link proteins to pathology")?;
        }
        Ok(())
    }

    async fn unlinked_to_pathology(&self) -> Result<Vec<UnlinkedNode>> {
        let mut unlinked = Vec::new();
        for (label, cypher) in [
            (NodeLabel::BiologicalProcess, UNLINKED_PROCESSES),
            (NodeLabel::Protein, UNLINKED_PROTEINS),
        ] {
            let keys = self
                .keys(Query::new(cypher.to_string()).param("name", ALZHEIMER))
                .await?;
            unlinked.extend(keys.into_iter().map(|key| UnlinkedNode { label, key }));
        }
        Ok(unlinked)
    }

    async fn link_node_to_pathology(&self, node: &UnlinkedNode) -> Result<()> {
        let cypher = match node.label {
            NodeLabel::BiologicalProcess => RELINK_PROCESS,
            NodeLabel::Protein => RELINK_PROTEIN,
            other => anyhow::bail!("{} nodes are not linked to the pathology", other),
        };

        let query = Query::new(cypher.to_string())
            .param("name", ALZHEIMER)
            .param("key", node.key.clone());
        self.graph.run(query).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let count = |cypher: &str| Query::new(cypher.to_string());

        Ok(GraphStats {
            drug_count: self
                .single_count(count("MATCH (d:Drug) RETURN count(d) AS count"), "count")
                .await?,
            process_count: self
                .single_count(
                    count("MATCH (b:BiologicalProcess) RETURN count(b) AS count"),
                    "count",
                )
                .await?,
            affects_count: self
                .single_count(
                    count("MATCH (:Drug)-[r:AFFECTS]->(:BiologicalProcess) RETURN count(r) AS count"),
                    "count",
                )
                .await?,
            drugs_with_go_ids: self
                .single_count(
                    count("MATCH (d:Drug) WHERE d.affectedGoProcessId IS NOT NULL RETURN count(d) AS count"),
                    "count",
                )
                .await?,
            pathology_links: self
                .single_count(
                    Query::new(
                        "MATCH (:Pathology {pathologyName: $name})<-[r:RELATED_TO]-() RETURN count(r) AS count"
                            .to_string(),
                    )
                    .param("name", ALZHEIMER),
                    "count",
                )
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_template_covers_every_evidence_field() {
        let cypher = merge_process_cypher();
        for field in EVIDENCE_FIELDS {
            assert!(cypher.contains(&format!("b.{field} = CASE")), "{field}");
        }
        assert!(cypher.starts_with("MERGE (b:BiologicalProcess {goTerm: $goTerm})"));
        assert!(cypher.contains("ON CREATE SET b += $create"));
    }

    #[test]
    fn test_identifier_templates_use_key_property() {
        for label in [
            NodeLabel::Drug,
            NodeLabel::BiologicalProcess,
            NodeLabel::Pathology,
            NodeLabel::Protein,
        ] {
            let cypher = identifiers_cypher(label);
            assert!(cypher.contains(&format!("(n:{})", label)));
            assert!(cypher.contains(&format!("n.{} AS key", label.key_property())));
        }
    }
}

pub mod memory;
pub mod model;
pub mod neo4j;
pub mod repository;

pub use memory::InMemoryGraph;
pub use model::{
    ALZHEIMER, Attributes, BiologicalProcess, DrugProperty, EVIDENCE_FIELDS, GraphStats,
    IndexedProperty, MergeOutcome, MergeRule, NodeLabel, PendingDrug, PropertyValue, SetOutcome,
    UnlinkedNode, ValueKind,
};
pub use neo4j::{GraphConfig, Neo4jRepository};
pub use repository::GraphRepository;

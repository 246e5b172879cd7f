use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Node labels the pipeline touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Drug,
    BiologicalProcess,
    Pathology,
    Protein,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Drug => "Drug",
            NodeLabel::BiologicalProcess => "BiologicalProcess",
            NodeLabel::Pathology => "Pathology",
            NodeLabel::Protein => "Protein",
        }
    }

    /// Property that uniquely identifies a node of this label
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Drug => "drugbankId",
            NodeLabel::BiologicalProcess => "goTerm",
            NodeLabel::Pathology => "pathologyName",
            NodeLabel::Protein => "uuid",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ALZHEIMER: &str = "Alzheimer";

/// A property value as stored on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    Text(String),
    TextList(Vec<String>),
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Integer(i) => Value::from(*i),
            PropertyValue::Float(f) => Value::from(*f),
            PropertyValue::Text(s) => Value::from(s.clone()),
            PropertyValue::TextList(list) => Value::from(list.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// List view; a comma separated string counts as a list
    pub fn as_list(&self) -> Vec<String> {
        match self {
            PropertyValue::TextList(list) => list.clone(),
            PropertyValue::Text(s) => s
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::TextList(value)
    }
}

/// Expected storage type of a property, used when reading it back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    TextList,
    Float,
    Integer,
}

/// Enrichment results written once per run. The property name is the base
/// name plus `_{run_index}`, so independent runs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexedProperty {
    Rating,
    ReasonRating,
    RatingTokenLength,
    UspClassification,
}

impl IndexedProperty {
    pub fn base_name(&self) -> &'static str {
        match self {
            IndexedProperty::Rating => "rating",
            IndexedProperty::ReasonRating => "reason_rating",
            IndexedProperty::RatingTokenLength => "rating_token_length",
            IndexedProperty::UspClassification => "USP_classification",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            IndexedProperty::Rating => ValueKind::Float,
            IndexedProperty::ReasonRating => ValueKind::Text,
            IndexedProperty::RatingTokenLength => ValueKind::Integer,
            IndexedProperty::UspClassification => ValueKind::Text,
        }
    }

    pub fn key(&self, run_index: u32) -> String {
        format!("{}_{}", self.base_name(), run_index)
    }
}

/// Drug properties that can be fetched for prompt building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrugProperty {
    Name,
    Description,
    ClinicalDescription,
    Indication,
    MechanismOfAction,
    Pharmacodynamics,
    AffectedGoProcess,
    AffectedGoProcessId,
    Indexed(IndexedProperty, u32),
}

impl DrugProperty {
    pub fn key(&self) -> String {
        match self {
            DrugProperty::Name => "name".to_string(),
            DrugProperty::Description => "description".to_string(),
            DrugProperty::ClinicalDescription => "clinicalDescription".to_string(),
            DrugProperty::Indication => "indication".to_string(),
            DrugProperty::MechanismOfAction => "mechanismOfAction".to_string(),
            DrugProperty::Pharmacodynamics => "pharmacodynamics".to_string(),
            DrugProperty::AffectedGoProcess => "affectedGoProcess".to_string(),
            DrugProperty::AffectedGoProcessId => "affectedGoProcessId".to_string(),
            DrugProperty::Indexed(prop, run_index) => prop.key(*run_index),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            DrugProperty::AffectedGoProcess | DrugProperty::AffectedGoProcessId => {
                ValueKind::TextList
            }
            DrugProperty::Indexed(prop, _) => prop.kind(),
            _ => ValueKind::Text,
        }
    }
}

/// Fetched properties of one node, keyed by property name. Properties that
/// are unset on the node are absent from the map.
pub type Attributes = BTreeMap<String, PropertyValue>;

/// How an existing value reacts when a node is merged again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Identity fields: set on create, untouched afterwards
    Keep,
    /// Evidence fields: appended with the separator, never deduplicated
    Concatenate(&'static str),
}

impl MergeRule {
    pub fn apply(&self, existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
        match (self, existing, incoming) {
            (_, None, incoming) => incoming.map(str::to_string),
            (MergeRule::Keep, Some(existing), _) => Some(existing.to_string()),
            (MergeRule::Concatenate(_), Some(existing), None) => Some(existing.to_string()),
            (MergeRule::Concatenate(sep), Some(existing), Some(incoming)) => {
                Some(format!("{}{}{}", existing, sep, incoming))
            }
        }
    }
}

pub const EVIDENCE_SEPARATOR: &str = ", ";

/// Annotation fields of a BiologicalProcess that accumulate across source rows
pub const EVIDENCE_FIELDS: [&str; 12] = [
    "geneProductDb",
    "geneProductId",
    "symbol",
    "qualifier",
    "ecoId",
    "goEvidenceCode",
    "reference",
    "withFrom",
    "taxonId",
    "assignedBy",
    "annotationExtension",
    "goAspect",
];

/// One observation of a GO biological process with its evidence metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiologicalProcess {
    pub go_term: String,
    #[serde(default)]
    pub go_name: Option<String>,
    #[serde(default)]
    pub gene_product_db: Option<String>,
    #[serde(default)]
    pub gene_product_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
    #[serde(default)]
    pub eco_id: Option<String>,
    #[serde(default)]
    pub go_evidence_code: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub with_from: Option<String>,
    #[serde(default)]
    pub taxon_id: Option<String>,
    #[serde(default)]
    pub assigned_by: Option<String>,
    #[serde(default)]
    pub annotation_extension: Option<String>,
    #[serde(default)]
    pub go_aspect: Option<String>,
}

impl BiologicalProcess {
    pub fn new(go_term: impl Into<String>, go_name: impl Into<String>) -> Self {
        Self {
            go_term: go_term.into(),
            go_name: Some(go_name.into()),
            ..Default::default()
        }
    }

    pub fn rule_for(field: &str) -> MergeRule {
        if EVIDENCE_FIELDS.contains(&field) {
            MergeRule::Concatenate(EVIDENCE_SEPARATOR)
        } else {
            MergeRule::Keep
        }
    }

    /// Evidence values in `EVIDENCE_FIELDS` order
    pub fn evidence(&self) -> [(&'static str, Option<&str>); 12] {
        let values = [
            &self.gene_product_db,
            &self.gene_product_id,
            &self.symbol,
            &self.qualifier,
            &self.eco_id,
            &self.go_evidence_code,
            &self.reference,
            &self.with_from,
            &self.taxon_id,
            &self.assigned_by,
            &self.annotation_extension,
            &self.go_aspect,
        ];
        std::array::from_fn(|i| (EVIDENCE_FIELDS[i], values[i].as_deref()))
    }

    /// Properties written when the node is first created
    pub fn create_attributes(&self, uuid: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("goTerm".to_string(), self.go_term.clone().into());
        if let Some(name) = &self.go_name {
            attrs.insert("goName".to_string(), name.clone().into());
            attrs.insert("label".to_string(), name.clone().into());
        }
        attrs.insert("uuid".to_string(), uuid.into());
        for (field, value) in self.evidence() {
            if let Some(value) = value {
                attrs.insert(field.to_string(), value.into());
            }
        }
        attrs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Written,
    NotFound,
}

/// A drug whose process names still need GO ID resolution
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDrug {
    pub drugbank_id: String,
    pub processes: Vec<String>,
}

/// A node that should be related to the pathology but is not
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnlinkedNode {
    pub label: NodeLabel,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub drug_count: usize,
    pub process_count: usize,
    pub affects_count: usize,
    pub drugs_with_go_ids: usize,
    pub pathology_links: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_property_keys() {
        assert_eq!(IndexedProperty::Rating.key(0), "rating_0");
        assert_eq!(IndexedProperty::ReasonRating.key(3), "reason_rating_3");
        assert_eq!(IndexedProperty::RatingTokenLength.key(1), "rating_token_length_1");
        assert_eq!(IndexedProperty::UspClassification.key(2), "USP_classification_2");
    }

    #[test]
    fn test_concatenate_rule_does_not_deduplicate() {
        let rule = BiologicalProcess::rule_for("reference");
        assert_eq!(
            rule.apply(Some("PMID:1"), Some("PMID:1")).as_deref(),
            Some("PMID:1, PMID:1")
        );
        assert_eq!(rule.apply(None, Some("PMID:1")).as_deref(), Some("PMID:1"));
        assert_eq!(rule.apply(Some("PMID:1"), None).as_deref(), Some("PMID:1"));
    }

    #[test]
    fn test_identity_fields_are_kept() {
        let rule = BiologicalProcess::rule_for("goName");
        assert_eq!(rule, MergeRule::Keep);
        assert_eq!(rule.apply(Some("old"), Some("new")).as_deref(), Some("old"));
    }

    #[test]
    fn test_create_attributes_label_mirrors_name() {
        let mut process = BiologicalProcess::new("GO:0006954", "inflammatory response");
        process.reference = Some("PMID:1".to_string());
        let attrs = process.create_attributes("u-1");

        assert_eq!(attrs["label"], PropertyValue::from("inflammatory response"));
        assert_eq!(attrs["reference"], PropertyValue::from("PMID:1"));
        assert!(!attrs.contains_key("symbol"));
    }

    #[test]
    fn test_text_as_list_splits_on_commas() {
        let value = PropertyValue::from("apoptosis, autophagy ,");
        assert_eq!(value.as_list(), vec!["apoptosis", "autophagy"]);
    }
}

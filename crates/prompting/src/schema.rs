use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The enrichment pipelines that share the prompt/response round trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Repurposing promise of a drug, `rating` in [0, 1] plus a reason
    Rating,
    /// Main GO process a drug works on
    GoClassification,
}

impl PipelineKind {
    /// Fields the model must return for this pipeline
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            PipelineKind::Rating => &[RATING_FIELD, REASON_FIELD],
            PipelineKind::GoClassification => &[CLASSIFICATION_FIELD],
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Rating => write!(f, "rating"),
            PipelineKind::GoClassification => write!(f, "go-classification"),
        }
    }
}

pub const RATING_FIELD: &str = "rating";
pub const REASON_FIELD: &str = "reason_rating";
pub const CLASSIFICATION_FIELD: &str = "Drug_Classification";

/// Graph attributes of one unit of work, as they are shown to the model.
///
/// `fields` is a sorted map so the rendered prompt is byte-stable for
/// identical input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitAttributes {
    pub drugbank_id: String,
    pub name: String,
    pub fields: BTreeMap<String, Value>,
    /// Labels of the biological processes the drug affects
    pub processes: Vec<String>,
}

impl UnitAttributes {
    pub fn new(drugbank_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            drugbank_id: drugbank_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_processes(mut self, processes: Vec<String>) -> Self {
        self.processes = processes;
        self
    }

    /// The JSON block embedded in the prompt; always carries the id and name
    pub fn render(&self) -> Value {
        let mut block: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        block.insert("drugbankId".to_string(), Value::String(self.drugbank_id.clone()));
        block.insert("name".to_string(), Value::String(self.name.clone()));
        Value::Object(block)
    }
}

/// Validated model output, ready to be written to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentPayload {
    Rating { rating: f64, reason: String },
    Classification { classification: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("field '{field}' {problem}")]
pub struct FieldError {
    pub field: &'static str,
    pub problem: &'static str,
}

impl FieldError {
    fn new(field: &'static str, problem: &'static str) -> Self {
        Self { field, problem }
    }
}

impl EnrichmentPayload {
    /// Pull the pipeline's required fields out of a normalized response object
    pub fn extract(kind: PipelineKind, object: &Map<String, Value>) -> Result<Self, FieldError> {
        match kind {
            PipelineKind::Rating => {
                let reason = non_empty_text(object, REASON_FIELD)?;
                let rating = rating_value(object)?;
                Ok(EnrichmentPayload::Rating { rating, reason })
            }
            PipelineKind::GoClassification => {
                let classification = non_empty_text(object, CLASSIFICATION_FIELD)?;
                Ok(EnrichmentPayload::Classification { classification })
            }
        }
    }
}

fn non_empty_text(object: &Map<String, Value>, field: &'static str) -> Result<String, FieldError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(FieldError::new(field, "is missing")),
        Some(Value::String(s)) if s.trim().is_empty() => Err(FieldError::new(field, "is empty")),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(FieldError::new(field, "is not text")),
    }
}

// Models sometimes quote the number; accept "0.7" as well as 0.7.
fn rating_value(object: &Map<String, Value>) -> Result<f64, FieldError> {
    let rating = match object.get(RATING_FIELD) {
        None | Some(Value::Null) => return Err(FieldError::new(RATING_FIELD, "is missing")),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(FieldError::new(RATING_FIELD, "is empty"));
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match rating {
        Some(r) if r.is_finite() && (0.0..=1.0).contains(&r) => Ok(r),
        Some(_) => Err(FieldError::new(RATING_FIELD, "is outside [0, 1]")),
        None => Err(FieldError::new(RATING_FIELD, "is not a number")),
    }
}

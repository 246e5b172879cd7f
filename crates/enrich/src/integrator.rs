use graphstore::{GraphRepository, IndexedProperty, PropertyValue, SetOutcome};
use prompting::{EnrichmentPayload, FieldError, NormalizeError, PipelineKind, normalize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::tally::FailureReason;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload is not an object (got {0})")]
    NotAnObject(&'static str),

    #[error("{0}")]
    MissingField(FieldError),

    #[error("read back of {property} does not match what was written")]
    VerificationFailed { property: String },

    #[error("drug {0} not found in graph")]
    TargetNotFound(String),

    #[error("graph error: {0:#}")]
    Graph(anyhow::Error),
}

impl From<NormalizeError> for IntegrationError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::MalformedEnvelope(e) => IntegrationError::MalformedEnvelope(e),
            NormalizeError::MalformedPayload(e) => IntegrationError::MalformedPayload(e),
            NormalizeError::NotAnObject(kind) => IntegrationError::NotAnObject(kind),
        }
    }
}

impl IntegrationError {
    pub fn reason(&self) -> FailureReason {
        match self {
            IntegrationError::MalformedEnvelope(_) => FailureReason::MalformedEnvelope,
            IntegrationError::MalformedPayload(_) => FailureReason::MalformedPayload,
            IntegrationError::NotAnObject(_) => FailureReason::NotAnObject,
            IntegrationError::MissingField(_) => FailureReason::MissingField,
            IntegrationError::VerificationFailed { .. } => FailureReason::VerificationFailed,
            IntegrationError::TargetNotFound(_) => FailureReason::TargetNotFound,
            IntegrationError::Graph(_) => FailureReason::Graph,
        }
    }
}

/// What one successful integration wrote
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationReport {
    pub drugbank_id: String,
    pub run_index: u32,
    pub properties: Vec<String>,
}

/// Validates raw model output and writes it to the graph as run-indexed
/// properties, then reads every property back.
#[derive(Clone)]
pub struct ResponseIntegrator {
    repo: Arc<dyn GraphRepository>,
    kind: PipelineKind,
}

impl ResponseIntegrator {
    pub fn new(repo: Arc<dyn GraphRepository>, kind: PipelineKind) -> Self {
        Self { repo, kind }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Property values to write for a validated payload
    pub fn values_for(
        payload: EnrichmentPayload,
        raw: &str,
    ) -> Vec<(IndexedProperty, PropertyValue)> {
        match payload {
            EnrichmentPayload::Rating { rating, reason } => vec![
                (IndexedProperty::Rating, PropertyValue::Float(rating)),
                (IndexedProperty::ReasonRating, PropertyValue::Text(reason)),
                (
                    IndexedProperty::RatingTokenLength,
                    PropertyValue::Integer(raw.chars().count() as i64),
                ),
            ],
            EnrichmentPayload::Classification { classification } => vec![(
                IndexedProperty::UspClassification,
                PropertyValue::Text(classification),
            )],
        }
    }

    /// Integrate one model output. `target_id` comes from the work item's
    /// file name. Nothing is written unless the payload fully validates.
    /// The token length written for ratings is the length of `raw`.
    pub async fn integrate(
        &self,
        raw: &str,
        target_id: &str,
        run_index: u32,
    ) -> Result<IntegrationReport, IntegrationError> {
        let object = normalize(raw)?;
        let payload =
            EnrichmentPayload::extract(self.kind, &object).map_err(IntegrationError::MissingField)?;
        let values = Self::values_for(payload, raw);

        let outcome = self
            .repo
            .set_indexed_properties(target_id, run_index, &values)
            .await
            .map_err(IntegrationError::Graph)?;
        if outcome == SetOutcome::NotFound {
            return Err(IntegrationError::TargetNotFound(target_id.to_string()));
        }

        for (property, expected) in &values {
            let actual = self
                .repo
                .get_indexed_property(target_id, *property, run_index)
                .await
                .map_err(IntegrationError::Graph)?;

            if actual.as_ref() != Some(expected) {
                let property = property.key(run_index);
                warn!(drug_id = target_id, property = %property, ?actual, "Verification mismatch");
                return Err(IntegrationError::VerificationFailed { property });
            }
        }

        debug!(drug_id = target_id, run_index, pipeline = %self.kind, "Response integrated");
        Ok(IntegrationReport {
            drugbank_id: target_id.to_string(),
            run_index,
            properties: values.iter().map(|(p, _)| p.key(run_index)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphstore::{Attributes, InMemoryGraph};

    async fn graph_with(ids: &[&str]) -> Arc<InMemoryGraph> {
        let graph = Arc::new(InMemoryGraph::new());
        for id in ids {
            graph.insert_drug(id, Attributes::new()).await;
        }
        graph
    }

    #[tokio::test]
    async fn test_rating_writes_three_properties() {
        let graph = graph_with(&["DB1"]).await;
        let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

        let raw = r#"{"rating": 0.4, "reason_rating": "modest"}"#;
        let report = integrator.integrate(raw, "DB1", 0).await.unwrap();

        assert_eq!(
            report.properties,
            vec!["rating_0", "reason_rating_0", "rating_token_length_0"]
        );
        assert_eq!(
            graph.drug_property("DB1", "rating_token_length_0").await,
            Some(PropertyValue::Integer(raw.chars().count() as i64))
        );
    }

    #[tokio::test]
    async fn test_classification_writes_usp_property() {
        let graph = graph_with(&["DB2"]).await;
        let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::GoClassification);

        integrator
            .integrate(r#"{"Drug_Classification": "apoptotic process"}"#, "DB2", 1)
            .await
            .unwrap();

        assert_eq!(
            graph.drug_property("DB2", "USP_classification_1").await,
            Some(PropertyValue::from("apoptotic process"))
        );
    }

    #[tokio::test]
    async fn test_missing_field_writes_nothing() {
        let graph = graph_with(&["DB1"]).await;
        let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

        let err = integrator
            .integrate(r#"{"reason_rating": "no number"}"#, "DB1", 0)
            .await
            .unwrap_err();

        assert_eq!(err.reason(), FailureReason::MissingField);
        assert_eq!(graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_rejected() {
        let graph = graph_with(&["DB1"]).await;
        let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

        let err = integrator
            .integrate(r#"{"rating": 7, "reason_rating": "very"}"#, "DB1", 0)
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::MissingField(_)));
        assert_eq!(graph.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let graph = graph_with(&[]).await;
        let integrator = ResponseIntegrator::new(graph, PipelineKind::Rating);

        let err = integrator
            .integrate(r#"{"rating": 0.1, "reason_rating": "r"}"#, "DB404", 0)
            .await
            .unwrap_err();

        assert_eq!(err.reason(), FailureReason::TargetNotFound);
    }

    #[tokio::test]
    async fn test_double_encoded_output_length_counts_model_text() {
        let graph = graph_with(&["DB1"]).await;
        let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

        let raw = r#""{\"rating\": 0.25, \"reason_rating\": \"anti-inflammatory\"}""#;
        integrator.integrate(raw, "DB1", 3).await.unwrap();

        assert_eq!(
            graph.drug_property("DB1", "rating_3").await,
            Some(PropertyValue::Float(0.25))
        );
        assert_eq!(
            graph.drug_property("DB1", "rating_token_length_3").await,
            Some(PropertyValue::Integer(raw.chars().count() as i64))
        );
    }
}

use enrich::{
    BatchRunner, FailureReason, IntegrationError, ResponseIntegrator, RetryPolicy,
    generate_prompts, integrate_responses, run_inference,
};
use graphstore::{Attributes, GraphRepository, InMemoryGraph, PropertyValue};
use prompting::{InferenceClient, PipelineKind, PromptBuilder};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workitems::{PromptItem, ResponseItem, WorkItemStore};

async fn graph_with_drugs(ids: &[&str]) -> Arc<InMemoryGraph> {
    let graph = Arc::new(InMemoryGraph::new());
    for id in ids {
        let mut attrs = Attributes::new();
        attrs.insert("name".to_string(), format!("drug {id}").into());
        attrs.insert("mechanismOfAction".to_string(), "inhibits something".into());
        graph.insert_drug(id, attrs).await;
    }
    graph
}

#[tokio::test]
async fn double_encoded_response_is_written_for_run_two() {
    let graph = graph_with_drugs(&["DB00945"]).await;
    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

    let raw = r#""{\"rating\": 0.7, \"reason_rating\": \"ok\"}""#;
    integrator.integrate(raw, "DB00945", 2).await.unwrap();

    assert_eq!(
        graph.drug_property("DB00945", "rating_2").await,
        Some(PropertyValue::Float(0.7))
    );
    assert_eq!(
        graph.drug_property("DB00945", "reason_rating_2").await,
        Some(PropertyValue::from("ok"))
    );
}

#[tokio::test]
async fn not_json_is_a_malformed_envelope_with_no_writes() {
    let graph = graph_with_drugs(&["DB1"]).await;
    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

    let err = integrator.integrate("not json", "DB1", 0).await.unwrap_err();

    assert!(matches!(err, IntegrationError::MalformedEnvelope(_)));
    assert_eq!(graph.write_count(), 0);
}

#[tokio::test]
async fn bare_number_is_not_an_object_with_no_writes() {
    let graph = graph_with_drugs(&["DB1"]).await;
    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

    let err = integrator.integrate("42", "DB1", 0).await.unwrap_err();

    assert!(matches!(err, IntegrationError::NotAnObject(_)));
    assert_eq!(graph.write_count(), 0);
}

#[tokio::test]
async fn runs_zero_and_one_coexist() {
    let graph = graph_with_drugs(&["DB1"]).await;
    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);

    integrator
        .integrate(r#"{"rating": 0.2, "reason_rating": "first"}"#, "DB1", 0)
        .await
        .unwrap();
    integrator
        .integrate(r#"{"rating": 0.9, "reason_rating": "second"}"#, "DB1", 1)
        .await
        .unwrap();

    assert_eq!(graph.drug_property("DB1", "rating_0").await, Some(PropertyValue::Float(0.2)));
    assert_eq!(graph.drug_property("DB1", "rating_1").await, Some(PropertyValue::Float(0.9)));
    assert_eq!(
        graph.drug_property("DB1", "reason_rating_0").await,
        Some(PropertyValue::from("first"))
    );
}

#[tokio::test]
async fn batch_of_ten_with_three_malformed() {
    let ids: Vec<String> = (1..=10).map(|i| format!("DB{i:05}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let graph = graph_with_drugs(&id_refs).await;

    let dir = tempfile::tempdir().unwrap();
    let store = WorkItemStore::open(dir.path()).await.unwrap();
    for (i, id) in ids.iter().enumerate() {
        let response = if i < 3 {
            "this is not json".to_string()
        } else {
            json!({"rating": 0.5, "reason_rating": format!("reason {i}")}).to_string()
        };
        store
            .save_response(&ResponseItem {
                drugbank_id: id.clone(),
                name: String::new(),
                response,
                prompt_fingerprint: None,
            })
            .await
            .unwrap();
    }

    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);
    let reports = integrate_responses(
        &[dir.path().to_path_buf()],
        0,
        &integrator,
        &BatchRunner::new(4),
    )
    .await
    .unwrap();

    let report = &reports[0];
    assert_eq!(report.processed, 10);
    assert_eq!(report.failed, 3);
    assert_eq!(report.tally.count(FailureReason::MalformedEnvelope), 3);
    assert_eq!(report.results.len(), 7);

    let mut verified = 0;
    for id in &ids {
        if graph.drug_property(id, "rating_0").await == Some(PropertyValue::Float(0.5)) {
            verified += 1;
        }
    }
    assert_eq!(verified, 7);
}

#[tokio::test]
async fn double_encoded_model_output_in_response_file_is_written() {
    let graph = graph_with_drugs(&["DB00945"]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = WorkItemStore::open(dir.path()).await.unwrap();

    let model_output = r#""{\"rating\": 0.7, \"reason_rating\": \"ok\"}""#;
    let prompt = PromptItem::new("DB00945".into(), "drug DB00945".into(), "rate it".into());
    store
        .save_response(&ResponseItem::for_prompt(&prompt, model_output.to_string()))
        .await
        .unwrap();

    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);
    let reports = integrate_responses(
        &[dir.path().to_path_buf()],
        0,
        &integrator,
        &BatchRunner::new(1),
    )
    .await
    .unwrap();

    assert_eq!(reports[0].failed, 0);
    assert_eq!(
        graph.drug_property("DB00945", "rating_0").await,
        Some(PropertyValue::Float(0.7))
    );
    // measured on the model output, not on the file around it
    assert_eq!(
        graph.drug_property("DB00945", "rating_token_length_0").await,
        Some(PropertyValue::Integer(model_output.chars().count() as i64))
    );
}

#[tokio::test]
async fn directory_position_sets_run_index() {
    let graph = graph_with_drugs(&["DB1"]).await;
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    for (dir, rating) in [(&first, 0.1), (&second, 0.3)] {
        let store = WorkItemStore::open(dir.path()).await.unwrap();
        store
            .save_response(&ResponseItem {
                drugbank_id: "DB1".to_string(),
                name: "drug DB1".to_string(),
                response: json!({"rating": rating, "reason_rating": "r"}).to_string(),
                prompt_fingerprint: None,
            })
            .await
            .unwrap();
    }

    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);
    integrate_responses(
        &[first.path().to_path_buf(), second.path().to_path_buf()],
        5,
        &integrator,
        &BatchRunner::new(2),
    )
    .await
    .unwrap();

    assert_eq!(graph.drug_property("DB1", "rating_5").await, Some(PropertyValue::Float(0.1)));
    assert_eq!(graph.drug_property("DB1", "rating_6").await, Some(PropertyValue::Float(0.3)));
}

#[tokio::test]
async fn prompts_through_inference_to_graph() {
    let graph = graph_with_drugs(&["DB1", "DB2"]).await;
    let prompts_dir = tempfile::tempdir().unwrap();
    let responses_dir = tempfile::tempdir().unwrap();
    let prompts = WorkItemStore::open(prompts_dir.path()).await.unwrap();
    let responses = WorkItemStore::open(responses_dir.path()).await.unwrap();
    let runner = BatchRunner::new(2);

    let repo: &dyn GraphRepository = &*graph;
    let generated = generate_prompts(
        repo,
        &PromptBuilder::new(PipelineKind::Rating),
        &prompts,
        &runner,
        0,
    )
    .await
    .unwrap();
    assert_eq!(generated.results.len(), 2);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "{\"rating\": 0.6, \"reason_rating\": \"plausible\"}",
            "done": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = InferenceClient::new(server.uri(), "llama3:8b".to_string(), None).unwrap();
    let retry = RetryPolicy::new(2, 1, 1);
    let inferred = run_inference(&prompts, &responses, &client, &runner, &retry)
        .await
        .unwrap();
    assert_eq!(inferred.results.len(), 2);

    // identical prompts are not sent again
    let again = run_inference(&prompts, &responses, &client, &runner, &retry)
        .await
        .unwrap();
    assert_eq!(again.tally.skipped, 2);

    let integrator = ResponseIntegrator::new(graph.clone(), PipelineKind::Rating);
    let reports = integrate_responses(
        &[responses_dir.path().to_path_buf()],
        0,
        &integrator,
        &runner,
    )
    .await
    .unwrap();

    assert_eq!(reports[0].failed, 0);
    assert_eq!(graph.drug_property("DB2", "rating_0").await, Some(PropertyValue::Float(0.6)));
    let model_output = r#"{"rating": 0.6, "reason_rating": "plausible"}"#;
    assert_eq!(
        graph.drug_property("DB2", "rating_token_length_0").await,
        Some(PropertyValue::Integer(model_output.chars().count() as i64))
    );
}

#[tokio::test]
async fn transient_inference_failure_is_tallied_as_transport() {
    let graph = graph_with_drugs(&["DB1"]).await;
    let prompts_dir = tempfile::tempdir().unwrap();
    let responses_dir = tempfile::tempdir().unwrap();
    let prompts = WorkItemStore::open(prompts_dir.path()).await.unwrap();
    let responses = WorkItemStore::open(responses_dir.path()).await.unwrap();
    let runner = BatchRunner::new(1);

    generate_prompts(
        &*graph,
        &PromptBuilder::new(PipelineKind::Rating),
        &prompts,
        &runner,
        0,
    )
    .await
    .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = InferenceClient::new(server.uri(), "m".to_string(), None).unwrap();
    let report = run_inference(&prompts, &responses, &client, &runner, &RetryPolicy::new(3, 1, 1))
        .await
        .unwrap();

    assert_eq!(report.tally.count(FailureReason::Transport), 1);
    assert!(responses.list().await.unwrap().is_empty());
}

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{LookupError, read_json};

/// Resolves GO process names to term IDs through the EBI QuickGO search API
#[derive(Clone)]
pub struct QuickGoClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
}

impl QuickGoClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new("https://www.ebi.ac.uk/QuickGO/services".to_string())
    }

    /// Best matching GO ID for a process name, `None` when the search is empty
    pub async fn resolve(&self, term_name: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/ontology/go/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("query", term_name), ("limit", "1"), ("ontology", "go")])
            .send()
            .await?;

        let search: SearchResponse = read_json(response).await?;
        match search.results.into_iter().next() {
            Some(hit) => {
                debug!(term = term_name, go_id = %hit.id, "GO term resolved");
                Ok(Some(hit.id))
            }
            None => {
                warn!(term = term_name, "No GO term found");
                Ok(None)
            }
        }
    }
}

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{LookupError, read_json};

/// Fields requested for every study
pub const STUDY_FIELDS: &str = "NCTId,BriefTitle,OfficialTitle,StudyFirstPostYear,\
ResponsiblePartyInvestigatorAffiliation,Condition,StudyType,Phase,Sex,GenderBased,\
OverallStatus,Gender,EligibilityCriteria,LocationGeoPoint";

/// Client for the ClinicalTrials.gov v2 studies endpoint
#[derive(Clone)]
pub struct ClinicalTrialsClient {
    base_url: String,
    client: reqwest::Client,
}

/// One page of search results
#[derive(Debug, Deserialize)]
pub struct StudyPage {
    #[serde(default)]
    pub studies: Vec<Value>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

impl ClinicalTrialsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new("https://clinicaltrials.gov/api/v2".to_string())
    }

    pub async fn fetch_page(
        &self,
        term: &str,
        page_token: Option<&str>,
    ) -> Result<StudyPage, LookupError> {
        let url = format!("{}/studies", self.base_url);

        let mut query = vec![
            ("format", "json"),
            ("query.term", term),
            ("fields", STUDY_FIELDS),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        debug!(term, page_token = page_token.unwrap_or("-"), "Fetching studies page");
        let response = self.client.get(&url).query(&query).send().await?;
        read_json(response).await
    }
}

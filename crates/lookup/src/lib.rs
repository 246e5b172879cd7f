pub mod clinical_trials;
pub mod quickgo;

pub use clinical_trials::{ClinicalTrialsClient, StudyPage};
pub use quickgo::QuickGoClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("lookup endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("lookup response unreadable: {0}")]
    Decode(String),
}

impl LookupError {
    /// Connection problems, 429 and 5xx are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::Transport(_) => true,
            LookupError::Status { status, .. } => *status == 429 || *status >= 500,
            LookupError::Decode(_) => false,
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, LookupError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LookupError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| LookupError::Decode(e.to_string()))
}

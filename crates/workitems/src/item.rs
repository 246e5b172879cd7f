use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A rendered prompt waiting for inference, one per drug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptItem {
    #[serde(rename = "drugbankId")]
    pub drugbank_id: String,
    pub name: String,
    pub prompt: String,
    /// Stable hash of `prompt`, absent in files written by older tooling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl PromptItem {
    pub fn new(drugbank_id: String, name: String, prompt: String) -> Self {
        let fingerprint = Some(fingerprint(&prompt));

        Self {
            drugbank_id,
            name,
            prompt,
            fingerprint,
        }
    }

    /// Fingerprint of the prompt, computed on the fly if the file lacked one
    pub fn fingerprint(&self) -> String {
        self.fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(&self.prompt))
    }
}

/// Raw model output for one drug. `response` is stored verbatim, the
/// integration stage owns all parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseItem {
    #[serde(rename = "drugbankId", default)]
    pub drugbank_id: String,
    #[serde(default)]
    pub name: String,
    pub response: String,
    #[serde(
        rename = "promptFingerprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_fingerprint: Option<String>,
}

impl ResponseItem {
    pub fn for_prompt(prompt: &PromptItem, response: String) -> Self {
        Self {
            drugbank_id: prompt.drugbank_id.clone(),
            name: prompt.name.clone(),
            response,
            prompt_fingerprint: Some(prompt.fingerprint()),
        }
    }

    /// The model output held by a response file. Files that are not a
    /// response item (bare model output from older runs) are returned as is.
    pub fn model_output(file_text: &str) -> String {
        match serde_json::from_str::<ResponseItem>(file_text.trim()) {
            Ok(item) => item.response,
            Err(_) => file_text.to_string(),
        }
    }
}

/// Stable prompt hash: first 16 bytes of SHA-256, hex encoded
pub fn fingerprint(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

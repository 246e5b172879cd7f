use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tracing::{debug, warn};

use crate::item::{PromptItem, ResponseItem};

const RESPONSE_PREFIX: &str = "response_";

/// A directory of JSON documents, one per drug. Disposable staging between
/// pipeline stages; the graph stays the system of record.
#[derive(Debug, Clone)]
pub struct WorkItemStore {
    dir: PathBuf,
}

impl WorkItemStore {
    /// Open a store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create work item directory: {:?}", dir))?;
        Ok(Self { dir })
    }

    /// Open an existing store without creating anything
    pub fn existing(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            anyhow::bail!("Invalid work item directory: {:?}", dir);
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prompt_path(&self, drugbank_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", drugbank_id))
    }

    pub fn response_path(&self, drugbank_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", RESPONSE_PREFIX, drugbank_id))
    }

    pub async fn save_prompt(&self, item: &PromptItem) -> Result<PathBuf> {
        let path = self.prompt_path(&item.drugbank_id);
        self.write_json(&path, item).await?;
        Ok(path)
    }

    pub async fn save_response(&self, item: &ResponseItem) -> Result<PathBuf> {
        let path = self.response_path(&item.drugbank_id);
        self.write_json(&path, item).await?;
        Ok(path)
    }

    /// Write any serializable document under an explicit file stem
    pub async fn save_named<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", stem));
        self.write_json(&path, value).await?;
        Ok(path)
    }

    pub fn contains_named(&self, stem: &str) -> bool {
        self.dir.join(format!("{}.json", stem)).is_file()
    }

    /// Whether a response for this drug already exists and was produced by
    /// the prompt with the given fingerprint
    pub async fn has_response_for(&self, drugbank_id: &str, fingerprint: &str) -> bool {
        let path = self.response_path(drugbank_id);
        let Ok(raw) = fs::read_to_string(&path).await else {
            return false;
        };
        match serde_json::from_str::<ResponseItem>(&raw) {
            Ok(existing) => existing.prompt_fingerprint.as_deref() == Some(fingerprint),
            Err(e) => {
                warn!(file = ?path, error = %e, "Existing response unreadable, will be replaced");
                false
            }
        }
    }

    /// All `*.json` files in the directory, sorted by file name
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read work item directory: {:?}", self.dir))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext == "json" {
                        files.push(path);
                    }
                }
            }
        }

        files.sort();
        debug!(dir = ?self.dir, files = files.len(), "Listed work items");
        Ok(files)
    }

    pub async fn load_prompt(&self, path: &Path) -> Result<PromptItem> {
        let raw = self.read_raw(path).await?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid prompt file: {:?}", path))
    }

    pub async fn read_raw(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write file: {:?}", path))
    }
}

/// Derive the drug identifier from a work item file name. The payload is
/// never consulted.
pub fn target_id_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.strip_prefix(RESPONSE_PREFIX).unwrap_or(stem).trim();

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Make a free-text name usable as a file stem
pub fn sanitize_file_stem(name: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let cleaned = non_word.replace_all(name, "");
    spaces.replace_all(cleaned.trim(), "_").to_string()
}

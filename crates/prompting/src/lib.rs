pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod schema;

pub use llm::{InferenceClient, InferenceError};
pub use normalizer::{NormalizeError, Payload, normalize};
pub use prompt::MAX_PROMPT_TOKENS;
pub use schema::{EnrichmentPayload, FieldError, PipelineKind, UnitAttributes};

use tracing::{debug, warn};

/// Renders units of work into prompts for one pipeline
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    kind: PipelineKind,
    max_tokens: usize,
}

impl PromptBuilder {
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind,
            max_tokens: MAX_PROMPT_TOKENS,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Build the prompt for one unit. Oversized prompts are still returned,
    /// only flagged in the log.
    pub fn build(&self, unit: &UnitAttributes) -> String {
        let prompt = prompt::build_prompt(self.kind, unit);

        let tokens = estimate_tokens(&prompt);
        if tokens > self.max_tokens {
            warn!(
                drug_id = %unit.drugbank_id,
                tokens,
                limit = self.max_tokens,
                "Prompt exceeds token budget"
            );
        } else {
            debug!(drug_id = %unit.drugbank_id, tokens, "Prompt built");
        }

        prompt
    }
}

/// Rough token estimate, ~1.3 tokens per word
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * 1.3) as usize
}

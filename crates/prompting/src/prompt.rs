use crate::schema::{PipelineKind, UnitAttributes};

/// Prompts above this estimate are logged, the model may truncate them
pub const MAX_PROMPT_TOKENS: usize = 8000;

const RATING_SCHEMA: &str = r#"{
  "reason_rating": "your reason here",
  "rating": number from 0 to 1
}"#;

const CLASSIFICATION_SCHEMA: &str = r#"{
  "Drug_Classification": "the single most important GO term, spelled exactly as listed"
}"#;

fn rating_preamble() -> String {
    format!(
        r#"You are a careful pharmaceutical scientist selecting drugs to repurpose for Alzheimer's disease.
Resources are strictly limited, so only the most promising drugs can be selected.

TASK:
Rate the drug below on a scale from 0 to 1. Higher means more promising, 1 is the maximum.
The drug affects biological processes that are associated with Alzheimer's disease.
Decide, based on the drug information, what impact the drug has on those processes and
whether the processes are specific enough to be targeted by a drug.
Only give high ratings to drugs that are very likely to succeed in treating Alzheimer's.

GUIDING QUESTIONS:
1. Are the biological processes the drug targets relevant for driving Alzheimer's?
2. Does the direction of the drug's impact on these processes prevent or cure Alzheimer's?
3. Is it highly likely that patients can take the drug to prevent or treat Alzheimer's?

Put your reasoning in "reason_rating".

OUTPUT SCHEMA:
{}

Always answer with JSON in exactly this format.

DRUG:
"#,
        RATING_SCHEMA
    )
}

fn rating_epilogue() -> String {
    format!(
        r#"
REMEMBER:
Only about 0.01 percent of the drugs you assess will be selected for further testing.
Base your reason on the information about the drug and the biological processes it impacts.
This is the mandatory form of your JSON output:
{}
Output ONLY this JSON object, no markdown, no explanations.
"#,
        RATING_SCHEMA
    )
}

fn classification_preamble() -> String {
    format!(
        r#"You classify medical drugs by the Gene Ontology (GO) process they mainly work on.

TASK:
You receive the name of a drug, a reason describing which biological process matters most
for it, and the list of GO processes the drug works on.
Repurposing is not your concern; the single most important GO process is.
Choose exactly one GO term from the list and spell it EXACTLY as given.

OUTPUT SCHEMA:
{}

Output only this JSON format and follow the spelling of the listed terms strictly.

DRUG:
"#,
        CLASSIFICATION_SCHEMA
    )
}

fn classification_epilogue() -> String {
    format!(
        r#"
REMEMBER:
Choose only one of the GO terms listed above, selected based on the reason, and return it
spelled exactly as listed.
This is the mandatory form of your JSON output:
{}
Output ONLY this JSON object, no markdown, no explanations.
"#,
        CLASSIFICATION_SCHEMA
    )
}

/// Render a unit of work into the full prompt text.
///
/// Layout: preamble with the output schema, the unit attributes as pretty
/// JSON, the affected processes (rating only), and an epilogue that repeats
/// the schema. Pure and deterministic.
pub fn build_prompt(kind: PipelineKind, unit: &UnitAttributes) -> String {
    let block = serde_json::to_string_pretty(&unit.render()).unwrap_or_else(|_| "{}".to_string());

    match kind {
        PipelineKind::Rating => {
            let mut prompt = rating_preamble();
            prompt.push_str(&block);
            prompt.push_str("\n\n");

            prompt.push_str(
                "These biological processes are associated with the drug and the Alzheimer's pathology:\n",
            );
            if unit.processes.is_empty() {
                prompt.push_str("- none recorded\n");
            }
            for process in &unit.processes {
                prompt.push_str(&format!("- {}\n", process));
            }

            prompt.push_str(&rating_epilogue());
            prompt
        }
        PipelineKind::GoClassification => {
            let mut prompt = classification_preamble();
            prompt.push_str(&block);
            prompt.push_str("\n");
            prompt.push_str(&classification_epilogue());
            prompt
        }
    }
}

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const INTERVIEWER_KEY: &str = "interviewer";
pub const REPORT_KEY: &str = "report";

/// Persona name the interviewer prompt introduces itself with.
pub const PERSONA: &str = "Lune";

/// Vocabulary hint passed to the input transcriber.
pub const TRANSCRIPTION_VOCABULARY: &str = "This is an interview about ChatGPT Enterprise usage at work. \
Vocabulary includes: ChatGPT Enterprise, prompts, GPTs, connectors, knowledge base, workspace, \
governance, compliance, policy, enablement, adoption, ROI, time saved, quality, accuracy, security.";

pub const DEFAULT_INTERVIEWER_PROMPT: &str = r#"You are "Lune", a calm and experienced qualitative interviewer running a one-to-one interview about how the participant uses ChatGPT Enterprise in their day-to-day work.

OPENING
- Introduce yourself in one sentence, explain the interview takes about fifteen minutes and that no confidential details are needed.
- End the opening with exactly: "Are you happy to continue?" and wait for the answer.

HOW TO INTERVIEW
- Ask one question at a time and keep your turns to one or two sentences.
- Start with their role, then spend most of the time on one concrete, recent example.
- For that example, make sure you learn the goal, how they used the result, and how they checked it was ready to share.
- When they mention impact, friction or a workaround, ask exactly one neutral follow-up.
- With permission, collect five 1-5 ratings: frequency of use, workflow fit, impact, barrier handling and enablement support.
- Never give advice, never defend the product and never ask for names, customer data or other sensitive information.
- If the audio is unclear, say so and ask them to repeat.

CLOSING
- Ask: "Is there anything else you'd like to add?"
- Then thank them and say that concludes the interview."#;

pub const DEFAULT_REPORT_PROMPT: &str = r#"You are generating a structured research report about ChatGPT Enterprise usage from an interview transcript.

Rules:
- Do not invent facts. If a field is not clearly supported by the transcript, set it to null, or ["Unknown"] for tools_used.
- Prefer verbatim evidence over inference and keep any interpretation conservative.
- tools_used may only contain: "ChatGPT (chat)", "Canvas", "Deep Research", "Custom GPTs", "API", "Voice", "Connectors".
- Ratings are numeric 1-5 and only filled when the participant gave a clear rating; otherwise null. Use the keys frequency, workflow_fit, impact, barrier_handling and enablement_support.
- The executive summary has 3-6 decision-useful bullets. Workflow steps are 3-6 concrete actions.
- Themes are short pattern statements, each supported by at least one quote in evidence or key_quotes.
- Provide 3-7 evidence quotes and 5-8 key quotes, each with a turn index or timestamp in "when".

Return the report in the exact structure required. Do not add top-level fields."#;

/// Loads every `*.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let entries = fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?;

    let mut prompts = HashMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
        prompts.insert(key, content);
    }
    Ok(prompts)
}

/// The two prompts the system runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    pub interviewer: String,
    pub report: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            interviewer: DEFAULT_INTERVIEWER_PROMPT.to_string(),
            report: DEFAULT_REPORT_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Reads prompts from `dir`, falling back to the built-in text for any
    /// prompt that is missing or blank, or when the directory is unreadable.
    pub fn load_or_default(dir: &Path) -> Self {
        let mut loaded = match load_prompts(dir) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("using built-in prompts: {:#}", e);
                HashMap::new()
            }
        };
        let mut take = |key: &str, default: &str| {
            loaded
                .remove(key)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            interviewer: take(INTERVIEWER_KEY, DEFAULT_INTERVIEWER_PROMPT),
            report: take(REPORT_KEY, DEFAULT_REPORT_PROMPT),
        }
    }
}

//! Structured report generation over the OpenAI Responses API.

use crate::report::ReportModel;
use crate::report_schema::response_format;
use crate::transcript::SnapshotTurn;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

pub const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
pub const MAX_OUTPUT_TOKENS: u32 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Missing OPENAI_API_KEY")]
    MissingApiKey,
    #[error("OpenAI request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("OpenAI error: {status} {body}")]
    Upstream { status: u16, body: String },
    #[error("OpenAI refusal: {0}")]
    Refusal(String),
    #[error("No text content in OpenAI response")]
    MissingText,
    #[error("Report is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        interview_id: &str,
        turns: &[SnapshotTurn],
    ) -> Result<ReportModel, ReportError>;
}

/// Runs `primary`, and `fallback` when the primary model fails.
/// The fallback's error is the one returned.
pub async fn generate_with_fallback(
    generator: &dyn ReportGenerator,
    primary: &str,
    fallback: &str,
    interview_id: &str,
    turns: &[SnapshotTurn],
) -> Result<ReportModel, ReportError> {
    match generator.generate(primary, interview_id, turns).await {
        Ok(report) => Ok(report),
        Err(e) => {
            tracing::warn!(
                interview_id = %interview_id,
                model = %primary,
                "Report generation failed on primary model: {}",
                e
            );
            generator.generate(fallback, interview_id, turns).await
        }
    }
}

/// Reasoning effort sent with the report request. This is the API's setting,
/// separate from the `meta.reasoning_effort` field the model fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl RequestEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestEffort::Minimal => "minimal",
            RequestEffort::Low => "low",
            RequestEffort::Medium => "medium",
            RequestEffort::High => "high",
        }
    }
}

impl std::str::FromStr for RequestEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(RequestEffort::Minimal),
            "low" => Ok(RequestEffort::Low),
            "medium" => Ok(RequestEffort::Medium),
            "high" => Ok(RequestEffort::High),
            other => Err(format!(
                "'{other}' is not one of minimal, low, medium, high"
            )),
        }
    }
}

/// Renders turns as the numbered list the report prompt expects.
pub fn format_transcript(turns: &[SnapshotTurn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(idx, turn)| format!("{}. [{}] {}", idx + 1, turn.role.as_str(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_request_body(
    model: &str,
    system_prompt: &str,
    reasoning_effort: RequestEffort,
    interview_id: &str,
    turns: &[SnapshotTurn],
) -> Value {
    let user_content = format!(
        "Interview ID: {}\nTranscript turns:\n{}",
        interview_id,
        format_transcript(turns)
    );
    json!({
        "model": model,
        "input": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_content }
        ],
        "text": { "format": response_format() },
        "reasoning": { "effort": reasoning_effort.as_str() },
        "max_output_tokens": MAX_OUTPUT_TOKENS,
        "stream": false
    })
}

/// Pulls the report out of a Responses API payload.
///
/// A refusal wins over everything. The first `output_text` part is parsed and
/// its error propagates; other text parts are used only if they parse. The
/// top-level `output_text` convenience field is the last resort.
pub fn extract_report(response: &Value) -> Result<ReportModel, ReportError> {
    let parts = response
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten();

    let mut candidate: Option<ReportModel> = None;
    for part in parts {
        let kind = part.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind == "refusal" {
            let reason = part
                .get("refusal")
                .or_else(|| part.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| part.to_string());
            return Err(ReportError::Refusal(reason));
        }
        let Some(text) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        if kind == "output_text" {
            return Ok(serde_json::from_str(text)?);
        }
        if candidate.is_none() {
            candidate = serde_json::from_str(text).ok();
        }
    }
    if let Some(report) = candidate {
        return Ok(report);
    }

    match response.get("output_text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(text)?),
        _ => Err(ReportError::MissingText),
    }
}

/// Generates reports with a strict JSON schema response format.
#[derive(Debug, Clone)]
pub struct OpenAiReportClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
    system_prompt: String,
    reasoning_effort: RequestEffort,
}

impl OpenAiReportClient {
    pub fn new(
        api_key: Option<SecretString>,
        system_prompt: String,
        reasoning_effort: RequestEffort,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint: RESPONSES_URL.to_string(),
            system_prompt,
            reasoning_effort,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl ReportGenerator for OpenAiReportClient {
    async fn generate(
        &self,
        model: &str,
        interview_id: &str,
        turns: &[SnapshotTurn],
    ) -> Result<ReportModel, ReportError> {
        let api_key = self.api_key.as_ref().ok_or(ReportError::MissingApiKey)?;
        let body = build_request_body(
            model,
            &self.system_prompt,
            self.reasoning_effort,
            interview_id,
            turns,
        );

        tracing::info!(
            interview_id = %interview_id,
            model = %model,
            turns = turns.len(),
            "requesting report"
        );
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .header("OpenAI-Beta", "responses=v1")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        extract_report(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_model;
    use crate::transcript::Role;

    fn turns() -> Vec<SnapshotTurn> {
        vec![
            SnapshotTurn::new(Role::Interviewer, "Hi, are you happy to continue?"),
            SnapshotTurn::new(Role::Participant, "Yes"),
        ]
    }

    fn report_text() -> String {
        serde_json::to_string(&sample_model()).unwrap()
    }

    #[test]
    fn test_format_transcript_numbers_turns_with_roles() {
        assert_eq!(
            format_transcript(&turns()),
            "1. [assistant] Hi, are you happy to continue?\n2. [user] Yes"
        );
    }

    #[test]
    fn test_request_body_carries_schema_and_limits() {
        let body = build_request_body("gpt-5.2", "Be careful.", RequestEffort::High, "iv-9", &turns());

        assert_eq!(body["model"], "gpt-5.2");
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][0]["content"], "Be careful.");
        let user = body["input"][1]["content"].as_str().unwrap();
        assert!(user.starts_with("Interview ID: iv-9\nTranscript turns:\n1. [assistant]"));
        assert_eq!(body["text"]["format"]["name"], "interview_report");
        assert_eq!(body["text"]["format"]["strict"], true);
        assert_eq!(body["reasoning"]["effort"], "high");
        assert_eq!(body["max_output_tokens"], 2000);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_request_effort_accepts_every_api_level() {
        for (raw, expected) in [
            ("minimal", RequestEffort::Minimal),
            (" Low ", RequestEffort::Low),
            ("medium", RequestEffort::Medium),
            ("HIGH", RequestEffort::High),
        ] {
            assert_eq!(raw.parse::<RequestEffort>(), Ok(expected));
        }
        let body = build_request_body("gpt-5-mini", "p", RequestEffort::Low, "iv-1", &turns());
        assert_eq!(body["reasoning"]["effort"], "low");

        let err = "extreme".parse::<RequestEffort>().unwrap_err();
        assert_eq!(err, "'extreme' is not one of minimal, low, medium, high");
    }

    #[test]
    fn test_extract_report_from_output_text_part() {
        let response = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [{ "type": "output_text", "text": report_text() }] }
            ]
        });
        assert_eq!(extract_report(&response).unwrap(), sample_model());
    }

    #[test]
    fn test_extract_report_refusal_is_an_error() {
        let response = json!({
            "output": [{ "content": [{ "type": "refusal", "refusal": "cannot help" }] }]
        });
        let err = extract_report(&response).unwrap_err();
        assert_eq!(err.to_string(), "OpenAI refusal: cannot help");
    }

    #[test]
    fn test_extract_report_invalid_output_text_propagates_parse_error() {
        let response = json!({
            "output": [{ "content": [{ "type": "output_text", "text": "not json" }] }]
        });
        assert!(matches!(extract_report(&response), Err(ReportError::Parse(_))));
    }

    #[test]
    fn test_extract_report_falls_back_to_other_text_then_top_level() {
        let other = json!({
            "output": [{ "content": [
                { "type": "text", "text": "noise" },
                { "type": "text", "text": report_text() }
            ] }]
        });
        assert_eq!(extract_report(&other).unwrap(), sample_model());

        let top_level = json!({ "output": [], "output_text": report_text() });
        assert_eq!(extract_report(&top_level).unwrap(), sample_model());
    }

    #[test]
    fn test_extract_report_without_text_is_missing_text() {
        let response = json!({ "output": [], "output_text": "   " });
        assert!(matches!(extract_report(&response), Err(ReportError::MissingText)));
        assert!(matches!(extract_report(&json!({})), Err(ReportError::MissingText)));
    }

    #[tokio::test]
    async fn test_client_without_key_fails_before_network() {
        let client = OpenAiReportClient::new(None, "prompt".to_string(), RequestEffort::Medium)
            .with_endpoint("http://127.0.0.1:9/unreachable");
        let err = client.generate("gpt-5.2", "iv-1", &turns()).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing OPENAI_API_KEY");
    }

    #[tokio::test]
    async fn test_fallback_not_used_when_primary_succeeds() {
        // Arrange
        let mut generator = MockReportGenerator::new();
        generator
            .expect_generate()
            .withf(|model, id, turns| model.to_string() == "primary" && id.to_string() == "iv-1" && turns.len() == 2)
            .times(1)
            .returning(|_, _, _| Ok(sample_model()));

        // Act
        let report = generate_with_fallback(&generator, "primary", "fallback", "iv-1", &turns()).await;

        // Assert
        assert_eq!(report.unwrap(), sample_model());
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_fails() {
        let mut generator = MockReportGenerator::new();
        generator
            .expect_generate()
            .withf(|model, _, _| model.to_string() == "primary")
            .times(1)
            .returning(|_, _, _| Err(ReportError::MissingText));
        generator
            .expect_generate()
            .withf(|model, _, _| model.to_string() == "fallback")
            .times(1)
            .returning(|_, _, _| Ok(sample_model()));

        let report = generate_with_fallback(&generator, "primary", "fallback", "iv-1", &turns()).await;

        assert_eq!(report.unwrap(), sample_model());
    }

    #[tokio::test]
    async fn test_fallback_error_is_returned_when_both_fail() {
        let mut generator = MockReportGenerator::new();
        generator
            .expect_generate()
            .withf(|model, _, _| model.to_string() == "primary")
            .times(1)
            .returning(|_, _, _| Err(ReportError::MissingText));
        generator
            .expect_generate()
            .withf(|model, _, _| model.to_string() == "fallback")
            .times(1)
            .returning(|_, _, _| Err(ReportError::Refusal("no".to_string())));

        let err = generate_with_fallback(&generator, "primary", "fallback", "iv-1", &turns())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "OpenAI refusal: no");
    }
}

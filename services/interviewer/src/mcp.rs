use lune_core::generator::{ReportGenerator, generate_with_fallback};
use lune_core::prompts::Prompts;
use lune_core::transcript::{Role, SnapshotTurn};
use rmcp::schemars::{self, JsonSchema};
use rmcp::{
    ErrorData as McpError, ServerHandler, handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters, model::*, tool, tool_handler, tool_router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const UNKNOWN_INTERVIEW: &str = "unknown";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TranscriptLine {
    #[schemars(description = "Speaker: interviewer/assistant or participant/user")]
    pub role: String,
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateReportParams {
    #[serde(default)]
    pub interview_id: Option<String>,
    #[schemars(description = "Transcript turns in spoken order. Must not be empty.")]
    pub transcripts: Vec<TranscriptLine>,
}

impl GenerateReportParams {
    fn interview_id(&self) -> &str {
        self.interview_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_INTERVIEW)
    }

    fn turns(&self) -> Result<Vec<SnapshotTurn>, McpError> {
        if self.transcripts.is_empty() {
            return Err(McpError::invalid_params("transcripts must not be empty", None));
        }
        self.transcripts
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let text = line.text.trim();
                if text.is_empty() {
                    return Err(McpError::invalid_params(
                        format!("transcripts[{}].text must not be empty", index),
                        None,
                    ));
                }
                let role = serde_json::from_value::<Role>(Value::String(line.role.trim().to_lowercase()))
                    .map_err(|_| {
                        McpError::invalid_params(
                            format!("transcripts[{}].role '{}' is not a known speaker", index, line.role),
                            None,
                        )
                    })?;
                Ok(SnapshotTurn::new(role, text))
            })
            .collect()
    }
}

/// Exposes the interviewer prompt and report generation as MCP tools.
#[derive(Clone)]
pub struct InterviewMcpServer {
    prompts: Prompts,
    generator: Arc<dyn ReportGenerator>,
    primary_model: String,
    fallback_model: String,
    tool_router: ToolRouter<Self>,
}

impl InterviewMcpServer {
    pub fn new(
        prompts: Prompts,
        generator: Arc<dyn ReportGenerator>,
        primary_model: &str,
        fallback_model: &str,
    ) -> Self {
        Self {
            prompts,
            generator,
            primary_model: primary_model.to_string(),
            fallback_model: fallback_model.to_string(),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl InterviewMcpServer {
    #[tool(
        description = "Returns the system prompt the interviewer persona runs with.",
        annotations(read_only_hint = true, open_world_hint = false)
    )]
    async fn get_interviewer_prompt(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            self.prompts.interviewer.trim().to_string(),
        )]))
    }

    #[tool(
        description = "Generates the structured interview report from transcript turns. Provide the turns in order.",
        annotations(read_only_hint = true, open_world_hint = true)
    )]
    async fn generate_report(
        &self,
        Parameters(params): Parameters<GenerateReportParams>,
    ) -> Result<CallToolResult, McpError> {
        let turns = params.turns()?;
        let interview_id = params.interview_id();
        tracing::info!(interview_id = %interview_id, turns = turns.len(), "generating report over MCP");

        let report = generate_with_fallback(
            self.generator.as_ref(),
            &self.primary_model,
            &self.fallback_model,
            interview_id,
            &turns,
        )
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![
            Content::text("Report generated."),
            Content::text(body),
        ]))
    }
}

#[tool_handler]
impl ServerHandler for InterviewMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Interview tools: fetch the interviewer prompt or turn a transcript into a structured report."
                    .into(),
            ),
            ..Default::default()
        }
    }
}

use lune_core::transcript::SnapshotTurn;
use serde::Serialize;
use serde_json::Value;

const FALLBACK_ERROR: &str = "Failed to finalize interview.";

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("No transcript turns to finalize")]
    EmptyTranscript,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The API answered with a non-2xx status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

#[derive(Serialize)]
struct FinalizeBody<'a> {
    transcripts: Vec<&'a SnapshotTurn>,
}

/// Posts the final transcript of one interview to the interview API.
#[derive(Debug, Clone)]
pub struct FinalizeClient {
    http: reqwest::Client,
    base_url: String,
}

impl FinalizeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, interview_id: &str) -> String {
        format!("{}/api/interviews/{}/finalize", self.base_url, interview_id)
    }

    /// Returns the API's response body, which carries the generated report.
    pub async fn finalize(
        &self,
        interview_id: &str,
        turns: &[SnapshotTurn],
    ) -> Result<Value, FinalizeError> {
        let body = FinalizeBody {
            transcripts: turns.iter().filter(|t| !t.text.trim().is_empty()).collect(),
        };
        if body.transcripts.is_empty() {
            return Err(FinalizeError::EmptyTranscript);
        }

        tracing::info!(
            interview_id = %interview_id,
            turns = body.transcripts.len(),
            "finalizing interview"
        );
        let response = self.http.post(self.url(interview_id)).json(&body).send().await?;
        let status = response.status();
        let data = response.json::<Value>().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(FALLBACK_ERROR)
                .to_string();
            return Err(FinalizeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use lune_core::transcript::Role;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn turns() -> Vec<SnapshotTurn> {
        vec![
            SnapshotTurn::new(Role::Interviewer, "What's your role?"),
            SnapshotTurn::new(Role::Participant, "   "),
            SnapshotTurn::new(Role::Participant, "I'm a CSM"),
        ]
    }

    #[test]
    fn test_url_ignores_trailing_slash() {
        let client = FinalizeClient::new("http://localhost:3000/");
        assert_eq!(
            client.url("iv-1"),
            "http://localhost:3000/api/interviews/iv-1/finalize"
        );
    }

    #[tokio::test]
    async fn test_posts_non_empty_turns() {
        let app = Router::new().route(
            "/api/interviews/{id}/finalize",
            post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({ "ok": true, "id": id, "received": body }))
            }),
        );
        let client = FinalizeClient::new(&serve(app).await);

        let response = client.finalize("iv-1", &turns()).await.unwrap();

        assert_eq!(response["id"], "iv-1");
        let sent = response["received"]["transcripts"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["role"], "assistant");
        assert_eq!(sent[1]["text"], "I'm a CSM");
    }

    #[tokio::test]
    async fn test_error_message_from_body() {
        let app = Router::new().route(
            "/api/interviews/{id}/finalize",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "report_status": "failed", "error": "OpenAI error: 500" })),
                )
            }),
        );
        let client = FinalizeClient::new(&serve(app).await);

        let err = client.finalize("iv-1", &turns()).await.unwrap_err();

        assert!(matches!(err, FinalizeError::Rejected { status: 500, .. }));
        assert_eq!(err.to_string(), "OpenAI error: 500");
    }

    #[tokio::test]
    async fn test_generic_error_without_body() {
        let app = Router::new().route(
            "/api/interviews/{id}/finalize",
            post(|| async { StatusCode::BAD_GATEWAY }),
        );
        let client = FinalizeClient::new(&serve(app).await);

        let err = client.finalize("iv-1", &turns()).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to finalize interview.");
    }

    #[tokio::test]
    async fn test_empty_transcript_is_not_sent() {
        let client = FinalizeClient::new("http://127.0.0.1:9");
        let blank = vec![SnapshotTurn::new(Role::Participant, " ")];

        let err = client.finalize("iv-1", &blank).await.unwrap_err();

        assert!(matches!(err, FinalizeError::EmptyTranscript));
    }
}

use serde_json::{Value, json};

pub const SCHEMA_NAME: &str = "interview_report";

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn quote_list() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "additionalProperties": false,
            "required": ["when", "quote", "topic"],
            "properties": {
                "when": { "type": "string" },
                "quote": { "type": "string" },
                "topic": { "type": "string" }
            }
        }
    })
}

/// JSON schema handed to the model as a strict structured-output format.
/// Mirrors [`crate::report::ReportModel`].
pub fn report_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "meta", "exec_summary", "use_case", "ratings", "themes",
            "evidence", "quality", "tools_used", "key_quotes"
        ],
        "properties": {
            "meta": {
                "type": "object",
                "additionalProperties": false,
                "required": ["interview_id", "generated_at_iso", "model", "reasoning_effort"],
                "properties": {
                    "interview_id": { "type": "string" },
                    "generated_at_iso": { "type": "string" },
                    "model": { "type": "string" },
                    "reasoning_effort": { "type": "string", "enum": ["medium", "high", "unknown"] }
                }
            },
            "exec_summary": {
                "type": "object",
                "additionalProperties": false,
                "required": ["bullets", "overall_sentiment"],
                "properties": {
                    "bullets": string_list(),
                    "overall_sentiment": {
                        "type": "string",
                        "enum": ["positive", "mixed", "negative", "unknown"]
                    }
                }
            },
            "use_case": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "title", "goal", "workflow_steps", "chatgpt_enterprise_role",
                    "outcome_positive", "outcome_negative"
                ],
                "properties": {
                    "title": { "type": "string" },
                    "goal": { "type": ["string", "null"] },
                    "workflow_steps": string_list(),
                    "chatgpt_enterprise_role": { "type": ["string", "null"] },
                    "outcome_positive": string_list(),
                    "outcome_negative": string_list()
                }
            },
            "ratings": {
                "type": "object",
                "additionalProperties": false,
                "required": ["dimensions", "notes"],
                "properties": {
                    "dimensions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["key", "label", "value"],
                            "properties": {
                                "key": { "type": "string" },
                                "label": { "type": "string" },
                                "value": { "type": ["number", "null"] }
                            }
                        }
                    },
                    "notes": { "type": ["string", "null"] }
                }
            },
            "tools_used": string_list(),
            "themes": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "wins", "blockers", "feature_requests", "enablement_needs", "risks_or_caveats"
                ],
                "properties": {
                    "wins": string_list(),
                    "blockers": string_list(),
                    "feature_requests": string_list(),
                    "enablement_needs": string_list(),
                    "risks_or_caveats": string_list()
                }
            },
            "key_quotes": quote_list(),
            "evidence": {
                "type": "object",
                "additionalProperties": false,
                "required": ["quotes"],
                "properties": { "quotes": quote_list() }
            },
            "quality": {
                "type": "object",
                "additionalProperties": false,
                "required": ["transcript_quality", "ambiguity_notes"],
                "properties": {
                    "transcript_quality": {
                        "type": "string",
                        "enum": ["good", "mixed", "poor", "unknown"]
                    },
                    "ambiguity_notes": string_list()
                }
            }
        }
    })
}

/// The `text.format` block of a Responses API request.
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "name": SCHEMA_NAME,
        "strict": true,
        "schema": report_schema()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_model;

    fn sorted_keys(value: &Value) -> Vec<String> {
        let mut keys: Vec<String> = value
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn sorted_strings(value: &Value) -> Vec<String> {
        let mut items: Vec<String> = value
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        items.sort();
        items
    }

    #[test]
    fn test_schema_requires_every_model_field() {
        let schema = report_schema();
        let model = serde_json::to_value(sample_model()).unwrap();

        assert_eq!(sorted_strings(&schema["required"]), sorted_keys(&model));
        for section in ["meta", "exec_summary", "use_case", "ratings", "themes", "evidence", "quality"] {
            let properties = &schema["properties"][section];
            assert_eq!(
                sorted_strings(&properties["required"]),
                sorted_keys(&model[section]),
                "section {section}"
            );
            assert_eq!(properties["additionalProperties"], false);
        }
    }

    #[test]
    fn test_response_format_is_strict_and_named() {
        let format = response_format();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["name"], "interview_report");
        assert_eq!(format["strict"], true);
    }
}

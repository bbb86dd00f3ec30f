//! The structured interview report and its override patches.
//!
//! [`ReportModel`] is what the generator returns and is stored once.
//! [`ReportPatch`] is the sparse set of human edits layered on top of it; the
//! final view is always `model.merge(&overrides)` and is never stored.

use crate::merge::{self, Merge, PatchError, combine, double_option, later, leaf, present, section};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Mixed,
    Negative,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptQuality {
    Good,
    Mixed,
    Poor,
    Unknown,
}

/// Keys of the five rating dimensions, in display order.
pub const RATING_KEYS: [&str; 5] = [
    "frequency",
    "workflow_fit",
    "impact",
    "barrier_handling",
    "enablement_support",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub meta: Meta,
    pub exec_summary: ExecSummary,
    pub use_case: UseCase,
    pub ratings: Ratings,
    pub tools_used: Vec<String>,
    pub themes: Themes,
    pub key_quotes: Vec<Quote>,
    pub evidence: Evidence,
    pub quality: Quality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub interview_id: String,
    pub generated_at_iso: String,
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecSummary {
    pub bullets: Vec<String>,
    pub overall_sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCase {
    pub title: String,
    pub goal: Option<String>,
    pub workflow_steps: Vec<String>,
    pub chatgpt_enterprise_role: Option<String>,
    pub outcome_positive: Vec<String>,
    pub outcome_negative: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    pub dimensions: Vec<RatingDimension>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDimension {
    pub key: String,
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Themes {
    pub wins: Vec<String>,
    pub blockers: Vec<String>,
    pub feature_requests: Vec<String>,
    pub enablement_needs: Vec<String>,
    pub risks_or_caveats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub when: String,
    pub quote: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub quotes: Vec<Quote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub transcript_quality: TranscriptQuality,
    pub ambiguity_notes: Vec<String>,
}

/// Sparse human edits to a [`ReportModel`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<MetaPatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub exec_summary: Option<ExecSummaryPatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_case: Option<UseCasePatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub ratings: Option<RatingsPatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub tools_used: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub themes: Option<ThemesPatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub key_quotes: Option<Vec<Quote>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub evidence: Option<EvidencePatch>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub quality: Option<QualityPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub interview_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_at_iso: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecSummaryPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub bullets: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub overall_sentiment: Option<Sentiment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseCasePatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub goal: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub workflow_steps: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub chatgpt_enterprise_role: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub outcome_positive: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub outcome_negative: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatingsPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub dimensions: Option<Vec<RatingDimension>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemesPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub wins: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub blockers: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub feature_requests: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub enablement_needs: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub risks_or_caveats: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidencePatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub quotes: Option<Vec<Quote>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityPatch {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub transcript_quality: Option<TranscriptQuality>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub ambiguity_notes: Option<Vec<String>>,
}

impl Merge for ReportModel {
    type Patch = ReportPatch;

    fn merge(&self, patch: &ReportPatch) -> Self {
        Self {
            meta: section(&self.meta, &patch.meta),
            exec_summary: section(&self.exec_summary, &patch.exec_summary),
            use_case: section(&self.use_case, &patch.use_case),
            ratings: section(&self.ratings, &patch.ratings),
            tools_used: leaf(&self.tools_used, &patch.tools_used),
            themes: section(&self.themes, &patch.themes),
            key_quotes: leaf(&self.key_quotes, &patch.key_quotes),
            evidence: section(&self.evidence, &patch.evidence),
            quality: section(&self.quality, &patch.quality),
        }
    }
}

impl Merge for ReportPatch {
    type Patch = ReportPatch;

    fn merge(&self, newer: &ReportPatch) -> Self {
        Self {
            meta: combine(&self.meta, &newer.meta),
            exec_summary: combine(&self.exec_summary, &newer.exec_summary),
            use_case: combine(&self.use_case, &newer.use_case),
            ratings: combine(&self.ratings, &newer.ratings),
            tools_used: later(&self.tools_used, &newer.tools_used),
            themes: combine(&self.themes, &newer.themes),
            key_quotes: later(&self.key_quotes, &newer.key_quotes),
            evidence: combine(&self.evidence, &newer.evidence),
            quality: combine(&self.quality, &newer.quality),
        }
    }
}

impl Merge for Meta {
    type Patch = MetaPatch;

    fn merge(&self, patch: &MetaPatch) -> Self {
        Self {
            interview_id: leaf(&self.interview_id, &patch.interview_id),
            generated_at_iso: leaf(&self.generated_at_iso, &patch.generated_at_iso),
            model: leaf(&self.model, &patch.model),
            reasoning_effort: leaf(&self.reasoning_effort, &patch.reasoning_effort),
        }
    }
}

impl Merge for MetaPatch {
    type Patch = MetaPatch;

    fn merge(&self, newer: &MetaPatch) -> Self {
        Self {
            interview_id: later(&self.interview_id, &newer.interview_id),
            generated_at_iso: later(&self.generated_at_iso, &newer.generated_at_iso),
            model: later(&self.model, &newer.model),
            reasoning_effort: later(&self.reasoning_effort, &newer.reasoning_effort),
        }
    }
}

impl Merge for ExecSummary {
    type Patch = ExecSummaryPatch;

    fn merge(&self, patch: &ExecSummaryPatch) -> Self {
        Self {
            bullets: leaf(&self.bullets, &patch.bullets),
            overall_sentiment: leaf(&self.overall_sentiment, &patch.overall_sentiment),
        }
    }
}

impl Merge for ExecSummaryPatch {
    type Patch = ExecSummaryPatch;

    fn merge(&self, newer: &ExecSummaryPatch) -> Self {
        Self {
            bullets: later(&self.bullets, &newer.bullets),
            overall_sentiment: later(&self.overall_sentiment, &newer.overall_sentiment),
        }
    }
}

impl Merge for UseCase {
    type Patch = UseCasePatch;

    fn merge(&self, patch: &UseCasePatch) -> Self {
        Self {
            title: leaf(&self.title, &patch.title),
            goal: leaf(&self.goal, &patch.goal),
            workflow_steps: leaf(&self.workflow_steps, &patch.workflow_steps),
            chatgpt_enterprise_role: leaf(
                &self.chatgpt_enterprise_role,
                &patch.chatgpt_enterprise_role,
            ),
            outcome_positive: leaf(&self.outcome_positive, &patch.outcome_positive),
            outcome_negative: leaf(&self.outcome_negative, &patch.outcome_negative),
        }
    }
}

impl Merge for UseCasePatch {
    type Patch = UseCasePatch;

    fn merge(&self, newer: &UseCasePatch) -> Self {
        Self {
            title: later(&self.title, &newer.title),
            goal: later(&self.goal, &newer.goal),
            workflow_steps: later(&self.workflow_steps, &newer.workflow_steps),
            chatgpt_enterprise_role: later(
                &self.chatgpt_enterprise_role,
                &newer.chatgpt_enterprise_role,
            ),
            outcome_positive: later(&self.outcome_positive, &newer.outcome_positive),
            outcome_negative: later(&self.outcome_negative, &newer.outcome_negative),
        }
    }
}

impl Merge for Ratings {
    type Patch = RatingsPatch;

    fn merge(&self, patch: &RatingsPatch) -> Self {
        Self {
            dimensions: leaf(&self.dimensions, &patch.dimensions),
            notes: leaf(&self.notes, &patch.notes),
        }
    }
}

impl Merge for RatingsPatch {
    type Patch = RatingsPatch;

    fn merge(&self, newer: &RatingsPatch) -> Self {
        Self {
            dimensions: later(&self.dimensions, &newer.dimensions),
            notes: later(&self.notes, &newer.notes),
        }
    }
}

impl Merge for Themes {
    type Patch = ThemesPatch;

    fn merge(&self, patch: &ThemesPatch) -> Self {
        Self {
            wins: leaf(&self.wins, &patch.wins),
            blockers: leaf(&self.blockers, &patch.blockers),
            feature_requests: leaf(&self.feature_requests, &patch.feature_requests),
            enablement_needs: leaf(&self.enablement_needs, &patch.enablement_needs),
            risks_or_caveats: leaf(&self.risks_or_caveats, &patch.risks_or_caveats),
        }
    }
}

impl Merge for ThemesPatch {
    type Patch = ThemesPatch;

    fn merge(&self, newer: &ThemesPatch) -> Self {
        Self {
            wins: later(&self.wins, &newer.wins),
            blockers: later(&self.blockers, &newer.blockers),
            feature_requests: later(&self.feature_requests, &newer.feature_requests),
            enablement_needs: later(&self.enablement_needs, &newer.enablement_needs),
            risks_or_caveats: later(&self.risks_or_caveats, &newer.risks_or_caveats),
        }
    }
}

impl Merge for Evidence {
    type Patch = EvidencePatch;

    fn merge(&self, patch: &EvidencePatch) -> Self {
        Self {
            quotes: leaf(&self.quotes, &patch.quotes),
        }
    }
}

impl Merge for EvidencePatch {
    type Patch = EvidencePatch;

    fn merge(&self, newer: &EvidencePatch) -> Self {
        Self {
            quotes: later(&self.quotes, &newer.quotes),
        }
    }
}

impl Merge for Quality {
    type Patch = QualityPatch;

    fn merge(&self, patch: &QualityPatch) -> Self {
        Self {
            transcript_quality: leaf(&self.transcript_quality, &patch.transcript_quality),
            ambiguity_notes: leaf(&self.ambiguity_notes, &patch.ambiguity_notes),
        }
    }
}

impl Merge for QualityPatch {
    type Patch = QualityPatch;

    fn merge(&self, newer: &QualityPatch) -> Self {
        Self {
            transcript_quality: later(&self.transcript_quality, &newer.transcript_quality),
            ambiguity_notes: later(&self.ambiguity_notes, &newer.ambiguity_notes),
        }
    }
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parses a PATCH body.
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        merge::parse_patch(value)
    }

    /// Builds the minimal patch that sets the single leaf at `path`.
    pub fn at_path(path: &[&str], value: Value) -> Result<Self, PatchError> {
        if path.is_empty() {
            return Err(PatchError::InvalidShape("empty path".to_string()));
        }
        merge::parse_patch(merge::nest_at_path(path, value))
    }
}

/// Convenience for [`ReportPatch::at_path`].
pub fn patch_at_path(path: &[&str], value: Value) -> Result<ReportPatch, PatchError> {
    ReportPatch::at_path(path, value)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn quote(when: &str, quote: &str, topic: &str) -> Quote {
        Quote {
            when: when.to_string(),
            quote: quote.to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn sample_model() -> ReportModel {
        ReportModel {
            meta: Meta {
                interview_id: "iv-1".to_string(),
                generated_at_iso: "2026-01-01T00:00:00.000Z".to_string(),
                model: "gpt-5.2".to_string(),
                reasoning_effort: ReasoningEffort::Medium,
            },
            exec_summary: ExecSummary {
                bullets: vec!["Uses ChatGPT Enterprise for follow-up emails".to_string()],
                overall_sentiment: Sentiment::Positive,
            },
            use_case: UseCase {
                title: "Customer follow-ups".to_string(),
                goal: Some("Same-day follow-ups".to_string()),
                workflow_steps: vec!["Paste notes".to_string(), "Edit draft".to_string()],
                chatgpt_enterprise_role: Some("Drafting".to_string()),
                outcome_positive: vec!["Faster turnaround".to_string()],
                outcome_negative: vec![],
            },
            ratings: Ratings {
                dimensions: RATING_KEYS
                    .iter()
                    .map(|key| RatingDimension {
                        key: key.to_string(),
                        label: key.replace('_', " "),
                        value: Some(4.0),
                    })
                    .collect(),
                notes: Some("from model".to_string()),
            },
            tools_used: vec!["ChatGPT (chat)".to_string()],
            themes: Themes {
                wins: vec!["Saves time".to_string()],
                blockers: vec![],
                feature_requests: vec!["CRM connector".to_string()],
                enablement_needs: vec![],
                risks_or_caveats: vec!["Sanitises customer names".to_string()],
            },
            key_quotes: vec![quote("4", "I'm a CSM", "Use case")],
            evidence: Evidence {
                quotes: vec![quote("4", "I'm a CSM", "Use case")],
            },
            quality: Quality {
                transcript_quality: TranscriptQuality::Good,
                ambiguity_notes: vec![],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> ReportPatch {
        ReportPatch::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let base = sample_model();
        assert_eq!(base.merge(&ReportPatch::default()), base);
        assert_eq!(base.merge(&patch(json!({}))), base);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = sample_model();
        let edits = patch(json!({
            "use_case": { "title": "Renewal prep", "goal": null },
            "tools_used": ["Canvas"],
            "ratings": { "notes": "updated" }
        }));

        let once = base.merge(&edits);
        assert_eq!(once.merge(&edits), once);
    }

    #[test]
    fn test_merge_leaves_base_untouched() {
        let base = sample_model();
        let copy = base.clone();
        let _ = base.merge(&patch(json!({ "themes": { "wins": [] } })));
        assert_eq!(base, copy);
    }

    #[test]
    fn test_absent_fields_are_preserved() {
        let base = sample_model();
        let merged = base.merge(&patch(json!({ "use_case": { "title": "New title" } })));

        assert_eq!(merged.use_case.title, "New title");
        assert_eq!(merged.use_case.goal, base.use_case.goal);
        assert_eq!(merged.use_case.workflow_steps, base.use_case.workflow_steps);
        assert_eq!(merged.ratings, base.ratings);
        assert_eq!(merged.evidence, base.evidence);
        assert_eq!(merged.meta, base.meta);
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let base = sample_model();
        let merged = base.merge(&patch(json!({
            "use_case": { "workflow_steps": ["Only step"] },
            "ratings": { "dimensions": [{ "key": "impact", "label": "Impact", "value": null }] }
        })));

        assert_eq!(merged.use_case.workflow_steps, vec!["Only step".to_string()]);
        assert_eq!(merged.ratings.dimensions.len(), 1);
        assert_eq!(merged.ratings.dimensions[0].value, None);
        assert_eq!(merged.ratings.notes, base.ratings.notes);
    }

    #[test]
    fn test_null_clears_nullable_leaf_while_absent_keeps_it() {
        let base = sample_model();
        let cleared = base.merge(&patch(json!({ "use_case": { "goal": null } })));
        assert_eq!(cleared.use_case.goal, None);
        assert_eq!(
            cleared.use_case.chatgpt_enterprise_role,
            base.use_case.chatgpt_enterprise_role
        );

        let untouched = base.merge(&patch(json!({ "use_case": {} })));
        assert_eq!(untouched.use_case.goal, base.use_case.goal);
    }

    #[test]
    fn test_sequential_patches_match_combined_patch() {
        let base = sample_model();
        let p1 = patch(json!({
            "use_case": { "title": "First", "goal": "Goal one" },
            "ratings": { "notes": "first" },
            "themes": { "wins": ["a"] }
        }));
        let p2 = patch(json!({
            "use_case": { "goal": null },
            "ratings": { "notes": "second" },
            "quality": { "transcript_quality": "mixed" }
        }));

        let sequential = base.merge(&p1).merge(&p2);
        let combined = base.merge(&p1.merge(&p2));

        assert_eq!(sequential, combined);
        assert_eq!(sequential.use_case.title, "First");
        assert_eq!(sequential.use_case.goal, None);
        assert_eq!(sequential.ratings.notes.as_deref(), Some("second"));
        assert_eq!(sequential.themes.wins, vec!["a".to_string()]);
        assert_eq!(sequential.quality.transcript_quality, TranscriptQuality::Mixed);
    }

    #[test]
    fn test_patch_combination_is_idempotent_and_sparse() {
        let p = patch(json!({ "ratings": { "notes": "updated" } }));
        assert_eq!(p.merge(&p), p);
        assert_eq!(
            serde_json::to_value(ReportPatch::default().merge(&p)).unwrap(),
            json!({ "ratings": { "notes": "updated" } })
        );
        assert_eq!(serde_json::to_value(ReportPatch::default()).unwrap(), json!({}));
        assert!(ReportPatch::default().is_empty());
    }

    #[test]
    fn test_ratings_notes_patch_keeps_dimensions() {
        let base = sample_model();
        let overrides = ReportPatch::default().merge(&patch(json!({ "ratings": { "notes": "updated" } })));

        let final_report = base.merge(&overrides);

        assert_eq!(
            serde_json::to_value(&overrides).unwrap(),
            json!({ "ratings": { "notes": "updated" } })
        );
        assert_eq!(final_report.ratings.dimensions, base.ratings.dimensions);
        assert_eq!(final_report.ratings.notes.as_deref(), Some("updated"));
    }

    #[test]
    fn test_patch_at_path_sets_single_leaf() {
        let edit = patch_at_path(&["ratings", "notes"], json!("updated")).unwrap();
        assert_eq!(edit, patch(json!({ "ratings": { "notes": "updated" } })));

        let cleared = patch_at_path(&["use_case", "goal"], Value::Null).unwrap();
        assert_eq!(sample_model().merge(&cleared).use_case.goal, None);
    }

    #[test]
    fn test_patch_at_path_rejects_unknown_or_mistyped_paths() {
        assert!(matches!(
            patch_at_path(&["ratings", "stars"], json!(5)),
            Err(PatchError::InvalidShape(_))
        ));
        assert!(matches!(
            patch_at_path(&["tools_used"], json!("Canvas")),
            Err(PatchError::InvalidShape(_))
        ));
        assert!(patch_at_path(&[], json!({})).is_err());
    }

    #[test]
    fn test_invalid_payloads_are_rejected() {
        assert_eq!(
            ReportPatch::from_value(json!("text")),
            Err(PatchError::NotAnObject)
        );
        assert!(matches!(
            ReportPatch::from_value(json!({ "unknown_section": {} })),
            Err(PatchError::InvalidShape(_))
        ));
        assert!(matches!(
            ReportPatch::from_value(json!({ "quality": { "transcript_quality": "great" } })),
            Err(PatchError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_null_on_required_leaf_is_rejected() {
        for payload in [
            json!({ "use_case": { "title": null } }),
            json!({ "tools_used": null }),
            json!({ "exec_summary": { "overall_sentiment": null } }),
            json!({ "ratings": null }),
        ] {
            assert!(
                matches!(ReportPatch::from_value(payload.clone()), Err(PatchError::InvalidShape(_))),
                "{payload}"
            );
        }
        assert!(matches!(
            patch_at_path(&["use_case", "title"], json!(null)),
            Err(PatchError::InvalidShape(_))
        ));
        assert!(patch_at_path(&["ratings", "notes"], json!(null)).is_ok());
    }

    #[test]
    fn test_model_round_trips_through_wire_shape() {
        let json = serde_json::to_value(sample_model()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                "evidence",
                "exec_summary",
                "key_quotes",
                "meta",
                "quality",
                "ratings",
                "themes",
                "tools_used",
                "use_case"
            ]
        );
        assert_eq!(json["use_case"]["goal"], "Same-day follow-ups");
        assert_eq!(json["exec_summary"]["overall_sentiment"], "positive");
    }
}

//! Structure compatibility analysis.
//!
//! `POST /api/v1/structures/compatibility/analyze` scores how well a
//! source structure type (campaign, adset/adgroup, ad, creative,
//! audience) maps onto a target type, optionally refined by the field
//! names each side carries. The score is a 0-100 integer; pairs at or
//! above [`COMPATIBLE_THRESHOLD`] are considered migratable.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;


/// Scores at or above this count as compatible.
pub const COMPATIBLE_THRESHOLD: u8 = 70;

/// Weight of the type-pair rule vs. field overlap when fields are given.
const TYPE_WEIGHT: u32 = 60;
const FIELD_WEIGHT: u32 = 40;

#[derive(Deserialize)]
pub struct CompatibilityRequest {
    pub source_type: String,
    pub target_type: String,
    /// Field names present on the source structure.
    #[serde(default)]
    pub source_fields: Vec<String>,
    /// Field names the target structure supports.
    #[serde(default)]
    pub target_fields: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CompatibilityResponse {
    pub overall_compatibility: u8,
    pub is_compatible: bool,
    pub issues: Vec<CompatibilityIssue>,
}

#[derive(Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Blocker,
    Warning,
    Info,
}

pub fn create_compatibility_router() -> Router {
    Router::new().route(
        "/api/v1/structures/compatibility/analyze",
        post(analyze_compatibility),
    )
}

/// Structure-type pairs with a known migration path and their base
/// score. Order within a pair does not matter; lookups try both
/// directions. Identical types always score 100.
const TYPE_RULES: &[(&str, &str, u8)] = &[
    ("campaign", "campaign", 100),
    ("adset", "adgroup", 85),
    ("ad", "ad", 100),
    ("creative", "ad", 60),
    ("audience", "custom_audience", 80),
    ("audience", "saved_audience", 55),
    ("page_post", "video_post", 50),
];

fn type_pair_score(source: &str, target: &str) -> Option<u8> {
    if source == target {
        return Some(100);
    }
    TYPE_RULES
        .iter()
        .find(|(a, b, _)| (*a == source && *b == target) || (*a == target && *b == source))
        .map(|(_, _, score)| *score)
}

/// POST /api/v1/structures/compatibility/analyze
async fn analyze_compatibility(Json(request): Json<CompatibilityRequest>) -> Response {
    let source = request.source_type.to_lowercase();
    let target = request.target_type.to_lowercase();

    let mut issues = Vec::new();

    let Some(type_score) = type_pair_score(&source, &target) else {
        issues.push(CompatibilityIssue {
            severity: IssueSeverity::Blocker,
            field: None,
            message: format!("no migration path from '{}' to '{}'", source, target),
        });
        return respond(0, issues);
    };

    if type_score < COMPATIBLE_THRESHOLD {
        issues.push(CompatibilityIssue {
            severity: IssueSeverity::Warning,
            field: None,
            message: format!(
                "'{}' to '{}' is a lossy conversion; manual review recommended",
                source, target
            ),
        });
    }

    // Without field lists the type rule is the whole answer.
    if request.source_fields.is_empty() || request.target_fields.is_empty() {
        if request.source_fields.is_empty() && request.target_fields.is_empty() {
            issues.push(CompatibilityIssue {
                severity: IssueSeverity::Info,
                field: None,
                message: "no field lists supplied; score reflects type-level rules only"
                    .to_string(),
            });
        }
        return respond(type_score, issues);
    }

    let target_set: HashSet<&str> = request.target_fields.iter().map(|s| s.as_str()).collect();
    let mut matched = 0usize;
    for field in &request.source_fields {
        if target_set.contains(field.as_str()) {
            matched += 1;
        } else {
            issues.push(CompatibilityIssue {
                severity: IssueSeverity::Warning,
                field: Some(field.clone()),
                message: format!("field '{}' has no counterpart on the target", field),
            });
        }
    }

    let overlap_pct = (matched as u32 * 100) / request.source_fields.len() as u32;
    let combined =
        (type_score as u32 * TYPE_WEIGHT + overlap_pct * FIELD_WEIGHT) / (TYPE_WEIGHT + FIELD_WEIGHT);

    debug!(
        %source, %target, type_score, overlap_pct, combined,
        "Compatibility analysis completed"
    );
    respond(combined as u8, issues)
}

fn respond(score: u8, issues: Vec<CompatibilityIssue>) -> Response {
    let response = CompatibilityResponse {
        overall_compatibility: score,
        is_compatible: score >= COMPATIBLE_THRESHOLD,
        issues,
    };
    (StatusCode::OK, Json(response)).into_response()
}

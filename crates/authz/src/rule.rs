use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a permission rule came from: a shared preset or a user's direct grant.
///
/// Preset rules are evaluated before direct rules so that a direct grant can
/// narrow but never silently shadow a preset-derived allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Preset,
    Direct,
}

/// A single `{path, oneOf?|matches?|maxLen?}` value constraint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValueRule {
    pub path: String,
    #[serde(rename = "oneOf", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    #[serde(rename = "maxLen", default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// Sliding-window rate limit thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    #[serde(rename = "perMin", default, skip_serializing_if = "Option::is_none")]
    pub per_min: Option<u32>,
    #[serde(rename = "perHour", default, skip_serializing_if = "Option::is_none")]
    pub per_hour: Option<u32>,
}

/// Input guards: `allowParams`/`denyParams`/value rules/`dryRunOnly`/rate limits.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputGuard {
    #[serde(rename = "allowParams", default, skip_serializing_if = "Option::is_none")]
    pub allow_params: Option<Vec<String>>,
    #[serde(rename = "denyParams", default, skip_serializing_if = "Option::is_none")]
    pub deny_params: Option<Vec<String>>,
    #[serde(rename = "valueRules", default, skip_serializing_if = "Vec::is_empty")]
    pub value_rules: Vec<ValueRule>,
    #[serde(rename = "dryRunOnly", default)]
    pub dry_run_only: bool,
    #[serde(rename = "rateLimit", default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

/// Where-clause constraints narrowing which records a rule applies to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WhereClause {
    #[serde(rename = "bundleIds", default, skip_serializing_if = "Option::is_none")]
    pub bundle_ids: Option<Vec<String>>,
    #[serde(rename = "pipelineIds", default, skip_serializing_if = "Option::is_none")]
    pub pipeline_ids: Option<Vec<String>>,
    #[serde(rename = "triggerKinds", default, skip_serializing_if = "Option::is_none")]
    pub trigger_kinds: Option<Vec<String>>,
    #[serde(rename = "actionKinds", default, skip_serializing_if = "Option::is_none")]
    pub action_kinds: Option<Vec<String>>,
    #[serde(
        rename = "recipientTagsAny",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_tags_any: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,
    #[serde(rename = "systemOnly", default)]
    pub system_only: bool,
    #[serde(rename = "ownerIsSelf", default)]
    pub owner_is_self: bool,
    #[serde(rename = "timeWindow", default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

/// A raw permission rule as stored on a preset or a user's direct grant list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: RuleSource,
    pub action: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#where: Option<WhereClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputGuard>,
}

/// A rule after compilation: a stable `id` has been assigned and the rule
/// has been sanitized and bucketed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: String,
    pub source: RuleSource,
    pub action: String,
    pub resource: String,
    pub r#where: Option<WhereClause>,
    pub input: Option<InputGuard>,
}

impl CompiledRule {
    #[must_use]
    pub fn is_wildcard_resource(&self) -> bool {
        self.resource == "*"
    }
}

use chrono::{DateTime, Utc};

use crate::path::{collect_strings, get_path};
use crate::request::{AuthzContext, RequestSnapshot};
use crate::rule::WhereClause;

/// Evaluate a rule's `where` clause against a request and context.
///
/// An absent `where` matches everything. An empty candidate-id list against
/// a non-empty constraint is a miss (the constraint narrows to nothing the
/// request could possibly satisfy).
#[must_use]
pub fn matches(
    clause: Option<&WhereClause>,
    request: &RequestSnapshot,
    ctx: &AuthzContext,
    system_user_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some(clause) = clause else {
        return true;
    };

    if let Some(ids) = &clause.bundle_ids {
        if !intersects(ids, &bundle_id_candidates(request, ctx)) {
            return false;
        }
    }
    if let Some(ids) = &clause.pipeline_ids {
        if !intersects(ids, &pipeline_id_candidates(request, ctx)) {
            return false;
        }
    }
    if let Some(kinds) = &clause.trigger_kinds {
        if !intersects(kinds, &kind_candidates(request, "trigger")) {
            return false;
        }
    }
    if let Some(kinds) = &clause.action_kinds {
        if !intersects(kinds, &kind_candidates(request, "action")) {
            return false;
        }
    }
    if let Some(tags) = &clause.recipient_tags_any {
        if !intersects(tags, &recipient_tag_candidates(request)) {
            return false;
        }
    }
    if let Some(envs) = &clause.environments {
        if !intersects(envs, &environment_candidates(request)) {
            return false;
        }
    }
    if clause.system_only && ctx.user_id != system_user_id {
        return false;
    }
    if clause.owner_is_self && !owner_is_self(request, ctx) {
        return false;
    }
    if let Some(window) = &clause.time_window {
        if let Some(since) = window.since {
            if now < since {
                return false;
            }
        }
        if let Some(until) = window.until {
            if now > until {
                return false;
            }
        }
    }

    true
}

fn intersects(constraint: &[String], candidates: &[String]) -> bool {
    if candidates.is_empty() {
        return false;
    }
    constraint.iter().any(|c| candidates.contains(c))
}

fn bundle_id_candidates(request: &RequestSnapshot, ctx: &AuthzContext) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(id) = &ctx.bundle_id {
        out.push(id.clone());
    }
    if let Some(body) = &request.body {
        for path in ["bundleId", "bundle.id"] {
            if let Some(v) = get_path(body, path).and_then(|v| v.as_str()) {
                out.push(v.to_owned());
            }
        }
    }
    out
}

fn pipeline_id_candidates(request: &RequestSnapshot, ctx: &AuthzContext) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(id) = &ctx.pipeline_id {
        out.push(id.clone());
    }
    if let Some(body) = &request.body {
        for path in ["pipelineId", "pipeline.id"] {
            if let Some(v) = get_path(body, path).and_then(|v| v.as_str()) {
                out.push(v.to_owned());
            }
        }
    }
    out
}

fn kind_candidates(request: &RequestSnapshot, scope: &str) -> Vec<String> {
    let Some(body) = &request.body else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(v) = get_path(body, "kind").and_then(|v| v.as_str()) {
        out.push(v.to_owned());
    }
    if let Some(v) = get_path(body, &format!("{scope}.kind")).and_then(|v| v.as_str()) {
        out.push(v.to_owned());
    }
    out
}

fn recipient_tag_candidates(request: &RequestSnapshot) -> Vec<String> {
    let Some(body) = &request.body else {
        return Vec::new();
    };
    let mut out = collect_strings(body, "tags");
    out.extend(collect_strings(body, "recipient.tags"));
    out
}

fn environment_candidates(request: &RequestSnapshot) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(v) = request.query.get("environment") {
        out.push(v.clone());
    }
    if let Some(body) = &request.body {
        if let Some(v) = get_path(body, "environment").and_then(|v| v.as_str()) {
            out.push(v.to_owned());
        }
    }
    if let Some(v) = request.header("x-latchflow-environment") {
        out.push(v.to_owned());
    }
    out
}

fn owner_is_self(request: &RequestSnapshot, ctx: &AuthzContext) -> bool {
    if let Some(v) = request.params.get("userId") {
        if v == &ctx.user_id {
            return true;
        }
    }
    if let Some(v) = request.query.get("userId") {
        if v == &ctx.user_id {
            return true;
        }
    }
    if let Some(body) = &request.body {
        for path in ["userId", "ownerId"] {
            if let Some(v) = get_path(body, path).and_then(|v| v.as_str()) {
                if v == ctx.user_id {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> AuthzContext {
        AuthzContext {
            user_id: "u-1".to_owned(),
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn no_where_clause_matches_everything() {
        let req = RequestSnapshot::default();
        assert!(matches(None, &req, &ctx(), "sys", Utc::now()));
    }

    #[test]
    fn bundle_ids_requires_intersection() {
        let clause = WhereClause {
            bundle_ids: Some(vec!["b-1".into()]),
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.body = Some(json!({"bundleId": "b-2"}));
        assert!(!matches(Some(&clause), &req, &ctx(), "sys", Utc::now()));

        req.body = Some(json!({"bundleId": "b-1"}));
        assert!(matches(Some(&clause), &req, &ctx(), "sys", Utc::now()));
    }

    #[test]
    fn empty_candidates_against_constraint_is_a_miss() {
        let clause = WhereClause {
            bundle_ids: Some(vec!["b-1".into()]),
            ..Default::default()
        };
        let req = RequestSnapshot::default();
        assert!(!matches(Some(&clause), &req, &ctx(), "sys", Utc::now()));
    }

    #[test]
    fn system_only_checks_configured_system_user() {
        let clause = WhereClause {
            system_only: true,
            ..Default::default()
        };
        let req = RequestSnapshot::default();
        assert!(!matches(Some(&clause), &req, &ctx(), "sys", Utc::now()));
        assert!(matches(Some(&clause), &req, &ctx(), "u-1", Utc::now()));
    }

    #[test]
    fn owner_is_self_checks_request_fields() {
        let clause = WhereClause {
            owner_is_self: true,
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.query.insert("userId".to_owned(), "u-1".to_owned());
        assert!(matches(Some(&clause), &req, &ctx(), "sys", Utc::now()));
    }

    #[test]
    fn time_window_bounds_now() {
        let now = Utc::now();
        let clause = WhereClause {
            time_window: Some(crate::rule::TimeWindow {
                since: Some(now - chrono::Duration::hours(1)),
                until: Some(now - chrono::Duration::minutes(1)),
            }),
            ..Default::default()
        };
        let req = RequestSnapshot::default();
        assert!(!matches(Some(&clause), &req, &ctx(), "sys", now));
    }
}

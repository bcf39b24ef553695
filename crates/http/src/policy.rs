//! `requirePermission`: the thin seam between the HTTP layer and the
//! authorizer (§4.6, §4.16). All the actual decision logic lives in
//! `latchflow-authz`; this just emits the `authz_decision` log line and
//! turns a `Deny` into the matching `ApiError`.

use latchflow_authz::{
    AuthzContext, AuthzUser, CompiledRuleCache, Decision, EvaluationMode, MatchedRule,
    PolicyEntry, RateLimiter, RequestSnapshot, SessionFreshness,
};
use tracing::info;

use crate::error::{from_authz_error, ApiError};

/// Bundles the fixed, deployment-wide authorizer inputs so call sites only
/// have to supply the request-scoped ones.
pub struct PolicyConfig<'a> {
    pub cache: &'a CompiledRuleCache,
    pub limiter: &'a RateLimiter,
    pub evaluation_mode: EvaluationMode,
    pub system_user_id: &'a str,
    pub admin_mfa_required: bool,
    pub reauth_window: chrono::Duration,
}

#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn require_permission(
    entry: Option<&PolicyEntry>,
    request: &RequestSnapshot,
    ctx: &AuthzContext,
    user: &AuthzUser<'_>,
    config: &PolicyConfig<'_>,
    now: chrono::DateTime<chrono::Utc>,
    session: Option<&SessionFreshness>,
) -> Result<MatchedRule, ApiError> {
    let (decision, log) = latchflow_authz::authorize(
        entry,
        request,
        ctx,
        user,
        config.cache,
        config.limiter,
        config.evaluation_mode,
        config.system_user_id,
        now,
        config.admin_mfa_required,
        config.reauth_window,
        session,
    );

    info!(
        decision = log.decision,
        reason = %log.reason,
        user_id = ?log.user_id,
        resource = ?log.resource,
        action = ?log.action,
        shadow_mode = log.shadow_mode,
        rules_hash = ?log.rules_hash,
        preset_id = ?log.preset_id,
        rule_id = ?log.rule_id,
        duration_ms = log.duration_ms,
        "authz_decision"
    );

    match decision {
        Decision::Allow(matched) => Ok(matched),
        Decision::Deny(err) => Err(from_authz_error(&err)),
    }
}

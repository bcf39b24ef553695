use std::time::Instant;

use chrono::{DateTime, Utc};
use latchflow_core::Role;
use tracing::info;

use crate::cache::CompiledRuleCache;
use crate::compiler::CompiledPermissions;
use crate::error::AuthzError;
use crate::guard::{self, GuardContext, RateLimiter};
use crate::request::{AuthzContext, RequestSnapshot};
use crate::rule::{PermissionRule, RuleSource};
use crate::where_match;

/// A policy entry resolved from a route signature (`"METHOD /path"`).
#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub action: String,
    pub resource: String,
    pub v1_allow_executor: bool,
}

/// Whether the authorizer's decision is actually enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Enforce,
    Shadow,
    Off,
}

/// The user-scoped inputs the authorizer needs beyond the request/context.
pub struct AuthzUser<'a> {
    pub role: Role,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub permissions_hash: Option<&'a str>,
    pub direct_permissions: &'a [PermissionRule],
    pub preset: Option<AuthzPreset<'a>>,
}

pub struct AuthzPreset<'a> {
    pub id: &'a str,
    pub version: u32,
    pub rules: &'a [PermissionRule],
}

/// Two-factor session freshness inputs, only consulted when the deployment
/// requires admin 2FA.
pub struct SessionFreshness {
    pub reauthenticated_at: Option<DateTime<Utc>>,
    pub mfa_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionFreshness {
    fn last_auth_ts(&self) -> DateTime<Utc> {
        self.reauthenticated_at
            .or(self.mfa_verified_at)
            .unwrap_or(self.created_at)
    }
}

/// A successful match, carrying preset attribution when the matched rule
/// came from the user's permission preset.
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub rule_id: String,
    pub preset_id: Option<String>,
    pub preset_version: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Allow(MatchedRule),
    Deny(AuthzError),
}

/// One `authz_decision` log line, per §4.6.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    pub decision: &'static str,
    pub reason: String,
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub shadow_mode: bool,
    pub rules_hash: Option<String>,
    pub preset_id: Option<String>,
    pub rule_id: Option<String>,
    pub duration_ms: u128,
}

/// Evaluate a request against a resolved policy entry.
///
/// Implements §4.6 step by step: policy/active checks, the ADMIN shortcut,
/// rule compilation via the cache, ordered candidate evaluation, and the
/// two-factor post-check.
#[allow(clippy::too_many_arguments)]
pub fn authorize(
    entry: Option<&PolicyEntry>,
    request: &RequestSnapshot,
    ctx: &AuthzContext,
    user: &AuthzUser<'_>,
    cache: &CompiledRuleCache,
    limiter: &RateLimiter,
    evaluation_mode: EvaluationMode,
    system_user_id: &str,
    now: DateTime<Utc>,
    admin_mfa_required: bool,
    reauth_window: chrono::Duration,
    session: Option<&SessionFreshness>,
) -> (Decision, DecisionLog) {
    let started = Instant::now();
    let Some(entry) = entry else {
        let log = decision_log("deny", "NO_POLICY", ctx, None, None, started, evaluation_mode);
        return (Decision::Deny(AuthzError::NoPolicy), log);
    };

    if !user.is_active {
        let log = decision_log(
            "deny",
            "INACTIVE",
            ctx,
            Some(entry),
            None,
            started,
            evaluation_mode,
        );
        return (Decision::Deny(AuthzError::Inactive), log);
    }

    let legacy_allows = user.role == Role::Admin || entry.v1_allow_executor;

    if evaluation_mode == EvaluationMode::Off {
        let decision = legacy_decision(legacy_allows);
        let log = decision_log(
            if legacy_allows { "allow" } else { "deny" },
            "LEGACY",
            ctx,
            Some(entry),
            None,
            started,
            evaluation_mode,
        );
        return (decision, log);
    }

    if user.role == Role::Admin {
        let matched = MatchedRule {
            rule_id: "ADMIN".to_owned(),
            preset_id: None,
            preset_version: None,
        };
        let mfa_decision = apply_two_factor_check(
            user,
            session,
            admin_mfa_required,
            reauth_window,
            now,
            matched.clone(),
        );
        let (tag, reason) = match &mfa_decision {
            Decision::Allow(_) => ("allow", "ADMIN"),
            Decision::Deny(e) => ("deny", e.code()),
        };
        let log = decision_log(tag, reason, ctx, Some(entry), None, started, evaluation_mode);
        return (mfa_decision, log);
    }

    let compiled = compile_user_permissions(user, cache);
    let candidates = compiled.candidates(&entry.resource, &entry.action);

    let mut saw_where_miss = false;
    let mut saw_input_failure = false;
    let mut final_decision: Option<Decision> = None;

    for rule in candidates {
        let guard_ctx = GuardContext {
            rule_id: &rule.id,
            user_id: &ctx.user_id,
            rules_hash: &compiled.rules_hash,
        };
        if !where_match::matches(rule.r#where.as_ref(), request, ctx, system_user_id, now) {
            saw_where_miss = true;
            continue;
        }

        match guard::evaluate(
            rule.input.as_ref(),
            request,
            guard_ctx,
            limiter,
            Instant::now(),
        ) {
            Ok(()) => {
                let (preset_id, preset_version) = if rule.source == RuleSource::Preset {
                    user.preset
                        .as_ref()
                        .map(|p| (Some(p.id.to_owned()), Some(p.version)))
                        .unwrap_or((None, None))
                } else {
                    (None, None)
                };
                final_decision = Some(Decision::Allow(MatchedRule {
                    rule_id: rule.id.clone(),
                    preset_id,
                    preset_version,
                }));
                break;
            }
            Err(AuthzError::RateLimit) => {
                final_decision = Some(Decision::Deny(AuthzError::RateLimit));
                break;
            }
            Err(_) => {
                saw_input_failure = true;
            }
        }
    }

    let decision = final_decision.unwrap_or_else(|| {
        if saw_input_failure {
            Decision::Deny(AuthzError::InputGuard("no rule matched".to_owned()))
        } else if saw_where_miss {
            Decision::Deny(AuthzError::WhereMiss)
        } else {
            Decision::Deny(AuthzError::NoMatch)
        }
    });

    let decision = match (evaluation_mode, &decision) {
        (EvaluationMode::Shadow, _) => {
            let shadow_allows = legacy_decision(legacy_allows);
            // record the counterfactual decision in the log, but admit per legacy
            shadow_allows
        }
        _ => decision,
    };

    let (tag, reason) = match &decision {
        Decision::Allow(m) => ("allow", m.rule_id.as_str()),
        Decision::Deny(e) => ("deny", e.code()),
    };
    let mut log = decision_log(tag, reason, ctx, Some(entry), Some(&compiled), started, evaluation_mode);
    log.shadow_mode = evaluation_mode == EvaluationMode::Shadow;
    if let Decision::Allow(m) = &decision {
        log.rule_id = Some(m.rule_id.clone());
        log.preset_id = m.preset_id.clone();
    }

    (decision, log)
}

fn legacy_decision(allows: bool) -> Decision {
    if allows {
        Decision::Allow(MatchedRule {
            rule_id: "LEGACY".to_owned(),
            preset_id: None,
            preset_version: None,
        })
    } else {
        Decision::Deny(AuthzError::NoMatch)
    }
}

fn apply_two_factor_check(
    user: &AuthzUser<'_>,
    session: Option<&SessionFreshness>,
    admin_mfa_required: bool,
    reauth_window: chrono::Duration,
    now: DateTime<Utc>,
    matched: MatchedRule,
) -> Decision {
    if !admin_mfa_required {
        return Decision::Allow(matched);
    }
    if !user.mfa_enabled {
        return Decision::Deny(AuthzError::MfaRequired);
    }
    let Some(session) = session else {
        return Decision::Deny(AuthzError::MfaRequired);
    };
    if now - session.last_auth_ts() > reauth_window {
        return Decision::Deny(AuthzError::MfaRequired);
    }
    Decision::Allow(matched)
}

fn compile_user_permissions(
    user: &AuthzUser<'_>,
    cache: &CompiledRuleCache,
) -> std::sync::Arc<CompiledPermissions> {
    let mut rules: Vec<PermissionRule> = Vec::new();
    if let Some(preset) = &user.preset {
        rules.extend(preset.rules.iter().cloned());
    }
    rules.extend(user.direct_permissions.iter().cloned());
    cache.get_or_compile(&rules, user.permissions_hash)
}

#[allow(clippy::too_many_arguments)]
fn decision_log(
    decision: &'static str,
    reason: &str,
    ctx: &AuthzContext,
    entry: Option<&PolicyEntry>,
    compiled: Option<&CompiledPermissions>,
    started: Instant,
    mode: EvaluationMode,
) -> DecisionLog {
    let log = DecisionLog {
        decision,
        reason: reason.to_owned(),
        user_id: Some(ctx.user_id.clone()),
        role: Some(ctx.role),
        resource: entry.map(|e| e.resource.clone()),
        action: entry.map(|e| e.action.clone()),
        shadow_mode: mode == EvaluationMode::Shadow,
        rules_hash: compiled.map(|c| c.rules_hash.clone()),
        preset_id: None,
        rule_id: None,
        duration_ms: started.elapsed().as_millis(),
    };
    info!(
        kind = "authz_decision",
        decision = log.decision,
        reason = %log.reason,
        user_id = ?log.user_id,
        resource = ?log.resource,
        action = ?log.action,
        duration_ms = log.duration_ms,
        "authorization decision"
    );
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PolicyEntry {
        PolicyEntry {
            action: "read".to_owned(),
            resource: "bundle".to_owned(),
            v1_allow_executor: false,
        }
    }

    fn ctx() -> AuthzContext {
        AuthzContext {
            user_id: "u-1".to_owned(),
            role: Role::Executor,
            is_active: true,
            ..Default::default()
        }
    }

    fn user<'a>(rules: &'a [PermissionRule]) -> AuthzUser<'a> {
        AuthzUser {
            role: Role::Executor,
            is_active: true,
            mfa_enabled: false,
            permissions_hash: None,
            direct_permissions: rules,
            preset: None,
        }
    }

    #[test]
    fn missing_policy_denies() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let (decision, _) = authorize(
            None,
            &RequestSnapshot::default(),
            &ctx(),
            &user(&[]),
            &cache,
            &limiter,
            EvaluationMode::Enforce,
            "sys",
            Utc::now(),
            false,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Deny(AuthzError::NoPolicy)));
    }

    #[test]
    fn admin_role_shortcuts_to_allow() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let mut context = ctx();
        context.role = Role::Admin;
        let mut u = user(&[]);
        u.role = Role::Admin;
        let (decision, _) = authorize(
            Some(&entry()),
            &RequestSnapshot::default(),
            &context,
            &u,
            &cache,
            &limiter,
            EvaluationMode::Enforce,
            "sys",
            Utc::now(),
            false,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Allow(_)));
    }

    #[test]
    fn direct_rule_matching_resource_and_action_allows() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let rules = vec![PermissionRule {
            id: Some("r-1".to_owned()),
            source: RuleSource::Direct,
            action: "read".to_owned(),
            resource: "bundle".to_owned(),
            r#where: None,
            input: None,
        }];
        let (decision, _) = authorize(
            Some(&entry()),
            &RequestSnapshot::default(),
            &ctx(),
            &user(&rules),
            &cache,
            &limiter,
            EvaluationMode::Enforce,
            "sys",
            Utc::now(),
            false,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Allow(m) if m.rule_id == "r-1"));
    }

    #[test]
    fn no_matching_rule_yields_no_match() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let (decision, _) = authorize(
            Some(&entry()),
            &RequestSnapshot::default(),
            &ctx(),
            &user(&[]),
            &cache,
            &limiter,
            EvaluationMode::Enforce,
            "sys",
            Utc::now(),
            false,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Deny(AuthzError::NoMatch)));
    }

    #[test]
    fn shadow_mode_admits_per_legacy_rule() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let (decision, log) = authorize(
            Some(&entry()),
            &RequestSnapshot::default(),
            &ctx(),
            &user(&[]),
            &cache,
            &limiter,
            EvaluationMode::Shadow,
            "sys",
            Utc::now(),
            false,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Deny(_)));
        assert!(log.shadow_mode);
    }

    #[test]
    fn admin_mfa_required_denies_without_mfa_enabled() {
        let cache = CompiledRuleCache::new();
        let limiter = RateLimiter::new();
        let mut context = ctx();
        context.role = Role::Admin;
        let mut u = user(&[]);
        u.role = Role::Admin;
        let (decision, _) = authorize(
            Some(&entry()),
            &RequestSnapshot::default(),
            &context,
            &u,
            &cache,
            &limiter,
            EvaluationMode::Enforce,
            "sys",
            Utc::now(),
            true,
            chrono::Duration::hours(1),
            None,
        );
        assert!(matches!(decision, Decision::Deny(AuthzError::MfaRequired)));
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;

use crate::error::AuthzError;
use crate::path::get_path;
use crate::request::RequestSnapshot;
use crate::rule::InputGuard;

/// Evaluation context for an input guard: which rule is being checked and
/// who is making the call, for rate-limit bucketing.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub rule_id: &'a str,
    pub user_id: &'a str,
    pub rules_hash: &'a str,
}

/// In-process sliding-window rate limiter, keyed by `"{rulesHash}:{ruleId}:{userId}"`.
///
/// Each key's sample deque is guarded by its own mutex (a critical section
/// per key, not a single global lock). This is the reference behavior for a
/// single process; a clustered deployment must converge through a shared
/// store instead.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call at `now` and report whether any configured threshold
    /// was exceeded. Always prunes samples older than one hour first.
    fn check(
        &self,
        key: &str,
        now: Instant,
        burst: Option<u32>,
        per_min: Option<u32>,
        per_hour: Option<u32>,
    ) -> bool {
        let bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut samples = bucket.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        samples.push_back(now);
        while let Some(&front) = samples.front() {
            if now.duration_since(front) > Duration::from_secs(3600) {
                samples.pop_front();
            } else {
                break;
            }
        }

        let count_within = |window: Duration| {
            samples
                .iter()
                .filter(|&&t| now.duration_since(t) <= window)
                .count() as u32
        };

        if let Some(b) = burst {
            if count_within(Duration::from_secs(1)) > b {
                return true;
            }
        }
        if let Some(m) = per_min {
            if count_within(Duration::from_secs(60)) > m {
                return true;
            }
        }
        if let Some(h) = per_hour {
            if count_within(Duration::from_secs(3600)) > h {
                return true;
            }
        }
        false
    }

    /// Generic per-minute check for call sites outside the input-guard
    /// evaluator, e.g. the auth flows' shared `(route, ip, subject)`
    /// limiter (§4.18). Same sliding-window bucket machinery as `check`.
    #[must_use]
    pub fn check_per_minute(&self, key: &str, now: Instant, per_min: u32) -> bool {
        self.check(key, now, None, Some(per_min), None)
    }
}

/// Evaluate `input` guards against a request, in declaration order.
///
/// Returns `Ok(())` on success. A `RATE_LIMIT` failure always returns
/// immediately; other guard failures are reported the same way since only
/// one input guard set is evaluated per rule attempt.
pub fn evaluate(
    input: Option<&InputGuard>,
    request: &RequestSnapshot,
    ctx: GuardContext<'_>,
    limiter: &RateLimiter,
    now: Instant,
) -> Result<(), AuthzError> {
    let Some(input) = input else {
        return Ok(());
    };

    if let Some(allow) = &input.allow_params {
        if let Some(Value::Object(map)) = &request.body {
            if map.keys().any(|k| !allow.contains(k)) {
                return Err(AuthzError::InputGuard("ALLOWED_PARAMS".to_owned()));
            }
        }
    }

    if let Some(deny) = &input.deny_params {
        if let Some(Value::Object(map)) = &request.body {
            if deny.iter().any(|k| map.contains_key(k)) {
                return Err(AuthzError::InputGuard("DENIED_PARAM".to_owned()));
            }
        }
    }

    for rule in &input.value_rules {
        // resolve against `body` first, falling back to the flat `query` map
        let body_value = request.body.as_ref().and_then(|b| get_path(b, &rule.path));
        let query_value = request.query.get(&rule.path);
        let resolved_str = body_value
            .and_then(|v| v.as_str())
            .or(query_value.map(String::as_str));

        if let Some(one_of) = &rule.one_of {
            let matched = match body_value {
                Some(v) => one_of.contains(v),
                None => query_value
                    .map(|s| one_of.iter().any(|v| v.as_str() == Some(s.as_str())))
                    .unwrap_or(false),
            };
            if !matched {
                return Err(AuthzError::InputGuard("VALUE_RULE".to_owned()));
            }
        }
        if let Some(pattern) = &rule.matches {
            if let Some(s) = resolved_str {
                let re = Regex::new(pattern)
                    .map_err(|e| AuthzError::InvalidRegex(e.to_string()))?;
                if !re.is_match(s) {
                    return Err(AuthzError::InputGuard("VALUE_RULE".to_owned()));
                }
            }
        }
        if let Some(max_len) = rule.max_len {
            if let Some(s) = resolved_str {
                if s.len() > max_len {
                    return Err(AuthzError::InputGuard("VALUE_RULE".to_owned()));
                }
            }
        }
    }

    if input.dry_run_only {
        let body_true = matches!(
            request.body.as_ref().and_then(|b| get_path(b, "dryRun")),
            Some(Value::Bool(true))
        );
        let query_true = request
            .query
            .get("dryRun")
            .is_some_and(|v| v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true"));
        let header_true = request.header("x-latchflow-dry-run").is_some();
        if !(body_true || query_true || header_true) {
            return Err(AuthzError::InputGuard("DRY_RUN_ONLY".to_owned()));
        }
    }

    if let Some(rl) = &input.rate_limit {
        let key = format!("{}:{}:{}", ctx.rules_hash, ctx.rule_id, ctx.user_id);
        if limiter.check(&key, now, rl.burst, rl.per_min, rl.per_hour) {
            return Err(AuthzError::RateLimit);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RateLimit, ValueRule};
    use serde_json::json;

    fn ctx<'a>() -> GuardContext<'a> {
        GuardContext {
            rule_id: "r-1",
            user_id: "u-1",
            rules_hash: "h-1",
        }
    }

    #[test]
    fn allow_params_rejects_unknown_key() {
        let input = InputGuard {
            allow_params: Some(vec!["foo".to_owned()]),
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.body = Some(json!({"bar": 1}));
        let limiter = RateLimiter::new();
        let err = evaluate(Some(&input), &req, ctx(), &limiter, Instant::now()).unwrap_err();
        assert_eq!(err.code(), "INPUT_GUARD");
    }

    #[test]
    fn deny_params_rejects_listed_key() {
        let input = InputGuard {
            deny_params: Some(vec!["secret".to_owned()]),
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.body = Some(json!({"secret": 1}));
        let limiter = RateLimiter::new();
        assert!(evaluate(Some(&input), &req, ctx(), &limiter, Instant::now()).is_err());
    }

    #[test]
    fn value_rule_one_of_falls_back_to_query() {
        let input = InputGuard {
            value_rules: vec![ValueRule {
                path: "status".to_owned(),
                one_of: Some(vec![json!("active"), json!("paused")]),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.query.insert("status".to_owned(), "active".to_owned());
        let limiter = RateLimiter::new();
        assert!(evaluate(Some(&input), &req, ctx(), &limiter, Instant::now()).is_ok());
    }

    #[test]
    fn rate_limit_third_call_within_a_minute_fails() {
        let input = InputGuard {
            rate_limit: Some(RateLimit {
                burst: None,
                per_min: Some(2),
                per_hour: None,
            }),
            ..Default::default()
        };
        let req = RequestSnapshot::default();
        let limiter = RateLimiter::new();
        let base = Instant::now();
        assert!(evaluate(Some(&input), &req, ctx(), &limiter, base).is_ok());
        assert!(
            evaluate(Some(&input), &req, ctx(), &limiter, base + Duration::from_secs(1)).is_ok()
        );
        let third = evaluate(
            Some(&input),
            &req,
            ctx(),
            &limiter,
            base + Duration::from_secs(2),
        );
        assert_eq!(third.unwrap_err().code(), "RATE_LIMIT");
    }

    #[test]
    fn dry_run_only_accepts_header() {
        let input = InputGuard {
            dry_run_only: true,
            ..Default::default()
        };
        let mut req = RequestSnapshot::default();
        req.headers
            .insert("x-latchflow-dry-run".to_owned(), "1".to_owned());
        let limiter = RateLimiter::new();
        assert!(evaluate(Some(&input), &req, ctx(), &limiter, Instant::now()).is_ok());
    }
}

pub mod authorizer;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod path;
pub mod request;
pub mod rule;
pub mod where_match;

pub use authorizer::{
    authorize, AuthzPreset, AuthzUser, Decision, DecisionLog, EvaluationMode, MatchedRule,
    PolicyEntry, SessionFreshness,
};
pub use cache::CompiledRuleCache;
pub use compiler::{compile, CompiledPermissions};
pub use error::AuthzError;
pub use guard::{GuardContext, RateLimiter};
pub use metrics::AuthzMetrics;
pub use request::{AuthzContext, RequestSnapshot};
pub use rule::{
    CompiledRule, InputGuard, PermissionRule, RateLimit, RuleSource, TimeWindow, ValueRule,
    WhereClause,
};

pub mod actor;
pub mod canonical;
pub mod error;
pub mod types;

pub use actor::{Actor, ActorKind};
pub use canonical::{
    canonicalize, canonical_json_string, compute_rules_hash, generate_otp, generate_token,
    hash_canonical, sha256_hex,
};
pub use error::LatchflowError;
pub use types::{
    ActionDefinitionId, ActionInvocationId, BundleId, FileId, PipelineId, RecipientId, Role,
    TriggerDefinitionId, TriggerEventId, UserId,
};

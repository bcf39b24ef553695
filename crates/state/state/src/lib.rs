//! Generic key/value store and distributed lock abstractions.
//!
//! This is the clustered-deployment seam (§5, §9 "process-wide state") for
//! Latchflow's process-singleton state: the input-guard rate limiter
//! (§4.4), the rebuild scheduler's debounce bookkeeping (§4.11), and the
//! plug-in hot-reload watcher (§4.12). The in-process reference
//! implementations of those components use their own lock-free structures
//! directly; this trait exists so a clustered deployment can externalize
//! that state through a shared backend instead, per §9's open note that
//! clustering "requires externalizing rate-limit and rebuild-scheduler
//! state... via shared store and leader election."

pub mod error;
pub mod key;
pub mod lock;
pub mod store;
pub mod testing;

pub use error::StateError;
pub use key::{KeyKind, StateKey};
pub use lock::{DistributedLock, LockGuard};
pub use store::{CasResult, StateStore};

//! Recipient portal, admin API, and authentication flows (§4.17/§4.18),
//! plus the axum adapter that turns the framework-agnostic pieces in
//! `latchflow-http` into an actual HTTP server (§4.16, C16-C17).
//!
//! Module layout follows the spec's own split between the decision logic
//! (framework-agnostic, unit-tested without a server) and the adapter:
//! `admin`/`portal`/`auth_flows`/`bundles`/`history` hold the former;
//! `router`/`auth`/`adapter` hold the latter.

pub mod adapter;
pub mod admin;
pub mod auth;
pub mod auth_flows;
pub mod bundles;
pub mod config;
pub mod error;
pub mod history;
pub mod portal;
pub mod router;
pub mod routes;
pub mod runtime_adapters;
pub mod state;
pub mod store;

pub use config::Config;
pub use router::build_router;
pub use state::AppState;

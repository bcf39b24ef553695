//! Framework-agnostic HTTP adapter shape: request/response types, the §7
//! error taxonomy, and the session/token/recipient/permission middleware
//! bodies. Nothing here depends on axum or any other web framework — the
//! server crate owns that translation (§1 Non-goals).

pub mod auth;
pub mod error;
pub mod policy;
pub mod request;
pub mod response;

pub use auth::{
    require_api_token, require_recipient, require_session, strip_token_prefix, AdminSessionLookup,
    AdminSessionRow, ApiTokenLookup, ApiTokenRow, BundleAssignmentRow, RecipientSessionLookup,
    RecipientSessionRow,
};
pub use error::{from_authz_error, ApiError};
pub use policy::{require_permission, PolicyConfig};
pub use request::{parse_cookie_header, AuthenticatedUser, Request, UploadedFile};
pub use response::{Response, ResponseBody};

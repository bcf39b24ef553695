//! Glue between the persistence seam's errors and the §7 HTTP error
//! taxonomy. Handlers return `Result<_, latchflow_http::ApiError>` directly;
//! this is the only translation layer they need.

use latchflow_http::ApiError;

use crate::store::StoreError;

pub fn from_store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::not_found("resource not found"),
        StoreError::InUse(reason) => ApiError::in_use(reason),
        StoreError::Backend(reason) => ApiError::internal(reason),
    }
}

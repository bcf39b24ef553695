//! Recipient portal endpoints (§4.17): `/portal/me`, `/portal/bundles`,
//! `/portal/bundles/:id/objects`, `/portal/bundles/:id` (download).

use chrono::Utc;
use latchflow_http::ApiError;

use crate::error::from_store_error;
use crate::state::AppState;
use crate::store::{Assignment, Bundle, BundleObject, Recipient};

pub struct PortalMe {
    pub recipient: Recipient,
    pub bundles: Vec<(String, String)>,
}

pub async fn me(state: &AppState, recipient_id: &str) -> Result<PortalMe, ApiError> {
    let recipient = state
        .store
        .get_recipient(recipient_id)
        .await
        .map_err(from_store_error)?
        .ok_or_else(|| ApiError::not_found("recipient not found"))?;

    let assignments = state
        .store
        .list_assignments_for_recipient(recipient_id, 0, usize::MAX)
        .await
        .map_err(from_store_error)?;

    let mut bundles = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        if let Some(bundle) = state.store.get_bundle(&assignment.bundle_id).await.map_err(from_store_error)? {
            bundles.push((bundle.id, bundle.name));
        }
    }

    Ok(PortalMe { recipient, bundles })
}

pub struct BundleListEntry {
    pub bundle: Bundle,
    pub assignment: Assignment,
}

/// `limit` is clamped to `[1,100]` per §4.17.
pub async fn list_bundles(
    state: &AppState,
    recipient_id: &str,
    offset: usize,
    limit: usize,
) -> Result<Vec<BundleListEntry>, ApiError> {
    let limit = limit.clamp(1, 100);
    let assignments = state
        .store
        .list_assignments_for_recipient(recipient_id, offset, limit)
        .await
        .map_err(from_store_error)?;

    let mut out = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        if let Some(bundle) = state.store.get_bundle(&assignment.bundle_id).await.map_err(from_store_error)? {
            out.push(BundleListEntry { bundle, assignment });
        }
    }
    Ok(out)
}

pub async fn bundle_objects(state: &AppState, bundle_id: &str) -> Result<Vec<BundleObject>, ApiError> {
    let objects = state.store.list_bundle_objects(bundle_id).await.map_err(from_store_error)?;
    Ok(objects.into_iter().filter(|o| o.is_enabled).collect())
}

pub struct DownloadReady {
    pub storage_key: String,
    pub checksum: String,
}

/// Pre-check ordering per §4.17: verification → downloads-exhausted →
/// cooldown → bundle disabled/missing → pointer absent → success.
pub async fn prepare_download(
    state: &AppState,
    recipient_id: &str,
    bundle_id: &str,
) -> Result<DownloadReady, ApiError> {
    let recipient = state
        .store
        .get_recipient(recipient_id)
        .await
        .map_err(from_store_error)?
        .ok_or_else(|| ApiError::not_found("recipient not found"))?;

    let assignment = state
        .store
        .find_assignment(recipient_id, bundle_id)
        .await
        .map_err(from_store_error)?
        .ok_or_else(|| ApiError::not_found("assignment not found"))?;

    if recipient.verification_required && recipient.verified_at.is_none() {
        return Err(ApiError::verification_required());
    }

    if let Some(max) = assignment.max_downloads {
        if assignment.downloads_used >= max {
            return Err(ApiError::max_downloads_exceeded());
        }
    }

    let now = Utc::now();
    let remaining = assignment.cooldown_remaining_seconds(now);
    if remaining > 0 {
        return Err(ApiError::cooldown_active(remaining));
    }

    let bundle = state
        .store
        .get_bundle(bundle_id)
        .await
        .map_err(from_store_error)?
        .filter(|b| b.is_enabled)
        .ok_or_else(|| ApiError::not_found("bundle not found"))?;

    let (Some(storage_key), Some(checksum)) = (bundle.storage_key.clone(), bundle.checksum.clone()) else {
        return Err(ApiError::no_storage_path());
    };

    state
        .store
        .record_download(&assignment.id, now)
        .await
        .map_err(from_store_error)?;

    Ok(DownloadReady { storage_key, checksum })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{Bundle as StoreBundle, Recipient as StoreRecipient};
    use chrono::Duration;

    fn sample_config() -> Config {
        std::env::set_var("PORT", "3001");
        Config::from_env().expect("env config loads with defaults")
    }

    async fn seed(state: &AppState) {
        let now = Utc::now();
        state
            .store
            .put_recipient(StoreRecipient {
                id: "r-1".into(),
                email: "r1@example.com".into(),
                is_enabled: true,
                tags: vec![],
                verification_required: false,
                verified_at: None,
            })
            .await
            .unwrap();
        state
            .store
            .put_bundle(StoreBundle {
                id: "b-1".into(),
                name: "Bundle 1".into(),
                is_enabled: true,
                storage_key: Some("objects/sha256/aa/bb/hash".into()),
                checksum: Some("hash".into()),
                bundle_digest: Some("digest".into()),
                size: Some(10),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        state
            .store
            .put_assignment(Assignment {
                id: "a-1".into(),
                recipient_id: "r-1".into(),
                bundle_id: "b-1".into(),
                is_enabled: true,
                max_downloads: Some(1),
                downloads_used: 0,
                cooldown_seconds: Some(60),
                last_download_at: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_download_succeeds_second_is_exhausted() {
        let state = AppState::new(sample_config());
        seed(&state).await;

        let first = prepare_download(&state, "r-1", "b-1").await.unwrap();
        assert_eq!(first.checksum, "hash");

        let second = prepare_download(&state, "r-1", "b-1").await.unwrap_err();
        assert_eq!(second.code, "MAX_DOWNLOADS_EXCEEDED");
    }

    #[tokio::test]
    async fn cooldown_blocks_next_download() {
        let state = AppState::new(sample_config());
        seed(&state).await;
        {
            let mut assignment = state.store.get_assignment("a-1").await.unwrap().unwrap();
            assignment.max_downloads = Some(5);
            assignment.downloads_used = 1;
            assignment.last_download_at = Some(Utc::now() - Duration::seconds(10));
            state.store.put_assignment(assignment).await.unwrap();
        }

        let err = prepare_download(&state, "r-1", "b-1").await.unwrap_err();
        assert_eq!(err.code, "COOLDOWN_ACTIVE");
    }

    #[tokio::test]
    async fn missing_pointer_returns_no_storage_path() {
        let state = AppState::new(sample_config());
        seed(&state).await;
        {
            let mut bundle = state.store.get_bundle("b-1").await.unwrap().unwrap();
            bundle.storage_key = None;
            bundle.checksum = None;
            state.store.put_bundle(bundle).await.unwrap();
        }

        let err = prepare_download(&state, "r-1", "b-1").await.unwrap_err();
        assert_eq!(err.code, "NO_STORAGE_PATH");
    }
}

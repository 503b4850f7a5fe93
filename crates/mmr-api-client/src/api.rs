//! Admin operations of the media repository.
//!
//! The backend is not a CRUD API: it offers usage reports, scoped purges, datastore
//! management and a task list. Operations with no backend counterpart (unquarantine,
//! quarantine listing, cache management) fail with [`AdminError::Unsupported`] before
//! any request is made.

use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use mmr_core::models::{
    BackgroundTask, DatastoreDescriptor, DatastoreRecord, MediaSummary, PurgeOutcome, PurgeScope,
    QuarantineOutcome, ServerHealth, ServerUsage, SizeEstimate, TaskRef, UploadRecord, UserUsage,
    UserUsageRecord,
};
use mmr_core::{AdminError, AdminResult};
use std::collections::BTreeMap;

use crate::{encode_segment, error_from_response, ApiClient, DOWNLOAD_PREFIX};

/// Admin-relative path and query for a purge scope. Identifiers are percent-encoded.
pub fn purge_path(scope: &PurgeScope) -> String {
    match scope {
        PurgeScope::RemoteBefore { before_ts } => format!("/purge/remote?before_ts={}", before_ts),
        PurgeScope::Quarantined => "/purge/quarantined".to_string(),
        PurgeScope::StaleBefore {
            before_ts,
            include_local,
        } => format!(
            "/purge/old?before_ts={}&include_local={}",
            before_ts, include_local
        ),
        PurgeScope::ByUser { user_id, before_ts } => format!(
            "/purge/user/{}?before_ts={}",
            encode_segment(user_id),
            before_ts
        ),
        PurgeScope::ByRoom { room_id, before_ts } => format!(
            "/purge/room/{}?before_ts={}",
            encode_segment(room_id),
            before_ts
        ),
        PurgeScope::ByServer {
            server_name,
            before_ts,
        } => format!(
            "/purge/server/{}?before_ts={}",
            encode_segment(server_name),
            before_ts
        ),
    }
}

impl ApiClient {
    /// The server name goes into the path as is; `host:port` is a valid segment.
    fn usage_path(&self, suffix: &str) -> String {
        self.admin_path(&format!("/usage/{}{}", self.server_name(), suffix))
    }

    /// Uploads of this server summarized into counts, bytes and per-media descriptors.
    #[tracing::instrument(skip(self))]
    pub async fn list_media_summary(&self) -> AdminResult<MediaSummary> {
        let uploads: BTreeMap<String, UploadRecord> = self.get(&self.usage_path("/uploads")).await?;
        Ok(MediaSummary::from_uploads(uploads))
    }

    /// Delete a single piece of media.
    #[tracing::instrument(skip(self))]
    pub async fn delete_media(&self, media_id: &str) -> AdminResult<PurgeOutcome> {
        let path = self.admin_path(&format!("/purge/media/{}", encode_segment(media_id)));
        let outcome = self.post(&path, None).await?;
        tracing::info!(media_id = %media_id, "Media deleted");
        Ok(outcome)
    }

    /// Usage of one user; `None` when the server has no record of them.
    #[tracing::instrument(skip(self))]
    pub async fn user_usage(&self, user_id: &str) -> AdminResult<Option<UserUsage>> {
        let path = self.usage_path(&format!("/users?user_id={}", encode_segment(user_id)));
        let listing: BTreeMap<String, UserUsageRecord> = self.get(&path).await?;
        Ok(UserUsage::from_listing(listing)
            .into_iter()
            .find(|usage| usage.user_id == user_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn all_users_usage(&self) -> AdminResult<Vec<UserUsage>> {
        let listing: BTreeMap<String, UserUsageRecord> = self.get(&self.usage_path("/users")).await?;
        Ok(UserUsage::from_listing(listing))
    }

    #[tracing::instrument(skip(self))]
    pub async fn server_stats(&self) -> AdminResult<ServerUsage> {
        self.get(&self.usage_path("")).await
    }

    /// Health synthesized from the datastore listing: reachable means healthy. Uptime
    /// and version are not available from the backend and stay `None`.
    pub async fn server_health(&self) -> ServerHealth {
        match self.list_datastores().await {
            Ok(datastores) => {
                ServerHealth::healthy(datastores.into_iter().map(|d| d.id), Utc::now())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Health check failed");
                ServerHealth::unhealthy(err.message())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_datastores(&self) -> AdminResult<Vec<DatastoreDescriptor>> {
        let listing: BTreeMap<String, DatastoreRecord> =
            self.get(&self.admin_path("/datastores")).await?;
        Ok(DatastoreDescriptor::from_listing(listing))
    }

    #[tracing::instrument(skip(self))]
    pub async fn datastore_size_estimate(&self, datastore_id: &str) -> AdminResult<SizeEstimate> {
        let path = self.admin_path(&format!(
            "/datastores/{}/size_estimate",
            encode_segment(datastore_id)
        ));
        self.get(&path).await
    }

    /// Datastore listing with every size estimate fetched concurrently.
    pub async fn list_datastores_with_estimates(&self) -> AdminResult<Vec<DatastoreDescriptor>> {
        let datastores = self.list_datastores().await?;
        let estimates =
            try_join_all(datastores.iter().map(|d| self.datastore_size_estimate(&d.id))).await?;

        Ok(datastores
            .into_iter()
            .zip(estimates)
            .map(|(datastore, estimate)| DatastoreDescriptor {
                size_estimate: Some(estimate),
                ..datastore
            })
            .collect())
    }

    /// Start a background task moving all media from one datastore to another.
    #[tracing::instrument(skip(self))]
    pub async fn migrate_datastore(&self, from: &str, to: &str) -> AdminResult<TaskRef> {
        let path = self.admin_path(&format!(
            "/datastores/{}/transfer_to/{}",
            encode_segment(from),
            encode_segment(to)
        ));
        let task: TaskRef = self.post(&path, None).await?;
        tracing::info!(task_id = task.task_id, from = %from, to = %to, "Datastore migration started");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub async fn quarantine_media(&self, media_id: &str) -> AdminResult<QuarantineOutcome> {
        let path = self.admin_path(&format!("/quarantine/media/{}", encode_segment(media_id)));
        self.post(&path, None).await
    }

    #[tracing::instrument(skip(self), fields(scope = %scope))]
    pub async fn purge(&self, scope: &PurgeScope) -> AdminResult<PurgeOutcome> {
        let outcome: PurgeOutcome = self.post(&self.admin_path(&purge_path(scope)), None).await?;
        tracing::info!(affected = outcome.affected.len(), "Purge completed");
        Ok(outcome)
    }

    pub async fn list_all_tasks(&self) -> AdminResult<Vec<BackgroundTask>> {
        self.get(&self.admin_path("/tasks/all")).await
    }

    pub async fn list_unfinished_tasks(&self) -> AdminResult<Vec<BackgroundTask>> {
        self.get(&self.admin_path("/tasks/unfinished")).await
    }

    pub async fn task_detail(&self, task_id: i64) -> AdminResult<BackgroundTask> {
        self.get(&self.admin_path(&format!("/tasks/{}", task_id)))
            .await
    }

    /// Download the raw bytes of a piece of media through the authenticated media API.
    #[tracing::instrument(skip(self))]
    pub async fn download_media(&self, server_name: &str, media_id: &str) -> AdminResult<Bytes> {
        let url = format!(
            "{}{}/{}/{}",
            self.base_url(),
            DOWNLOAD_PREFIX,
            encode_segment(server_name),
            encode_segment(media_id)
        );
        let response = self
            .client()
            .get(&url)
            .bearer_auth(self.config().credential())
            .send()
            .await
            .map_err(|e| AdminError::transport("Failed to download media", e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .bytes()
            .await
            .map_err(|e| AdminError::transport("Failed to read media body", e))
    }

    /// Direct link to a piece of media with the credential in the query string, for
    /// handing to tools that cannot set headers.
    pub fn media_url(&self, server_name: &str, media_id: &str) -> String {
        self.build_url(&format!(
            "{}/{}/{}",
            DOWNLOAD_PREFIX,
            encode_segment(server_name),
            encode_segment(media_id)
        ))
    }

    pub fn unquarantine_media(&self, _media_id: &str) -> AdminResult<()> {
        Err(AdminError::Unsupported("unquarantine media"))
    }

    pub fn list_quarantined_media(&self) -> AdminResult<Vec<String>> {
        Err(AdminError::Unsupported("list quarantined media"))
    }

    pub fn cache_stats(&self) -> AdminResult<()> {
        Err(AdminError::Unsupported("cache statistics"))
    }

    pub fn clear_cache(&self) -> AdminResult<()> {
        Err(AdminError::Unsupported("clear cache"))
    }

    pub fn warm_cache(&self, _media_id: &str) -> AdminResult<()> {
        Err(AdminError::Unsupported("warm cache"))
    }
}

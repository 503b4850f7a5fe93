use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::datetime_from_millis;

/// One upload as reported by the uploads usage endpoint. The endpoint keys these
/// records by MXC URI, so the identifiers live in the map key, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub uploaded_by: String,
    #[serde(default)]
    pub datastore_id: String,
    #[serde(default)]
    pub datastore_location: Option<String>,
    #[serde(default)]
    pub sha256_hash: Option<String>,
    #[serde(default)]
    pub quarantined: bool,
    #[serde(default)]
    pub upload_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub created_ts: i64,
}

/// A single piece of media. Read-only snapshot; never cached by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub media_id: String,
    pub upload_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub upload_date: DateTime<Utc>,
    pub user_id: String,
    pub server_name: String,
    pub quarantined: bool,
    pub datastore_id: String,
}

impl MediaDescriptor {
    /// Build a descriptor from an MXC URI and its upload record.
    pub fn from_upload(mxc: &str, record: UploadRecord) -> Self {
        let (server_name, media_id) = split_mxc(mxc);
        Self {
            media_id,
            upload_name: record.upload_name,
            content_type: record.content_type,
            size_bytes: record.size_bytes,
            upload_date: datetime_from_millis(record.created_ts),
            user_id: record.uploaded_by,
            server_name,
            quarantined: record.quarantined,
            datastore_id: record.datastore_id,
        }
    }

    pub fn mxc_uri(&self) -> String {
        format!("mxc://{}/{}", self.server_name, self.media_id)
    }
}

/// Split `mxc://server/media_id` into its parts. Anything that is not an MXC URI is
/// treated as a bare media id with an unknown origin.
pub fn split_mxc(uri: &str) -> (String, String) {
    match uri.strip_prefix("mxc://").and_then(|rest| rest.split_once('/')) {
        Some((server, media_id)) => (server.to_string(), media_id.to_string()),
        None => (String::new(), uri.to_string()),
    }
}

/// Aggregate view of a server's uploads. The backend has no paginated "list all"
/// endpoint, so this is the closest thing to a media listing it offers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSummary {
    pub total_media: u64,
    pub total_bytes: u64,
    pub quarantined_media: u64,
    /// Newest first.
    pub media: Vec<MediaDescriptor>,
}

impl MediaSummary {
    pub fn from_uploads(uploads: BTreeMap<String, UploadRecord>) -> Self {
        let mut media: Vec<MediaDescriptor> = uploads
            .into_iter()
            .map(|(mxc, record)| MediaDescriptor::from_upload(&mxc, record))
            .collect();
        media.sort_by(|a, b| {
            b.upload_date
                .cmp(&a.upload_date)
                .then_with(|| a.media_id.cmp(&b.media_id))
        });

        Self {
            total_media: media.len() as u64,
            total_bytes: media.iter().map(|m| m.size_bytes).sum(),
            quarantined_media: media.iter().filter(|m| m.quarantined).count() as u64,
            media,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counter split between original media and generated thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageBreakdown {
    pub total: u64,
    pub media: u64,
    pub thumbnails: u64,
}

/// Server-wide usage from the usage endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerUsage {
    pub raw_bytes: UsageBreakdown,
    pub raw_counts: UsageBreakdown,
}

/// Per-user entry of the users usage endpoint, which keys entries by user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserUsageRecord {
    pub raw_bytes: UsageBreakdown,
    pub raw_counts: UsageBreakdown,
    pub uploads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsage {
    pub user_id: String,
    pub raw_bytes: UsageBreakdown,
    pub raw_counts: UsageBreakdown,
    /// MXC URIs uploaded by the user.
    pub uploads: Vec<String>,
}

impl UserUsage {
    /// Flatten the user-keyed listing, largest consumers first.
    pub fn from_listing(listing: BTreeMap<String, UserUsageRecord>) -> Vec<Self> {
        let mut users: Vec<UserUsage> = listing
            .into_iter()
            .map(|(user_id, record)| UserUsage {
                user_id,
                raw_bytes: record.raw_bytes,
                raw_counts: record.raw_counts,
                uploads: record.uploads,
            })
            .collect();
        users.sort_by(|a, b| {
            b.raw_bytes
                .total
                .cmp(&a.raw_bytes.total)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }
}

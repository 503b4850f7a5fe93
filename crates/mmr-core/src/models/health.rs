use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreHealth {
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
}

/// Health report synthesized from a datastore listing. The backend exposes no health
/// endpoint, so uptime and version are unknown and always `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub healthy: bool,
    pub uptime_secs: Option<u64>,
    pub version: Option<String>,
    pub datastores: BTreeMap<String, DatastoreHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerHealth {
    pub fn healthy(datastore_ids: impl IntoIterator<Item = String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            healthy: true,
            uptime_secs: None,
            version: None,
            datastores: datastore_ids
                .into_iter()
                .map(|id| {
                    (
                        id,
                        DatastoreHealth {
                            healthy: true,
                            last_check: checked_at,
                        },
                    )
                })
                .collect(),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            uptime_secs: None,
            version: None,
            datastores: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

//! Typed shapes of the media repository's admin API.
//!
//! The backend answers with loosely structured JSON (maps keyed by MXC URI, user id or
//! datastore id, optional fields everywhere). Each response is decoded into one of the
//! structs below at the client boundary; nothing untyped leaves the API client.

pub mod account;
pub mod datastore;
pub mod health;
pub mod media;
pub mod purge;
pub mod task;
pub mod usage;

pub use account::Identity;
pub use datastore::{DatastoreDescriptor, DatastoreKind, DatastoreRecord, SizeEstimate};
pub use health::{DatastoreHealth, ServerHealth};
pub use media::{MediaDescriptor, MediaSummary, UploadRecord};
pub use purge::{PurgeOutcome, PurgeScope, QuarantineOutcome};
pub use task::{BackgroundTask, TaskKind, TaskRef, TaskStatus};
pub use usage::{ServerUsage, UsageBreakdown, UserUsage, UserUsageRecord};

use chrono::{DateTime, TimeZone, Utc};

/// Convert epoch milliseconds to a UTC instant. Out-of-range values clamp to the epoch.
pub fn datetime_from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Criterion selecting which media a bulk purge removes.
///
/// `before_ts` is epoch milliseconds and is forwarded as given, future values included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PurgeScope {
    /// Cached remote media last accessed before `before_ts`.
    RemoteBefore { before_ts: i64 },
    /// Everything currently quarantined.
    Quarantined,
    /// Media not accessed since `before_ts`; local uploads only when `include_local`.
    StaleBefore { before_ts: i64, include_local: bool },
    ByUser { user_id: String, before_ts: i64 },
    ByRoom { room_id: String, before_ts: i64 },
    ByServer { server_name: String, before_ts: i64 },
}

impl PurgeScope {
    pub fn before_ts(&self) -> Option<i64> {
        match self {
            PurgeScope::Quarantined => None,
            PurgeScope::RemoteBefore { before_ts }
            | PurgeScope::StaleBefore { before_ts, .. }
            | PurgeScope::ByUser { before_ts, .. }
            | PurgeScope::ByRoom { before_ts, .. }
            | PurgeScope::ByServer { before_ts, .. } => Some(*before_ts),
        }
    }
}

impl Display for PurgeScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PurgeScope::RemoteBefore { before_ts } => write!(f, "remote media before {}", before_ts),
            PurgeScope::Quarantined => write!(f, "quarantined media"),
            PurgeScope::StaleBefore {
                before_ts,
                include_local,
            } => write!(
                f,
                "media unused since {} (include_local: {})",
                before_ts, include_local
            ),
            PurgeScope::ByUser { user_id, before_ts } => {
                write!(f, "media of user {} before {}", user_id, before_ts)
            }
            PurgeScope::ByRoom { room_id, before_ts } => {
                write!(f, "media of room {} before {}", room_id, before_ts)
            }
            PurgeScope::ByServer {
                server_name,
                before_ts,
            } => write!(f, "media of server {} before {}", server_name, before_ts),
        }
    }
}

/// Result of a purge call: the MXC URIs that were removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeOutcome {
    pub purged: bool,
    pub affected: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantineOutcome {
    pub num_quarantined: u64,
}

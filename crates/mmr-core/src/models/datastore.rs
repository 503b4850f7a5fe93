use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kind of storage a datastore writes blobs to.
///
/// Aliases of object storage (`object-store`, `object_store`) all read in as
/// [`DatastoreKind::ObjectStore`], which is written back in its canonical form `s3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatastoreKind {
    File,
    /// S3-compatible object storage.
    ObjectStore,
    Other(String),
}

impl From<String> for DatastoreKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "file" => DatastoreKind::File,
            "s3" | "object-store" | "object_store" => DatastoreKind::ObjectStore,
            _ => DatastoreKind::Other(s),
        }
    }
}

impl Default for DatastoreKind {
    fn default() -> Self {
        DatastoreKind::Other(String::new())
    }
}

impl From<DatastoreKind> for String {
    fn from(kind: DatastoreKind) -> Self {
        kind.to_string()
    }
}

impl Display for DatastoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DatastoreKind::File => write!(f, "file"),
            DatastoreKind::ObjectStore => write!(f, "s3"),
            DatastoreKind::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Datastore entry of the listing endpoint, which keys entries by datastore id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreRecord {
    #[serde(rename = "type", default)]
    pub kind: DatastoreKind,
    #[serde(default)]
    pub uri: String,
}

/// Byte and record counts a datastore holds, split between original media and
/// generated thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeEstimate {
    pub thumbnails_affected: u64,
    pub thumbnail_hashes_affected: u64,
    pub thumbnail_bytes: u64,
    pub media_affected: u64,
    pub media_hashes_affected: u64,
    pub media_bytes: u64,
    pub total_hashes_affected: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreDescriptor {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: DatastoreKind,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_estimate: Option<SizeEstimate>,
}

impl DatastoreDescriptor {
    /// Flatten the id-keyed listing into descriptors, ordered by id.
    pub fn from_listing(listing: BTreeMap<String, DatastoreRecord>) -> Vec<Self> {
        listing
            .into_iter()
            .map(|(id, record)| DatastoreDescriptor {
                id,
                kind: record.kind,
                uri: record.uri,
                size_estimate: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datastore_kind_from_wire() {
        assert_eq!(DatastoreKind::from("file".to_string()), DatastoreKind::File);
        assert_eq!(DatastoreKind::from("S3".to_string()), DatastoreKind::ObjectStore);
        assert_eq!(
            DatastoreKind::from("ipfs".to_string()),
            DatastoreKind::Other("ipfs".to_string())
        );
        assert_eq!(DatastoreKind::ObjectStore.to_string(), "s3");
    }

    #[test]
    fn object_store_aliases_serialize_as_s3() {
        let kind: DatastoreKind = serde_json::from_str(r#""object-store""#).unwrap();
        assert_eq!(kind, DatastoreKind::ObjectStore);
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""s3""#);
    }

    #[test]
    fn record_without_type_is_accepted() {
        let listing: BTreeMap<String, DatastoreRecord> =
            serde_json::from_str(r#"{"ds1":{"uri":"/data"}}"#).unwrap();
        let datastores = DatastoreDescriptor::from_listing(listing);
        assert_eq!(datastores[0].kind, DatastoreKind::Other(String::new()));
        assert_eq!(datastores[0].uri, "/data");
    }

    #[test]
    fn listing_is_flattened_by_id() {
        let listing: BTreeMap<String, DatastoreRecord> = serde_json::from_value(serde_json::json!({
            "zeta": { "type": "s3", "uri": "s3://bucket" },
            "alpha": { "type": "file", "uri": "/var/lib/media" }
        }))
        .unwrap();

        let datastores = DatastoreDescriptor::from_listing(listing);
        assert_eq!(datastores.len(), 2);
        assert_eq!(datastores[0].id, "alpha");
        assert_eq!(datastores[0].kind, DatastoreKind::File);
        assert_eq!(datastores[1].kind, DatastoreKind::ObjectStore);
        assert!(datastores[1].size_estimate.is_none());
    }

    #[test]
    fn size_estimate_defaults_missing_counters() {
        let estimate: SizeEstimate =
            serde_json::from_str(r#"{"media_bytes": 10, "total_bytes": 12}"#).unwrap();
        assert_eq!(estimate.media_bytes, 10);
        assert_eq!(estimate.thumbnail_bytes, 0);
        assert_eq!(estimate.total_bytes, 12);
    }
}

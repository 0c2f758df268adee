//! Crash-recovery snapshots of the record store. The on-disk form is a JSON
//! object of string-encoded owner ids to objects of string-encoded key ids
//! to address lists. A snapshot is an aid, not a consistency mechanism:
//! reads after a restart may be stale until maintenance refreshes them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::utils::error::{Error, Result};
use crate::utils::types::{Address, HashPos, RecordSet};

#[derive(Serialize, Deserialize)]
struct SnapshotDoc(BTreeMap<String, BTreeMap<String, Vec<String>>>);

/// Stable per-node file under `data_dir`, derived from the bind address.
pub fn snapshot_path(data_dir: &Path, address: &Address) -> PathBuf {
    data_dir.join(format!("{}.json", address.replace(':', "_")))
}

/// Rewrites the file in full with the given storage map.
pub async fn save(path: &Path, shards: HashMap<HashPos, RecordSet>) -> Result<()> {
    let doc = SnapshotDoc(
        shards
            .into_iter()
            .map(|(owner, records)| {
                let records = records
                    .into_iter()
                    .map(|(key, ips)| (key.to_string(), ips))
                    .collect();
                (owner.to_string(), records)
            })
            .collect(),
    );

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec(&doc).map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    fs::write(path, bytes).await?;
    Ok(())
}

pub async fn load(path: &Path) -> Result<HashMap<HashPos, RecordSet>> {
    let bytes = fs::read(path).await?;
    let SnapshotDoc(doc) =
        serde_json::from_slice(&bytes).map_err(|e| Error::SnapshotFormat(e.to_string()))?;

    let mut shards = HashMap::new();
    for (owner, records) in doc {
        let mut shard = RecordSet::new();
        for (key, ips) in records {
            shard.insert(parse_id(&key)?, ips);
        }
        shards.insert(parse_id(&owner)?, shard);
    }
    Ok(shards)
}

fn parse_id(raw: &str) -> Result<HashPos> {
    raw.parse()
        .map_err(|_| Error::SnapshotFormat(format!("id {:?} is not a u64", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_stable_and_filesystem_safe() {
        let path = snapshot_path(Path::new("data"), &"127.0.0.1:5601".to_string());
        assert_eq!(path, PathBuf::from("data/127.0.0.1_5601.json"));
    }

    #[tokio::test]
    async fn cold_start_restores_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), &"127.0.0.1:5601".to_string());

        let mut shards = HashMap::new();
        shards.insert(
            100u64,
            RecordSet::from([(42u64, vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()])]),
        );
        shards.insert(80u64, RecordSet::from([(7u64, vec!["9.9.9.9".to_string()])]));

        save(&path, shards.clone()).await.unwrap();
        let restored = load(&path).await.unwrap();
        assert_eq!(restored, shards);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), &"127.0.0.1:9999".to_string());
        assert!(matches!(load(&path).await, Err(Error::SnapshotIo(_))));
    }

    #[tokio::test]
    async fn garbage_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{\"not\": \"a snapshot\"").await.unwrap();
        assert!(matches!(load(&path).await, Err(Error::SnapshotFormat(_))));
    }
}

//! Atomic manifest persistence.
//!
//! Every manifest write follows the atomic-replace protocol: write the
//! full document to a temporary file in the target directory, flush it
//! to disk, then rename over the destination. Readers always see either
//! the previous consistent manifest or the new one, never a partial
//! write. Failures clean up the temporary file and propagate: manifest
//! integrity errors are fatal.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Atomically replace `path` with the JSON serialization of `manifest`.
pub fn write_atomic<T: Serialize>(path: &Path, manifest: &T) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("manifest path {} has no parent", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create {}", dir.display()))?;

    let json = serde_json::to_string_pretty(manifest).context("serialize manifest")?;

    // The temp file lives in the destination directory so the rename
    // stays on one filesystem. NamedTempFile removes it on drop if
    // anything below fails.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("could not create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("could not write manifest {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("could not replace manifest {}", path.display()))?;
    Ok(())
}

/// Read and deserialize a manifest.
pub fn read<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read manifest {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("malformed manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        status: String,
        completed: u32,
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league-test.json");
        let doc = Doc {
            status: "in_progress".to_string(),
            completed: 3,
        };
        write_atomic(&path, &doc).unwrap();
        let loaded: Doc = read(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn rewrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write_atomic(
            &path,
            &Doc {
                status: "in_progress".to_string(),
                completed: 1,
            },
        )
        .unwrap();
        write_atomic(
            &path,
            &Doc {
                status: "complete".to_string(),
                completed: 2,
            },
        )
        .unwrap();
        let loaded: Doc = read(&path).unwrap();
        assert_eq!(loaded.completed, 2);
        // No stray temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "m.json")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn existing_manifest_survives_serialization_of_next_state() {
        // A reader between two writes sees a complete document.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        write_atomic(
            &path,
            &Doc {
                status: "in_progress".to_string(),
                completed: 9,
            },
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Doc>(&text).is_ok());
    }
}

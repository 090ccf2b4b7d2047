//! CDN asset mirror driven by a persisted path -> hash state file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::files::RepoFile;
use crate::write_atomic;

pub const SYNC_STATE_FILE: &str = "sync-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoAssetState {
    #[serde(default)]
    pub assets: Vec<RepoFile>,
}

/// Contents of `sync-state.json`, keyed by repository working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(pub BTreeMap<String, RepoAssetState>);

impl SyncState {
    pub fn assets_for(&self, repo_dir: &str) -> &[RepoFile] {
        self.0
            .get(repo_dir)
            .map(|s| s.assets.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSyncPlan {
    pub copy: Vec<RepoFile>,
    pub skip: Vec<RepoFile>,
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetSyncReport {
    pub copied: usize,
    pub skipped: usize,
    pub deleted: usize,
}

/// Diff the previous listing against the current one.
pub fn plan_asset_sync(previous: &[RepoFile], current: &[RepoFile]) -> AssetSyncPlan {
    let previous_hashes: HashMap<&str, &str> = previous
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();

    let mut plan = AssetSyncPlan::default();
    let mut seen = HashSet::new();
    for file in current {
        seen.insert(file.path.as_str());
        if previous_hashes.get(file.path.as_str()) == Some(&file.hash.as_str()) {
            plan.skip.push(file.clone());
        } else {
            plan.copy.push(file.clone());
        }
    }
    plan.delete = previous
        .iter()
        .filter(|f| !seen.contains(f.path.as_str()))
        .map(|f| f.path.clone())
        .collect();
    plan
}

/// Sole writer of the CDN directory and its state file.
#[derive(Debug, Clone)]
pub struct AssetMirror {
    cdn_root: PathBuf,
}

impl AssetMirror {
    pub fn new(cdn_root: impl Into<PathBuf>) -> Self {
        Self {
            cdn_root: cdn_root.into(),
        }
    }

    pub fn cdn_root(&self) -> &Path {
        &self.cdn_root
    }

    pub fn state_path(&self) -> PathBuf {
        self.cdn_root.join(SYNC_STATE_FILE)
    }

    pub async fn load_state(&self) -> anyhow::Result<SyncState> {
        let path = self.state_path();
        match fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub async fn save_state(&self, state: &SyncState) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("serializing sync state")?;
        write_atomic(&self.state_path(), &bytes).await
    }

    /// Mirror `assets` (paths relative to `repo_dir`) into the CDN root.
    ///
    /// The state file is only written once every copy and delete succeeded,
    /// so an interrupted run is redone in full from the last written state.
    pub async fn sync_assets(&self, repo_dir: &Path, assets: &[RepoFile]) -> anyhow::Result<AssetSyncReport> {
        let key = repo_dir.display().to_string();
        let mut state = self.load_state().await?;
        let plan = plan_asset_sync(state.assets_for(&key), assets);

        for file in &plan.copy {
            let source = repo_dir.join(&file.path);
            let target = self.cdn_root.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::copy(&source, &target)
                .await
                .with_context(|| format!("copying {} -> {}", source.display(), target.display()))?;
            debug!(path = %file.path, "copied asset");
        }

        let mut deleted = 0;
        for path in &plan.delete {
            let target = self.cdn_root.join(path);
            match fs::remove_file(&target).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path, "deleted asset");
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("deleting {}", target.display()));
                }
            }
        }

        state.0.insert(
            key,
            RepoAssetState {
                assets: assets.to_vec(),
            },
        );
        self.save_state(&state).await?;

        let report = AssetSyncReport {
            copied: plan.copy.len(),
            skipped: plan.skip.len(),
            deleted,
        };
        info!(
            repo = %repo_dir.display(),
            copied = report.copied,
            skipped = report.skipped,
            deleted = report.deleted,
            "assets mirrored"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, hash: &str) -> RepoFile {
        RepoFile {
            path: path.into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn plan_copies_new_deletes_missing_and_skips_unchanged() {
        let previous = vec![file("a", "hash1"), file("b", "hash2")];
        let current = vec![file("a", "hash1"), file("c", "hash3")];

        let plan = plan_asset_sync(&previous, &current);

        assert_eq!(plan.copy, vec![file("c", "hash3")]);
        assert_eq!(plan.skip, vec![file("a", "hash1")]);
        assert_eq!(plan.delete, vec!["b".to_string()]);
    }

    #[test]
    fn changed_hash_is_copied_again() {
        let plan = plan_asset_sync(&[file("a", "old")], &[file("a", "new")]);
        assert_eq!(plan.copy.len(), 1);
        assert!(plan.delete.is_empty());
    }

    #[tokio::test]
    async fn mirror_applies_diff_and_merges_state() {
        let repo = tempfile::tempdir().expect("repo");
        let cdn = tempfile::tempdir().expect("cdn");
        let mirror = AssetMirror::new(cdn.path());

        for name in ["a", "b", "c"] {
            let path = repo.path().join("courses/x/assets").join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, name).unwrap();
        }
        let a = file("courses/x/assets/a", "hash1");
        let b = file("courses/x/assets/b", "hash2");
        let c = file("courses/x/assets/c", "hash3");

        let mut seeded = SyncState::default();
        seeded.0.insert(
            "/elsewhere/private".into(),
            RepoAssetState {
                assets: vec![file("p", "h")],
            },
        );
        mirror.save_state(&seeded).await.unwrap();

        let first = mirror
            .sync_assets(repo.path(), &[a.clone(), b.clone()])
            .await
            .expect("first sync");
        assert_eq!(first, AssetSyncReport { copied: 2, skipped: 0, deleted: 0 });

        std::fs::write(cdn.path().join("courses/x/assets/a"), "untouched").unwrap();
        let second = mirror
            .sync_assets(repo.path(), &[a.clone(), c.clone()])
            .await
            .expect("second sync");
        assert_eq!(second, AssetSyncReport { copied: 1, skipped: 1, deleted: 1 });

        assert!(!cdn.path().join("courses/x/assets/b").exists());
        assert!(cdn.path().join("courses/x/assets/c").exists());
        assert_eq!(
            std::fs::read_to_string(cdn.path().join("courses/x/assets/a")).unwrap(),
            "untouched"
        );

        let state = mirror.load_state().await.unwrap();
        let key = repo.path().display().to_string();
        assert_eq!(state.assets_for(&key), &[a, c]);
        assert_eq!(state.assets_for("/elsewhere/private"), &[file("p", "h")]);
    }

    #[tokio::test]
    async fn missing_state_file_means_first_run() {
        let cdn = tempfile::tempdir().expect("cdn");
        let state = AssetMirror::new(cdn.path()).load_state().await.unwrap();
        assert_eq!(state, SyncState::default());
    }
}

//! Tracked-file listing split into parseable content and mirrored assets.

use std::time::UNIX_EPOCH;

use anyhow::Context;
use edu_core::ChangedFile;
use serde::{Deserialize, Serialize};

use crate::git::{GitBackend, GitError, GitHandle};

/// A tracked file and its blob hash at the checked-out ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFilter {
    /// Text files to parse: everything outside `assets` directories.
    Content,
    /// Binary files to mirror: inside `assets`, not marked `soon`.
    Assets,
}

impl FileFilter {
    pub fn accepts(&self, path: &str) -> bool {
        if is_hidden(path) {
            return false;
        }
        let has_segment = |name: &str| path.split('/').any(|segment| segment == name);
        match self {
            FileFilter::Content => !has_segment("assets"),
            FileFilter::Assets => has_segment("assets") && !has_segment("soon"),
        }
    }
}

/// Dotfiles and anything under a dot-directory.
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}

/// Parse `git ls-tree -r -z` output, keeping blobs only.
pub fn parse_ls_tree(output: &str) -> Vec<RepoFile> {
    output
        .split('\0')
        .filter_map(|entry| {
            let (meta, path) = entry.split_once('\t')?;
            let mut parts = meta.split_whitespace();
            let _mode = parts.next()?;
            let kind = parts.next()?;
            let hash = parts.next()?;
            (kind == "blob").then(|| RepoFile {
                path: path.to_string(),
                hash: hash.to_string(),
            })
        })
        .collect()
}

pub async fn list_files(
    git: &dyn GitBackend,
    handle: &GitHandle,
    filter: FileFilter,
) -> Result<Vec<RepoFile>, GitError> {
    let listing = git.list_tree(&handle.dir).await?;
    Ok(parse_ls_tree(&listing)
        .into_iter()
        .filter(|f| filter.accepts(&f.path))
        .collect())
}

/// Wrap every content file in a lazily-read [`ChangedFile`].
///
/// Symlinks are stat'ed themselves, so a dangling link surfaces later as a
/// read error on that one file.
pub async fn load_repo_content_files(
    git: &dyn GitBackend,
    handle: &GitHandle,
) -> anyhow::Result<Vec<ChangedFile>> {
    let files = list_files(git, handle, FileFilter::Content).await?;
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let absolute = handle.dir.join(&file.path);
        let metadata = tokio::fs::symlink_metadata(&absolute)
            .await
            .with_context(|| format!("stat {}", absolute.display()))?;
        let modified_at_millis = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        out.push(ChangedFile::on_disk(
            file.path,
            file.hash,
            modified_at_millis,
            handle.commit.clone(),
            absolute,
        ));
    }
    Ok(out)
}

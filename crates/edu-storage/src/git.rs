//! Repository sync driver: shallow clone on first use, hard reset + fetch +
//! pull afterwards.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("could not run git {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("git {step} failed in {dir}: {message}")]
    Command {
        step: &'static str,
        dir: String,
        message: String,
    },
    #[error("preparing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to {action} repository {url}")]
    Repository {
        action: &'static str,
        url: String,
        #[source]
        source: Box<GitError>,
    },
}

impl GitError {
    fn for_repository(self, action: &'static str, url: &str) -> Self {
        GitError::Repository {
            action,
            url: url.to_string(),
            source: Box::new(self),
        }
    }
}

/// Remote repository to mirror locally.
#[derive(Debug, Clone)]
pub struct RepositorySpec {
    pub url: String,
    pub branch: String,
    pub auth_token: Option<String>,
}

impl RepositorySpec {
    /// `http.<url>.extraheader` value for private repositories.
    pub fn auth_header(&self) -> Option<String> {
        self.auth_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|token| format!("Authorization: Basic {}", STANDARD.encode(token)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Cloned,
    Pulled,
    UpToDate,
}

/// Checked-out working directory, usable for listing files.
#[derive(Debug, Clone)]
pub struct GitHandle {
    pub dir: PathBuf,
    pub url: String,
    pub branch: String,
    pub commit: String,
    pub outcome: SyncOutcome,
}

/// Git plumbing needed by the sync driver and the enumerator.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Current local branch, or `None` when `dir` is not a repository.
    async fn current_branch(&self, dir: &Path) -> Option<String>;

    async fn clone_shallow(&self, repo: &RepositorySpec, dir: &Path) -> Result<(), GitError>;

    async fn reset_hard(&self, dir: &Path) -> Result<(), GitError>;

    /// Fetch `origin/<branch>` and return the fetched commit hash.
    async fn fetch(&self, repo: &RepositorySpec, dir: &Path) -> Result<String, GitError>;

    async fn head_commit(&self, dir: &Path) -> Result<String, GitError>;

    /// Move the working tree to the previously fetched `origin/<branch>`.
    async fn pull(&self, repo: &RepositorySpec, dir: &Path) -> Result<(), GitError>;

    /// NUL-separated `ls-tree -r` listing of `HEAD`.
    async fn list_tree(&self, dir: &Path) -> Result<String, GitError>;
}

/// Directory name used for a repository's working copy, e.g.
/// `https://github.com/org/content.git` -> `content`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.trim_end_matches(".git").to_string()
}

/// Bring `local_dir` in line with the remote branch.
pub async fn sync_repository(
    git: &dyn GitBackend,
    repo: &RepositorySpec,
    local_dir: &Path,
) -> Result<GitHandle, GitError> {
    let local_branch = git.current_branch(local_dir).await;

    let outcome = if local_branch.as_deref() != Some(repo.branch.as_str()) {
        info!(url = %repo.url, branch = %repo.branch, dir = %local_dir.display(), "cloning repository");
        remove_dir_if_exists(local_dir)
            .await
            .map_err(|e| e.for_repository("clone", &repo.url))?;
        git.clone_shallow(repo, local_dir)
            .await
            .map_err(|e| e.for_repository("clone", &repo.url))?;
        SyncOutcome::Cloned
    } else {
        git.reset_hard(local_dir)
            .await
            .map_err(|e| e.for_repository("reset", &repo.url))?;
        let remote = git
            .fetch(repo, local_dir)
            .await
            .map_err(|e| e.for_repository("fetch", &repo.url))?;
        let local = git
            .head_commit(local_dir)
            .await
            .map_err(|e| e.for_repository("fetch", &repo.url))?;

        if remote == local {
            info!(url = %repo.url, commit = %local, "repository up to date");
            SyncOutcome::UpToDate
        } else {
            info!(url = %repo.url, from = %local, to = %remote, "pulling repository");
            git.pull(repo, local_dir)
                .await
                .map_err(|e| e.for_repository("pull", &repo.url))?;
            SyncOutcome::Pulled
        }
    };

    let commit = git
        .head_commit(local_dir)
        .await
        .map_err(|e| e.for_repository("read", &repo.url))?;

    Ok(GitHandle {
        dir: local_dir.to_path_buf(),
        url: repo.url.clone(),
        branch: repo.branch.clone(),
        commit,
        outcome,
    })
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), GitError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(GitError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    }
    if let Some(parent) = dir.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| GitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

/// [`GitBackend`] driving the `git` executable.
#[derive(Debug, Clone)]
pub struct CliGit {
    program: PathBuf,
}

impl Default for CliGit {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl CliGit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(
        &self,
        step: &'static str,
        dir: Option<&Path>,
        repo: Option<&RepositorySpec>,
        args: &[&str],
    ) -> Result<String, GitError> {
        let mut cmd = Command::new(&self.program);
        if let Some(header) = repo.and_then(|r| r.auth_header().map(|h| (r, h))) {
            let (repo, header) = header;
            cmd.arg("-c")
                .arg(format!("http.{}.extraheader={}", repo.url, header));
        }
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");

        debug!(step, ?args, "running git");
        let output = cmd
            .output()
            .await
            .map_err(|source| GitError::Spawn { step, source })?;

        if !output.status.success() {
            return Err(GitError::Command {
                step,
                dir: dir.map(|d| d.display().to_string()).unwrap_or_default(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

#[async_trait]
impl GitBackend for CliGit {
    async fn current_branch(&self, dir: &Path) -> Option<String> {
        // rev-parse would otherwise walk up into an enclosing repository.
        if !dir.join(".git").exists() {
            return None;
        }
        let out = self
            .run("rev-parse", Some(dir), None, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()?;
        let branch = out.trim();
        (!branch.is_empty() && branch != "HEAD").then(|| branch.to_string())
    }

    async fn clone_shallow(&self, repo: &RepositorySpec, dir: &Path) -> Result<(), GitError> {
        let dir_arg = dir.to_string_lossy();
        self.run(
            "clone",
            None,
            Some(repo),
            &[
                "clone",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                &repo.branch,
                &repo.url,
                &dir_arg,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn reset_hard(&self, dir: &Path) -> Result<(), GitError> {
        self.run("reset", Some(dir), None, &["reset", "--hard", "HEAD"])
            .await
            .map(|_| ())
    }

    async fn fetch(&self, repo: &RepositorySpec, dir: &Path) -> Result<String, GitError> {
        let refspec = format!("+refs/heads/{}:{}", repo.branch, remote_ref(&repo.branch));
        self.run(
            "fetch",
            Some(dir),
            Some(repo),
            &["fetch", "--depth", "1", "origin", &refspec],
        )
        .await?;
        let out = self
            .run("rev-parse", Some(dir), None, &["rev-parse", &remote_ref(&repo.branch)])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn head_commit(&self, dir: &Path) -> Result<String, GitError> {
        let out = self
            .run("rev-parse", Some(dir), None, &["rev-parse", "HEAD"])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn pull(&self, repo: &RepositorySpec, dir: &Path) -> Result<(), GitError> {
        // A depth-1 history has no merge base to fast-forward from, so the
        // branch is moved straight onto the fetched commit.
        self.run(
            "pull",
            Some(dir),
            None,
            &["reset", "--hard", &remote_ref(&repo.branch)],
        )
        .await
        .map(|_| ())
    }

    async fn list_tree(&self, dir: &Path) -> Result<String, GitError> {
        self.run(
            "ls-tree",
            Some(dir),
            None,
            &["ls-tree", "-r", "-z", "--full-tree", "HEAD"],
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted backend recording every call it receives.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingGit {
        pub branch: Option<String>,
        pub local_commit: String,
        pub remote_commit: String,
        pub tree: String,
        pub fail_fetch: bool,
        pub calls: Mutex<Vec<&'static str>>,
        pub pulled: Mutex<bool>,
    }

    impl RecordingGit {
        pub(crate) fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl GitBackend for RecordingGit {
        async fn current_branch(&self, _dir: &Path) -> Option<String> {
            self.record("current_branch");
            self.branch.clone()
        }

        async fn clone_shallow(&self, _repo: &RepositorySpec, dir: &Path) -> Result<(), GitError> {
            self.record("clone");
            tokio::fs::create_dir_all(dir.join(".git")).await.unwrap();
            Ok(())
        }

        async fn reset_hard(&self, _dir: &Path) -> Result<(), GitError> {
            self.record("reset");
            Ok(())
        }

        async fn fetch(&self, _repo: &RepositorySpec, dir: &Path) -> Result<String, GitError> {
            self.record("fetch");
            if self.fail_fetch {
                return Err(GitError::Command {
                    step: "fetch",
                    dir: dir.display().to_string(),
                    message: "could not resolve host".into(),
                });
            }
            Ok(self.remote_commit.clone())
        }

        async fn head_commit(&self, _dir: &Path) -> Result<String, GitError> {
            self.record("head_commit");
            if *self.pulled.lock().unwrap() {
                Ok(self.remote_commit.clone())
            } else {
                Ok(self.local_commit.clone())
            }
        }

        async fn pull(&self, _repo: &RepositorySpec, _dir: &Path) -> Result<(), GitError> {
            self.record("pull");
            *self.pulled.lock().unwrap() = true;
            Ok(())
        }

        async fn list_tree(&self, _dir: &Path) -> Result<String, GitError> {
            self.record("list_tree");
            Ok(self.tree.clone())
        }
    }

    fn spec() -> RepositorySpec {
        RepositorySpec {
            url: "https://github.com/example/content.git".into(),
            branch: "main".into(),
            auth_token: None,
        }
    }

    #[tokio::test]
    async fn fresh_directory_is_cloned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("content");
        let git = RecordingGit {
            local_commit: "aaa".into(),
            ..Default::default()
        };

        let handle = sync_repository(&git, &spec(), &local).await.expect("sync");

        assert_eq!(handle.outcome, SyncOutcome::Cloned);
        assert_eq!(git.calls(), vec!["current_branch", "clone", "head_commit"]);
    }

    #[tokio::test]
    async fn other_branch_is_wiped_and_recloned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("content");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("stale.md"), "old").unwrap();
        let git = RecordingGit {
            branch: Some("dev".into()),
            local_commit: "aaa".into(),
            ..Default::default()
        };

        let handle = sync_repository(&git, &spec(), &local).await.expect("sync");

        assert_eq!(handle.outcome, SyncOutcome::Cloned);
        assert!(!local.join("stale.md").exists());
    }

    #[tokio::test]
    async fn identical_remote_hash_skips_pull() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit {
            branch: Some("main".into()),
            local_commit: "abc123".into(),
            remote_commit: "abc123".into(),
            ..Default::default()
        };

        let handle = sync_repository(&git, &spec(), dir.path()).await.expect("sync");

        assert_eq!(handle.outcome, SyncOutcome::UpToDate);
        assert_eq!(handle.commit, "abc123");
        assert!(!git.calls().contains(&"pull"));
        assert!(!git.calls().contains(&"clone"));
    }

    #[tokio::test]
    async fn new_remote_commit_is_pulled_after_reset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit {
            branch: Some("main".into()),
            local_commit: "old".into(),
            remote_commit: "new".into(),
            ..Default::default()
        };

        let handle = sync_repository(&git, &spec(), dir.path()).await.expect("sync");

        assert_eq!(handle.outcome, SyncOutcome::Pulled);
        assert_eq!(handle.commit, "new");
        let calls = git.calls();
        let reset = calls.iter().position(|c| *c == "reset").unwrap();
        let fetch = calls.iter().position(|c| *c == "fetch").unwrap();
        assert!(reset < fetch);
        assert!(calls.contains(&"pull"));
    }

    #[tokio::test]
    async fn fetch_failure_names_the_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = RecordingGit {
            branch: Some("main".into()),
            fail_fetch: true,
            ..Default::default()
        };

        let err = sync_repository(&git, &spec(), dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("github.com/example/content.git"));
        assert!(err.to_string().contains("fetch"));
    }

    #[test]
    fn auth_header_is_base64_of_token() {
        let mut repo = spec();
        assert!(repo.auth_header().is_none());
        repo.auth_token = Some("user:secret".into());
        assert_eq!(
            repo.auth_header().as_deref(),
            Some("Authorization: Basic dXNlcjpzZWNyZXQ=")
        );
    }

    #[test]
    fn repo_name_strips_git_suffix() {
        assert_eq!(repo_name_from_url("https://github.com/org/content.git"), "content");
        assert_eq!(repo_name_from_url("https://github.com/org/private-data/"), "private-data");
        assert_eq!(repo_name_from_url("git@github.com:org/bec.git"), "bec");
    }
}

//! Core content model shared by the sync pipeline crates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "edu-core";

/// Kind of content stored in the data repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Resources,
    Courses,
    Legals,
    Tutorials,
    Blogs,
    QuizQuestions,
    Professors,
    Events,
    BCertificates,
}

impl ContentType {
    /// Order in which content types are imported and reconciled.
    pub const IMPORT_ORDER: [ContentType; 9] = [
        ContentType::Resources,
        ContentType::Courses,
        ContentType::Legals,
        ContentType::Tutorials,
        ContentType::Blogs,
        ContentType::QuizQuestions,
        ContentType::Professors,
        ContentType::Events,
        ContentType::BCertificates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Resources => "resources",
            ContentType::Courses => "courses",
            ContentType::Legals => "legals",
            ContentType::Tutorials => "tutorials",
            ContentType::Blogs => "blogs",
            ContentType::QuizQuestions => "quiz_questions",
            ContentType::Professors => "professors",
            ContentType::Events => "events",
            ContentType::BCertificates => "b_certificates",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum FileSource {
    Disk(PathBuf),
    Inline(Arc<[u8]>),
}

/// A tracked repository file at its current committed state.
///
/// Bytes are never read eagerly; `load` performs the read on demand.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub content_hash: String,
    pub modified_at_millis: i64,
    pub commit: String,
    source: FileSource,
}

impl ChangedFile {
    pub fn on_disk(
        path: impl Into<String>,
        content_hash: impl Into<String>,
        modified_at_millis: i64,
        commit: impl Into<String>,
        absolute_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            modified_at_millis,
            commit: commit.into(),
            source: FileSource::Disk(absolute_path.into()),
        }
    }

    /// File backed by bytes already in memory, used for fixtures and replays.
    pub fn from_bytes(path: impl Into<String>, bytes: impl Into<Vec<u8>>, modified_at_millis: i64) -> Self {
        Self {
            path: path.into(),
            content_hash: String::new(),
            modified_at_millis,
            commit: String::new(),
            source: FileSource::Inline(Arc::from(bytes.into())),
        }
    }

    pub fn absolute_path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Disk(path) => Some(path),
            FileSource::Inline(_) => None,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.modified_at_millis)
            .single()
            .unwrap_or_default()
    }

    /// File name without its directory, e.g. `course.yml`.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lower-cased file stem, which is the language code for localized files.
    pub fn language(&self) -> String {
        let name = self.file_name();
        let stem = name.split_once('.').map(|(stem, _)| stem).unwrap_or(name);
        stem.to_lowercase()
    }

    pub async fn load(&self) -> anyhow::Result<Vec<u8>> {
        match &self.source {
            FileSource::Disk(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display())),
            FileSource::Inline(bytes) => Ok(bytes.to_vec()),
        }
    }

    pub async fn load_string(&self) -> anyhow::Result<String> {
        let bytes = self.load().await?;
        String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", self.path))
    }
}

/// All files belonging to one logical entity, grouped by path prefix.
#[derive(Debug, Clone)]
pub struct ChangedContent {
    pub content_type: ContentType,
    pub natural_id: String,
    pub group_path: String,
    /// Category for tutorials, resources and blogs; course id for quiz questions.
    pub parent: Option<String>,
    pub files: Vec<ChangedFile>,
}

impl ChangedContent {
    pub fn main_file(&self, file_name: &str) -> Option<&ChangedFile> {
        self.files.iter().find(|f| f.file_name() == file_name)
    }

    pub fn files_except<'a>(&'a self, file_name: &'a str) -> impl Iterator<Item = &'a ChangedFile> + 'a {
        self.files.iter().filter(move |f| f.file_name() != file_name)
    }

    /// Languages of the localized files present in the group, whether or not
    /// they parse.
    pub fn languages(&self, main_file: &str, extension: &str) -> Vec<String> {
        let mut languages = self
            .files_except(main_file)
            .filter(|f| f.path.ends_with(extension))
            .map(ChangedFile::language)
            .collect::<Vec<_>>();
        languages.sort();
        languages.dedup();
        languages
    }

    /// Most recently modified file in the group.
    pub fn last_modified(&self) -> Option<&ChangedFile> {
        self.files.iter().max_by_key(|f| f.modified_at_millis)
    }
}

/// Recoverable per-item failures collected over a whole sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncErrors {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl SyncErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn extend(&mut self, other: SyncErrors) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_is_lowercased_file_stem() {
        let file = ChangedFile::from_bytes("courses/btc101/PT-BR.md", "", 0);
        assert_eq!(file.file_name(), "PT-BR.md");
        assert_eq!(file.language(), "pt-br");
    }

    #[test]
    fn last_modified_picks_max_mtime() {
        let content = ChangedContent {
            content_type: ContentType::Courses,
            natural_id: "btc101".into(),
            group_path: "courses/btc101".into(),
            parent: None,
            files: vec![
                ChangedFile::from_bytes("courses/btc101/course.yml", "", 10),
                ChangedFile::from_bytes("courses/btc101/en.md", "", 30),
                ChangedFile::from_bytes("courses/btc101/fr.md", "", 20),
            ],
        };
        assert_eq!(content.last_modified().unwrap().path, "courses/btc101/en.md");
        assert!(content.main_file("course.yml").is_some());
        assert_eq!(content.files_except("course.yml").count(), 2);
        assert_eq!(content.languages("course.yml", ".md"), vec!["en", "fr"]);
    }

    #[tokio::test]
    async fn disk_files_are_read_lazily() {
        let dir = tempfile::tempdir().expect("tempdir");
        let abs = dir.path().join("en.md");
        let file = ChangedFile::on_disk("legals/terms/en.md", "abc", 0, "deadbeef", &abs);
        // The file does not exist yet; constructing the handle must not touch disk.
        tokio::fs::write(&abs, "# Terms").await.expect("write");
        assert_eq!(file.load_string().await.expect("load"), "# Terms");
    }

    #[test]
    fn errors_and_warnings_accumulate_separately() {
        let mut errors = SyncErrors::new();
        errors.push_warning("no chapters");
        assert!(!errors.has_errors());
        let mut other = SyncErrors::new();
        other.push_error("bad path");
        errors.extend(other);
        assert_eq!(errors.errors(), ["bad path".to_string()]);
        assert_eq!(errors.warnings().len(), 1);
    }
}

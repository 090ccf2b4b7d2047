//! Content importers: grouping, parsing and transactional writes per content type.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use edu_core::{ChangedContent, ChangedFile, ContentType, SyncErrors};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

pub mod bcert;
pub mod blogs;
pub mod courses;
pub mod db;
pub mod events;
pub mod group;
pub mod inline_tags;
pub mod legals;
pub mod markdown;
pub mod professors;
pub mod quiz;
pub mod resources;
pub mod tutorials;

pub use group::{group_by_type, grouping_rule, GroupingRule, PathDetails};

pub const CRATE_NAME: &str = "edu-importers";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{path}: invalid YAML: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl ImportError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Imports one grouped entity of a given content type.
#[async_trait]
pub trait ContentImporter: Send + Sync {
    fn content_type(&self) -> ContentType;

    /// Parse and write one entity inside its own transaction.
    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError>;

    /// Run [`Self::import_entity`], recording a failure in `errors` instead
    /// of propagating it.
    async fn import(&self, pool: &PgPool, content: &ChangedContent, errors: &mut SyncErrors) {
        let span = info_span!("import", content_type = %self.content_type(), path = %content.group_path);
        if let Err(err) = self.import_entity(pool, content, errors).instrument(span).await {
            warn!(path = %content.group_path, error = %err, "import failed");
            errors.push_error(format!(
                "Error importing {} {}: {err}",
                self.content_type(),
                content.group_path
            ));
        }
    }
}

pub fn importer_for(content_type: ContentType) -> Box<dyn ContentImporter> {
    match content_type {
        ContentType::Resources => Box::new(resources::ResourceImporter),
        ContentType::Courses => Box::new(courses::CourseImporter),
        ContentType::Legals => Box::new(legals::LegalImporter),
        ContentType::Tutorials => Box::new(tutorials::TutorialImporter),
        ContentType::Blogs => Box::new(blogs::BlogImporter),
        ContentType::QuizQuestions => Box::new(quiz::QuizQuestionImporter),
        ContentType::Professors => Box::new(professors::ProfessorImporter),
        ContentType::Events => Box::new(events::EventImporter),
        ContentType::BCertificates => Box::new(bcert::BCertificateImporter),
    }
}

pub(crate) fn parse_yaml<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, ImportError> {
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_yaml::from_str(text).map_err(|source| ImportError::Yaml {
        path: path.to_string(),
        source,
    })
}

pub(crate) async fn load_yaml<T: DeserializeOwned>(file: &ChangedFile) -> Result<T, ImportError> {
    let text = file.load_string().await?;
    parse_yaml(&file.path, &text)
}

/// Markdown file split into YAML front matter, optional excerpt and body.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownDocument<T> {
    pub front_matter: T,
    pub excerpt: Option<String>,
    pub body: String,
}

pub const EXCERPT_DELIMITER: &str = "+++";

/// Parse `---` front matter and a `+++` excerpt.
///
/// The excerpt is the text between two `+++` lines when the body opens with
/// one, otherwise the text before the first `+++` line.
pub fn parse_markdown_document<T: DeserializeOwned>(
    path: &str,
    source: &str,
) -> Result<MarkdownDocument<T>, ImportError> {
    let source = source.replace("\r\n", "\n");
    let (yaml, rest) = match source.strip_prefix("---\n") {
        Some(after) => {
            let mut offset = 0;
            let mut closing = None;
            for line in after.split_inclusive('\n') {
                if line.trim_end() == "---" {
                    closing = Some((offset, offset + line.len()));
                    break;
                }
                offset += line.len();
            }
            let Some((end, rest_start)) = closing else {
                return Err(ImportError::invalid(path, "unterminated front matter"));
            };
            (after[..end].to_string(), after[rest_start..].to_string())
        }
        None => (String::new(), source.clone()),
    };
    let front_matter = parse_yaml(path, &yaml)?;

    let lines = rest.lines().collect::<Vec<_>>();
    let delimiters = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim() == EXCERPT_DELIMITER)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let first_content = lines.iter().position(|l| !l.trim().is_empty());

    let (excerpt, body) = match delimiters.as_slice() {
        [open, close, ..] if Some(*open) == first_content => (
            Some(lines[open + 1..*close].join("\n")),
            lines[close + 1..].join("\n"),
        ),
        [split, ..] if Some(*split) != first_content => {
            (Some(lines[..*split].join("\n")), lines[split + 1..].join("\n"))
        }
        _ => (None, rest.clone()),
    };

    Ok(MarkdownDocument {
        front_matter,
        excerpt: excerpt.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        body: body.trim_matches('\n').to_string(),
    })
}

/// Accept YAML scalars (`20240101`, `"20240101"`, `true`) as strings.
pub(crate) fn de_opt_scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_yaml::Value>::deserialize(d)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected a scalar, found {other:?}"))),
    }
}

pub const DEFAULT_COMPACT_DATE: &str = "20000101";

/// Parse a `YYYYMMDD` date, defaulting to 2000-01-01 when absent.
pub fn parse_compact_date(value: Option<&str>) -> Result<DateTime<Utc>, String> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(DEFAULT_COMPACT_DATE);
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        .map_err(|_| format!("invalid date '{raw}', expected YYYYMMDD"))
}

/// Parse local date-times such as `2024-05-14T10:00` or `2024-05-14`.
pub fn parse_local_datetime(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        .map_err(|_| format!("invalid date-time '{value}'"))
}

/// Natural key of entities nested under a category, e.g. `wallet/green`.
pub(crate) fn scoped_id(content: &ChangedContent) -> String {
    match &content.parent {
        Some(parent) => format!("{parent}/{}", content.natural_id),
        None => content.natural_id.clone(),
    }
}

/// `last_updated` / `last_commit` of a group, from its newest file.
pub(crate) fn freshness(content: &ChangedContent) -> (DateTime<Utc>, String) {
    match content.last_modified() {
        Some(file) => (file.modified_at(), file.commit.clone()),
        None => (Utc::now(), String::new()),
    }
}

pub(crate) fn lowercase_tags(tags: &[String]) -> Vec<String> {
    let mut out = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    out.sort();
    out.dedup();
    out
}

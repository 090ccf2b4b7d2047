//! Tutorials: `tutorials/<category>/<name>/tutorial.yml` plus `<lang>.md`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::db::{self, Proofreading, ProofreadingEntry, ProofreadingOwner};
use crate::{
    freshness, load_yaml, lowercase_tags, parse_markdown_document, scoped_id, ContentImporter, ImportError,
};

pub const MAIN_FILE: &str = "tutorial.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TutorialMain {
    pub level: Option<String>,
    pub builder: Option<String>,
    pub original_language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub proofreading: Vec<ProofreadingEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TutorialFrontMatter {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedTutorial {
    pub language: String,
    pub name: String,
    pub description: Option<String>,
    pub raw_content: String,
}

#[derive(Debug, Clone)]
pub struct TutorialPlan {
    pub id: String,
    pub category: String,
    pub name: String,
    pub level: Option<String>,
    pub builder: Option<String>,
    pub original_language: Option<String>,
    pub tags: Vec<String>,
    pub proofreading: Vec<Proofreading>,
    pub localized: Vec<LocalizedTutorial>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

pub fn parse_tutorial_file(path: &str, language: &str, source: &str) -> Result<LocalizedTutorial, String> {
    let doc = parse_markdown_document::<TutorialFrontMatter>(path, source).map_err(|e| e.to_string())?;
    let name = doc
        .front_matter
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| format!("Missing tutorial name in {path}"))?;
    Ok(LocalizedTutorial {
        language: language.to_string(),
        name,
        description: doc.front_matter.description.or(doc.excerpt),
        raw_content: doc.body,
    })
}

pub async fn plan_tutorial(
    content: &ChangedContent,
    errors: &mut SyncErrors,
) -> Result<Option<TutorialPlan>, ImportError> {
    let Some(main_file) = content.main_file(MAIN_FILE) else {
        debug!(path = %content.group_path, "no tutorial.yml, skipping");
        return Ok(None);
    };
    let main: TutorialMain = load_yaml(main_file).await?;
    let proofreading =
        db::validate_proofreading(main.proofreading).map_err(|m| ImportError::invalid(&main_file.path, m))?;

    let mut localized = Vec::new();
    for file in content.files_except(MAIN_FILE).filter(|f| f.path.ends_with(".md")) {
        let parsed = match file.load_string().await {
            Ok(source) => parse_tutorial_file(&file.path, &file.language(), &source),
            Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
        };
        match parsed {
            Ok(tutorial) => localized.push(tutorial),
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(TutorialPlan {
        id: scoped_id(content),
        category: content.parent.clone().unwrap_or_default(),
        name: content.natural_id.clone(),
        level: main.level,
        builder: main.builder,
        original_language: main.original_language.map(|l| l.to_lowercase()),
        tags: lowercase_tags(&main.tags),
        proofreading,
        localized,
        languages: content.languages(MAIN_FILE, ".md"),
        last_updated,
        last_commit,
    }))
}

async fn write_tutorial(conn: &mut PgConnection, plan: &TutorialPlan) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO content.tutorials
           (id, category, name, level, builder, original_language, last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
         ON CONFLICT (id) DO UPDATE SET
           category = EXCLUDED.category,
           name = EXCLUDED.name,
           level = EXCLUDED.level,
           builder = EXCLUDED.builder,
           original_language = EXCLUDED.original_language,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&plan.id)
    .bind(&plan.category)
    .bind(&plan.name)
    .bind(&plan.level)
    .bind(&plan.builder)
    .bind(&plan.original_language)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::relink_tags(&mut *conn, "tutorial_tags", "tutorial_id", &plan.id, &plan.tags).await?;
    db::upsert_proofreading(&mut *conn, ProofreadingOwner::Tutorial(&plan.id), &plan.proofreading).await?;

    db::prune_languages(&mut *conn, "tutorials_localised", "tutorial_id", &plan.id, &plan.languages).await?;
    for tutorial in &plan.localized {
        sqlx::query(
            "INSERT INTO content.tutorials_localised (tutorial_id, language, name, description, raw_content)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tutorial_id, language) DO UPDATE SET
               name = EXCLUDED.name,
               description = EXCLUDED.description,
               raw_content = EXCLUDED.raw_content",
        )
        .bind(&plan.id)
        .bind(&tutorial.language)
        .bind(&tutorial.name)
        .bind(&tutorial.description)
        .bind(&tutorial.raw_content)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct TutorialImporter;

#[async_trait]
impl ContentImporter for TutorialImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Tutorials
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_tutorial(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_tutorial(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(tutorial = %plan.id, languages = plan.localized.len(), "tutorial imported");
        Ok(())
    }
}

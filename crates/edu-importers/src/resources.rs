//! Resources: `resources/<category>/<id>/<kind>.yml`, where `<kind>` is the
//! singular category (`books` -> `book.yml`), plus optional `<lang>.yml`
//! descriptions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::db::{self, Proofreading, ProofreadingEntry, ProofreadingOwner};
use crate::{
    de_opt_scalar, freshness, load_yaml, lowercase_tags, parse_yaml, scoped_id, ContentImporter, ImportError,
};

/// Main file name for a resource category.
pub fn main_file_name(category: &str) -> String {
    let kind = category.strip_suffix('s').unwrap_or(category);
    format!("{kind}.yml")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceMain {
    pub name: Option<String>,
    pub author: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub year: Option<String>,
    pub website_url: Option<String>,
    pub original_language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub proofreading: Vec<ProofreadingEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LocalizedResource {
    #[serde(skip)]
    pub language: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResourcePlan {
    pub id: String,
    pub category: String,
    pub name: String,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub website_url: Option<String>,
    pub original_language: Option<String>,
    pub tags: Vec<String>,
    pub proofreading: Vec<Proofreading>,
    pub localized: Vec<LocalizedResource>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

pub async fn plan_resource(
    content: &ChangedContent,
    errors: &mut SyncErrors,
) -> Result<Option<ResourcePlan>, ImportError> {
    let category = content.parent.clone().unwrap_or_default();
    let main_name = main_file_name(&category);
    let Some(main_file) = content.main_file(&main_name) else {
        debug!(path = %content.group_path, main = %main_name, "no main file, skipping");
        return Ok(None);
    };
    let main: ResourceMain = load_yaml(main_file).await?;
    let proofreading =
        db::validate_proofreading(main.proofreading).map_err(|m| ImportError::invalid(&main_file.path, m))?;
    let year = match main.year.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse::<i32>()
                .map_err(|_| ImportError::invalid(&main_file.path, format!("invalid year '{raw}'")))?,
        ),
        _ => None,
    };

    let mut localized = Vec::new();
    for file in content.files_except(&main_name).filter(|f| f.path.ends_with(".yml")) {
        let parsed = match file.load_string().await {
            Ok(text) => parse_yaml::<LocalizedResource>(&file.path, &text).map_err(|e| e.to_string()),
            Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
        };
        match parsed {
            Ok(mut resource) => {
                resource.language = file.language();
                localized.push(resource);
            }
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(ResourcePlan {
        id: scoped_id(content),
        name: main.name.unwrap_or_else(|| content.natural_id.clone()),
        category,
        author: main.author,
        year,
        website_url: main.website_url,
        original_language: main.original_language.map(|l| l.to_lowercase()),
        tags: lowercase_tags(&main.tags),
        proofreading,
        localized,
        languages: content.languages(&main_name, ".yml"),
        last_updated,
        last_commit,
    }))
}

async fn write_resource(conn: &mut PgConnection, plan: &ResourcePlan) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO content.resources
           (id, category, name, author, year, website_url, original_language, last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
         ON CONFLICT (id) DO UPDATE SET
           category = EXCLUDED.category,
           name = EXCLUDED.name,
           author = EXCLUDED.author,
           year = EXCLUDED.year,
           website_url = EXCLUDED.website_url,
           original_language = EXCLUDED.original_language,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&plan.id)
    .bind(&plan.category)
    .bind(&plan.name)
    .bind(&plan.author)
    .bind(plan.year)
    .bind(&plan.website_url)
    .bind(&plan.original_language)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::relink_tags(&mut *conn, "resource_tags", "resource_id", &plan.id, &plan.tags).await?;
    db::upsert_proofreading(&mut *conn, ProofreadingOwner::Resource(&plan.id), &plan.proofreading).await?;

    db::prune_languages(&mut *conn, "resources_localised", "resource_id", &plan.id, &plan.languages).await?;
    for resource in &plan.localized {
        sqlx::query(
            "INSERT INTO content.resources_localised (resource_id, language, name, description)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (resource_id, language) DO UPDATE SET
               name = EXCLUDED.name,
               description = EXCLUDED.description",
        )
        .bind(&plan.id)
        .bind(&resource.language)
        .bind(resource.name.as_deref().unwrap_or(&plan.name))
        .bind(&resource.description)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct ResourceImporter;

#[async_trait]
impl ContentImporter for ResourceImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Resources
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_resource(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_resource(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(resource = %plan.id, "resource imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::ChangedFile;

    #[test]
    fn main_file_is_the_singular_category() {
        assert_eq!(main_file_name("books"), "book.yml");
        assert_eq!(main_file_name("podcasts"), "podcast.yml");
        assert_eq!(main_file_name("bet"), "bet.yml");
    }

    fn book(files: Vec<ChangedFile>) -> ChangedContent {
        ChangedContent {
            content_type: ContentType::Resources,
            natural_id: "mastering-bitcoin".into(),
            group_path: "resources/books/mastering-bitcoin".into(),
            parent: Some("books".into()),
            files,
        }
    }

    #[tokio::test]
    async fn book_with_localized_description() {
        let content = book(vec![
            ChangedFile::from_bytes(
                "resources/books/mastering-bitcoin/book.yml",
                "name: Mastering Bitcoin\nauthor: Andreas\nyear: 2014\ntags: [Technical]\n",
                1,
            ),
            ChangedFile::from_bytes(
                "resources/books/mastering-bitcoin/EN.yml",
                "description: The classic.\n",
                2,
            ),
        ]);
        let mut errors = SyncErrors::new();

        let plan = plan_resource(&content, &mut errors).await.unwrap().unwrap();

        assert_eq!(plan.id, "books/mastering-bitcoin");
        assert_eq!(plan.year, Some(2014));
        assert_eq!(plan.localized.len(), 1);
        assert_eq!(plan.localized[0].language, "en");
        assert_eq!(plan.localized[0].description.as_deref(), Some("The classic."));
        assert!(!errors.has_errors());
    }

    #[tokio::test]
    async fn invalid_year_fails_the_entity() {
        let content = book(vec![ChangedFile::from_bytes(
            "resources/books/mastering-bitcoin/book.yml",
            "name: X\nyear: soon\n",
            1,
        )]);
        let mut errors = SyncErrors::new();
        let err = plan_resource(&content, &mut errors).await.unwrap_err();
        assert!(err.to_string().contains("book.yml"));
    }
}

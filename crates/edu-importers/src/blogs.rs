//! Blog posts: `blogs/<category>/<id>/blog.yml` plus `<lang>.md`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::db;
use crate::{
    de_opt_scalar, freshness, load_yaml, lowercase_tags, parse_compact_date, parse_markdown_document, scoped_id,
    ContentImporter, ImportError,
};

pub const MAIN_FILE: &str = "blog.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogMain {
    pub author: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BlogFrontMatter {
    title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedBlog {
    pub language: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub raw_content: String,
}

#[derive(Debug, Clone)]
pub struct BlogPlan {
    pub id: String,
    pub category: String,
    pub name: String,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub localized: Vec<LocalizedBlog>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

pub fn parse_blog_file(path: &str, language: &str, source: &str) -> Result<LocalizedBlog, String> {
    let doc = parse_markdown_document::<BlogFrontMatter>(path, source).map_err(|e| e.to_string())?;
    let title = doc
        .front_matter
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| format!("Missing blog title in {path}"))?;
    Ok(LocalizedBlog {
        language: language.to_string(),
        title,
        excerpt: doc.excerpt,
        raw_content: doc.body,
    })
}

pub async fn plan_blog(content: &ChangedContent, errors: &mut SyncErrors) -> Result<Option<BlogPlan>, ImportError> {
    let Some(main_file) = content.main_file(MAIN_FILE) else {
        debug!(path = %content.group_path, "no blog.yml, skipping");
        return Ok(None);
    };
    let main: BlogMain = load_yaml(main_file).await?;
    let date = parse_compact_date(main.date.as_deref()).map_err(|m| ImportError::invalid(&main_file.path, m))?;

    let mut localized = Vec::new();
    for file in content.files_except(MAIN_FILE).filter(|f| f.path.ends_with(".md")) {
        let parsed = match file.load_string().await {
            Ok(source) => parse_blog_file(&file.path, &file.language(), &source),
            Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
        };
        match parsed {
            Ok(blog) => localized.push(blog),
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(BlogPlan {
        id: scoped_id(content),
        category: content.parent.clone().unwrap_or_default(),
        name: content.natural_id.clone(),
        author: main.author,
        date,
        tags: lowercase_tags(&main.tags),
        localized,
        languages: content.languages(MAIN_FILE, ".md"),
        last_updated,
        last_commit,
    }))
}

async fn write_blog(conn: &mut PgConnection, plan: &BlogPlan) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO content.blogs (id, category, name, author, date, last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
         ON CONFLICT (id) DO UPDATE SET
           category = EXCLUDED.category,
           name = EXCLUDED.name,
           author = EXCLUDED.author,
           date = EXCLUDED.date,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&plan.id)
    .bind(&plan.category)
    .bind(&plan.name)
    .bind(&plan.author)
    .bind(plan.date)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::relink_tags(&mut *conn, "blog_tags", "blog_id", &plan.id, &plan.tags).await?;

    db::prune_languages(&mut *conn, "blogs_localised", "blog_id", &plan.id, &plan.languages).await?;
    for blog in &plan.localized {
        sqlx::query(
            "INSERT INTO content.blogs_localised (blog_id, language, title, excerpt, raw_content)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (blog_id, language) DO UPDATE SET
               title = EXCLUDED.title,
               excerpt = EXCLUDED.excerpt,
               raw_content = EXCLUDED.raw_content",
        )
        .bind(&plan.id)
        .bind(&blog.language)
        .bind(&blog.title)
        .bind(&blog.excerpt)
        .bind(&blog.raw_content)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct BlogImporter;

#[async_trait]
impl ContentImporter for BlogImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Blogs
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_blog(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_blog(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(blog = %plan.id, "blog imported");
        Ok(())
    }
}

//! Professors: `professors/<id>/professor.yml` plus `<lang>.yml` bios.
//! A professor is also a contributor, keyed by the same id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::db;
use crate::{freshness, load_yaml, lowercase_tags, parse_yaml, ContentImporter, ImportError};

pub const MAIN_FILE: &str = "professor.yml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProfessorLinks {
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub nostr: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfessorMain {
    pub contributor_id: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub links: ProfessorLinks,
    pub lightning_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LocalizedProfessor {
    #[serde(skip)]
    pub language: String,
    pub bio: Option<String>,
    pub short_bio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfessorPlan {
    pub contributor_id: String,
    pub name: String,
    pub company: Option<String>,
    pub affiliations: Vec<String>,
    pub links: ProfessorLinks,
    pub lightning_address: Option<String>,
    pub tags: Vec<String>,
    pub localized: Vec<LocalizedProfessor>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

pub async fn plan_professor(
    content: &ChangedContent,
    errors: &mut SyncErrors,
) -> Result<Option<ProfessorPlan>, ImportError> {
    let Some(main_file) = content.main_file(MAIN_FILE) else {
        debug!(path = %content.group_path, "no professor.yml, skipping");
        return Ok(None);
    };
    let main: ProfessorMain = load_yaml(main_file).await?;
    let name = main
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ImportError::invalid(&main_file.path, "missing professor name"))?;

    let mut localized = Vec::new();
    for file in content.files_except(MAIN_FILE).filter(|f| f.path.ends_with(".yml")) {
        let parsed = match file.load_string().await {
            Ok(text) => parse_yaml::<LocalizedProfessor>(&file.path, &text).map_err(|e| e.to_string()),
            Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
        };
        match parsed {
            Ok(mut professor) => {
                professor.language = file.language();
                localized.push(professor);
            }
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(ProfessorPlan {
        contributor_id: main
            .contributor_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| content.natural_id.clone()),
        name,
        company: main.company,
        affiliations: main.affiliations,
        links: main.links,
        lightning_address: main.lightning_address,
        tags: lowercase_tags(&main.tags),
        localized,
        languages: content.languages(MAIN_FILE, ".yml"),
        last_updated,
        last_commit,
    }))
}

async fn write_professor(conn: &mut PgConnection, plan: &ProfessorPlan) -> Result<(), sqlx::Error> {
    db::ensure_contributor(&mut *conn, &plan.contributor_id).await?;
    sqlx::query(
        "INSERT INTO content.professors
           (contributor_id, name, company, affiliations, website_url, twitter_url, github_url, nostr,
            lightning_address, last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
         ON CONFLICT (contributor_id) DO UPDATE SET
           name = EXCLUDED.name,
           company = EXCLUDED.company,
           affiliations = EXCLUDED.affiliations,
           website_url = EXCLUDED.website_url,
           twitter_url = EXCLUDED.twitter_url,
           github_url = EXCLUDED.github_url,
           nostr = EXCLUDED.nostr,
           lightning_address = EXCLUDED.lightning_address,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&plan.contributor_id)
    .bind(&plan.name)
    .bind(&plan.company)
    .bind(&plan.affiliations)
    .bind(&plan.links.website)
    .bind(&plan.links.twitter)
    .bind(&plan.links.github)
    .bind(&plan.links.nostr)
    .bind(&plan.lightning_address)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::relink_tags(&mut *conn, "professor_tags", "professor_id", &plan.contributor_id, &plan.tags).await?;

    db::prune_languages(&mut *conn, "professors_localised", "professor_id", &plan.contributor_id, &plan.languages).await?;
    for professor in &plan.localized {
        sqlx::query(
            "INSERT INTO content.professors_localised (professor_id, language, bio, short_bio)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (professor_id, language) DO UPDATE SET
               bio = EXCLUDED.bio,
               short_bio = EXCLUDED.short_bio",
        )
        .bind(&plan.contributor_id)
        .bind(&professor.language)
        .bind(&professor.bio)
        .bind(&professor.short_bio)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct ProfessorImporter;

#[async_trait]
impl ContentImporter for ProfessorImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Professors
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_professor(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_professor(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(professor = %plan.contributor_id, "professor imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::ChangedFile;

    #[tokio::test]
    async fn professor_plan_reads_links_and_bios() {
        let content = ChangedContent {
            content_type: ContentType::Professors,
            natural_id: "rogzy".into(),
            group_path: "professors/rogzy".into(),
            parent: None,
            files: vec![
                ChangedFile::from_bytes(
                    "professors/rogzy/professor.yml",
                    "name: Rogzy\ncontributor_id: crazy-cat\nlinks:\n  twitter: https://x.com/rogzy\ntags: [Education]\n",
                    1,
                ),
                ChangedFile::from_bytes("professors/rogzy/en.yml", "bio: Long bio\nshort_bio: Short\n", 1),
                ChangedFile::from_bytes("professors/rogzy/fr.yml", "bio: [not, a, string]\n", 1),
            ],
        };
        let mut errors = SyncErrors::new();

        let plan = plan_professor(&content, &mut errors).await.unwrap().unwrap();

        assert_eq!(plan.contributor_id, "crazy-cat");
        assert_eq!(plan.links.twitter.as_deref(), Some("https://x.com/rogzy"));
        assert_eq!(plan.tags, vec!["education".to_string()]);
        assert_eq!(plan.localized.len(), 1);
        assert_eq!(plan.localized[0].short_bio.as_deref(), Some("Short"));
        assert_eq!(errors.errors().len(), 1);
    }
}

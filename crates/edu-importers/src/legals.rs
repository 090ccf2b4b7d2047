//! Legal documents: `legals/<name>/<lang>.md`, one row per `(name, language)`.

use async_trait::async_trait;
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use crate::{parse_markdown_document, ContentImporter, ImportError};

#[derive(Debug, Clone, Default, Deserialize)]
struct LegalFrontMatter {
    title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegalDocument {
    pub name: String,
    pub language: String,
    pub title: String,
    pub raw_content: String,
}

/// The title comes from front matter, falling back to the first H1.
pub fn parse_legal_file(name: &str, path: &str, language: &str, source: &str) -> Result<LegalDocument, String> {
    let doc = parse_markdown_document::<LegalFrontMatter>(path, source).map_err(|e| e.to_string())?;
    let title = doc
        .front_matter
        .title
        .or_else(|| {
            doc.body
                .lines()
                .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
        })
        .ok_or_else(|| format!("Missing legal title in {path}"))?;
    Ok(LegalDocument {
        name: name.to_string(),
        language: language.to_string(),
        title,
        raw_content: doc.body,
    })
}

pub struct LegalImporter;

#[async_trait]
impl ContentImporter for LegalImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Legals
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let mut documents = Vec::new();
        for file in content.files.iter().filter(|f| f.path.ends_with(".md")) {
            let parsed = match file.load_string().await {
                Ok(source) => parse_legal_file(&content.natural_id, &file.path, &file.language(), &source),
                Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
            };
            match parsed {
                Ok(doc) => documents.push(doc),
                Err(message) => errors.push_error(message),
            }
        }
        if documents.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;
        for doc in &documents {
            sqlx::query(
                "INSERT INTO content.legals (name, language, title, raw_content, last_sync)
                 VALUES ($1, $2, $3, $4, NOW())
                 ON CONFLICT (name, language) DO UPDATE SET
                   title = EXCLUDED.title,
                   raw_content = EXCLUDED.raw_content,
                   last_sync = NOW()",
            )
            .bind(&doc.name)
            .bind(&doc.language)
            .bind(&doc.title)
            .bind(&doc.raw_content)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(legal = %content.natural_id, languages = documents.len(), "legal imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_to_first_heading() {
        let doc = parse_legal_file("terms", "legals/terms/en.md", "en", "# Terms of use\n\nBe nice.").unwrap();
        assert_eq!(doc.title, "Terms of use");
        assert_eq!(doc.raw_content, "# Terms of use\n\nBe nice.");
    }

    #[test]
    fn front_matter_title_wins() {
        let doc = parse_legal_file("privacy", "legals/privacy/fr.md", "fr", "---\ntitle: Confidentialite\n---\n# Other\n")
            .unwrap();
        assert_eq!(doc.title, "Confidentialite");
    }
}

//! B-Certificate exam sessions: `bcert/<edition>/bcert.yml`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{de_opt_scalar, freshness, load_yaml, parse_local_datetime, ContentImporter, ImportError};

pub const MAIN_FILE: &str = "bcert.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BCertMain {
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub date: Option<String>,
    pub location: Option<String>,
    pub min_score: Option<i32>,
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BCertExam {
    pub id: Uuid,
    pub edition: String,
    pub date: NaiveDateTime,
    pub location: Option<String>,
    pub min_score: i32,
    pub duration: Option<i32>,
}

impl BCertMain {
    pub fn validate(self, edition: &str) -> Result<BCertExam, String> {
        let raw_id = self.id.as_deref().ok_or("missing exam id")?;
        let id = Uuid::parse_str(raw_id.trim()).map_err(|_| format!("invalid exam id '{raw_id}'"))?;
        let date = parse_local_datetime(self.date.as_deref().ok_or("missing exam date")?)?;
        Ok(BCertExam {
            id,
            edition: edition.to_string(),
            date,
            location: self.location,
            min_score: self.min_score.unwrap_or(0),
            duration: self.duration,
        })
    }
}

pub struct BCertificateImporter;

#[async_trait]
impl ContentImporter for BCertificateImporter {
    fn content_type(&self) -> ContentType {
        ContentType::BCertificates
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        _errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(main_file) = content.main_file(MAIN_FILE) else {
            debug!(path = %content.group_path, "no bcert.yml, skipping");
            return Ok(());
        };
        let main: BCertMain = load_yaml(main_file).await?;
        let exam = main
            .validate(&content.natural_id)
            .map_err(|m| ImportError::invalid(&main_file.path, m))?;
        let (last_updated, last_commit) = freshness(content);

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO content.b_certificate_exams
               (id, edition, date, location, min_score, duration, last_updated, last_commit, last_sync)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
             ON CONFLICT (id) DO UPDATE SET
               edition = EXCLUDED.edition,
               date = EXCLUDED.date,
               location = EXCLUDED.location,
               min_score = EXCLUDED.min_score,
               duration = EXCLUDED.duration,
               last_updated = EXCLUDED.last_updated,
               last_commit = EXCLUDED.last_commit,
               last_sync = NOW()",
        )
        .bind(exam.id)
        .bind(&exam.edition)
        .bind(exam.date)
        .bind(&exam.location)
        .bind(exam.min_score)
        .bind(exam.duration)
        .bind(last_updated)
        .bind(&last_commit)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(exam = %exam.id, edition = %exam.edition, "b-certificate exam imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_needs_uuid_and_date() {
        let main: BCertMain = serde_yaml::from_str(
            "id: 0f5e8f3a-1d2c-4b5a-9e8f-7a6b5c4d3e2f\ndate: 2024-06-01T09:00\nlocation: Lugano\nmin_score: 70\n",
        )
        .unwrap();
        let exam = main.validate("2024-lugano").unwrap();
        assert_eq!(exam.edition, "2024-lugano");
        assert_eq!(exam.min_score, 70);

        let bad: BCertMain = serde_yaml::from_str("id: nope\ndate: 2024-06-01\n").unwrap();
        assert!(bad.validate("x").unwrap_err().contains("exam id"));
    }
}

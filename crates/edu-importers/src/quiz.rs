//! Quiz questions: `courses/<course>/quizz/<id>/question.yml` plus
//! `<lang>.yml` with the question text and answers.
//!
//! Questions are never deleted; removed ones are flagged `disabled` during
//! reconciliation and re-enabled here when they come back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::{freshness, load_yaml, lowercase_tags, parse_yaml, scoped_id, ContentImporter, ImportError};

pub const MAIN_FILE: &str = "question.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionMain {
    pub chapter_id: Option<String>,
    pub difficulty: Option<String>,
    pub author: Option<String>,
    pub duration: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LocalizedQuestion {
    #[serde(skip)]
    pub language: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub wrong_answers: Vec<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuestionPlan {
    pub id: String,
    pub course_id: String,
    pub chapter_id: Uuid,
    pub difficulty: Option<String>,
    pub author: Option<String>,
    pub duration: Option<i32>,
    pub tags: Vec<String>,
    pub localized: Vec<LocalizedQuestion>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

pub async fn plan_question(
    content: &ChangedContent,
    errors: &mut SyncErrors,
) -> Result<Option<QuestionPlan>, ImportError> {
    let Some(main_file) = content.main_file(MAIN_FILE) else {
        debug!(path = %content.group_path, "no question.yml, skipping");
        return Ok(None);
    };
    let main: QuestionMain = load_yaml(main_file).await?;
    let chapter_id = main
        .chapter_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| ImportError::invalid(&main_file.path, "missing or invalid Chapter id"))?;

    let mut localized = Vec::new();
    for file in content.files_except(MAIN_FILE).filter(|f| f.path.ends_with(".yml")) {
        let parsed = match file.load_string().await {
            Ok(text) => parse_yaml::<LocalizedQuestion>(&file.path, &text).map_err(|e| e.to_string()),
            Err(err) => Err(format!("Error reading {}: {err:#}", file.path)),
        };
        match parsed {
            Ok(mut question) if question.wrong_answers.is_empty() => {
                question.language = file.language();
                errors.push_warning(format!("No wrong answers in {}", file.path));
                localized.push(question);
            }
            Ok(mut question) => {
                question.language = file.language();
                localized.push(question);
            }
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(QuestionPlan {
        id: scoped_id(content),
        course_id: content.parent.clone().unwrap_or_default(),
        chapter_id,
        difficulty: main.difficulty,
        author: main.author,
        duration: main.duration,
        tags: lowercase_tags(&main.tags),
        localized,
        languages: content.languages(MAIN_FILE, ".yml"),
        last_updated,
        last_commit,
    }))
}

async fn write_question(conn: &mut PgConnection, plan: &QuestionPlan) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO content.quiz_questions
           (id, course_id, chapter_id, difficulty, author, duration, tags, disabled, last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8, $9, NOW())
         ON CONFLICT (id) DO UPDATE SET
           course_id = EXCLUDED.course_id,
           chapter_id = EXCLUDED.chapter_id,
           difficulty = EXCLUDED.difficulty,
           author = EXCLUDED.author,
           duration = EXCLUDED.duration,
           tags = EXCLUDED.tags,
           disabled = false,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&plan.id)
    .bind(&plan.course_id)
    .bind(plan.chapter_id)
    .bind(&plan.difficulty)
    .bind(&plan.author)
    .bind(plan.duration)
    .bind(&plan.tags)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::prune_languages(&mut *conn, "quiz_questions_localised", "quiz_question_id", &plan.id, &plan.languages).await?;
    for question in &plan.localized {
        sqlx::query(
            "INSERT INTO content.quiz_questions_localised
               (quiz_question_id, language, question, answer, wrong_answers, explanation)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (quiz_question_id, language) DO UPDATE SET
               question = EXCLUDED.question,
               answer = EXCLUDED.answer,
               wrong_answers = EXCLUDED.wrong_answers,
               explanation = EXCLUDED.explanation",
        )
        .bind(&plan.id)
        .bind(&question.language)
        .bind(&question.question)
        .bind(&question.answer)
        .bind(&question.wrong_answers)
        .bind(&question.explanation)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct QuizQuestionImporter;

#[async_trait]
impl ContentImporter for QuizQuestionImporter {
    fn content_type(&self) -> ContentType {
        ContentType::QuizQuestions
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_question(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_question(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(question = %plan.id, "quiz question imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::ChangedFile;

    fn question(main: &str, localized: &str) -> ChangedContent {
        ChangedContent {
            content_type: ContentType::QuizQuestions,
            natural_id: "001".into(),
            group_path: "courses/btc101/quizz/001".into(),
            parent: Some("btc101".into()),
            files: vec![
                ChangedFile::from_bytes("courses/btc101/quizz/001/question.yml", main, 1),
                ChangedFile::from_bytes("courses/btc101/quizz/001/en.yml", localized, 2),
            ],
        }
    }

    #[tokio::test]
    async fn question_plan_links_course_and_chapter() {
        let content = question(
            "chapter_id: 4b1e9c3a-2f3d-4e5a-8b6c-7d8e9f0a1b02\ndifficulty: easy\nduration: 15\n",
            "question: What is a UTXO?\nanswer: An unspent output\nwrong_answers: [A wallet, A block]\n",
        );
        let mut errors = SyncErrors::new();

        let plan = plan_question(&content, &mut errors).await.unwrap().unwrap();

        assert_eq!(plan.id, "btc101/001");
        assert_eq!(plan.course_id, "btc101");
        assert_eq!(plan.localized[0].wrong_answers.len(), 2);
        assert!(errors.warnings().is_empty());
    }

    #[tokio::test]
    async fn invalid_chapter_id_fails_the_question() {
        let content = question("chapter_id: nope\n", "question: q\nanswer: a\n");
        let mut errors = SyncErrors::new();
        let err = plan_question(&content, &mut errors).await.unwrap_err();
        assert!(err.to_string().contains("Chapter id"));
        assert!(err.to_string().contains("question.yml"));
    }
}

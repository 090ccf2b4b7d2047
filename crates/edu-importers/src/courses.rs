//! Courses: `course.yml` plus one `<lang>.md` per language, each holding the
//! Part -> Chapter hierarchy as H1/H2 headings with inline tag metadata.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{self, Proofreading, ProofreadingEntry, ProofreadingOwner};
use crate::inline_tags::{extract_tag_value, extract_tag_values, strip_inline_tags};
use crate::markdown::{tokenize, BlockKind, BlockToken};
use crate::{
    de_opt_scalar, freshness, load_yaml, lowercase_tags, parse_compact_date, parse_local_datetime,
    parse_markdown_document, ContentImporter, ImportError,
};

pub const MAIN_FILE: &str = "course.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseMain {
    pub level: Option<String>,
    pub hours: Option<f64>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
    pub original_language: Option<String>,
    #[serde(default)]
    pub professors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub requires_payment: Option<bool>,
    pub paid_price_dollars: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub payment_expiration_date: Option<String>,
    pub is_archived: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub proofreading: Vec<ProofreadingEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecord {
    pub id: String,
    pub level: Option<String>,
    pub hours: Option<f64>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
    pub original_language: Option<String>,
    pub requires_payment: bool,
    pub paid_price_dollars: Option<f64>,
    pub payment_expiration_date: DateTime<Utc>,
    pub is_archived: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub professors: Vec<String>,
    pub tags: Vec<String>,
    pub proofreading: Vec<Proofreading>,
}

impl CourseMain {
    pub fn validate(self, id: &str) -> Result<CourseRecord, String> {
        Ok(CourseRecord {
            id: id.to_string(),
            level: self.level,
            hours: self.hours,
            topic: self.topic,
            subtopic: self.subtopic,
            original_language: self.original_language.map(|l| l.to_lowercase()),
            requires_payment: self.requires_payment.unwrap_or(false),
            paid_price_dollars: self.paid_price_dollars,
            payment_expiration_date: parse_compact_date(self.payment_expiration_date.as_deref())?,
            is_archived: self.is_archived.unwrap_or(false),
            start_date: parse_compact_date(self.start_date.as_deref())?,
            end_date: parse_compact_date(self.end_date.as_deref())?,
            professors: self.professors,
            tags: lowercase_tags(&self.tags),
            proofreading: db::validate_proofreading(self.proofreading)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CourseFrontMatter {
    name: Option<String>,
    goal: Option<String>,
    #[serde(default)]
    objectives: Vec<String>,
}

/// Chapter metadata collected from inline tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterMeta {
    pub release_place: Option<String>,
    pub is_online: bool,
    pub is_in_person: bool,
    pub is_course_review: bool,
    pub is_course_exam: bool,
    pub is_course_conclusion: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub timezone: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub address_line_3: Option<String>,
    pub live_url: Option<String>,
    pub chat_url: Option<String>,
    pub available_seats: Option<i32>,
    pub live_language: Option<String>,
    pub professors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChapter {
    pub chapter_id: Uuid,
    /// 1-based position inside its part.
    pub index: i32,
    pub title: String,
    pub sections: Vec<String>,
    pub raw_content: String,
    pub meta: ChapterMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPart {
    pub part_id: Uuid,
    pub index: i32,
    pub title: String,
    pub chapters: Vec<ParsedChapter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCourseFile {
    pub language: String,
    pub name: String,
    pub goal: Option<String>,
    pub objectives: Vec<String>,
    pub raw_description: Option<String>,
    pub parts: Vec<ParsedPart>,
}

impl ParsedCourseFile {
    pub fn chapter_count(&self) -> usize {
        self.parts.iter().map(|p| p.chapters.len()).sum()
    }
}

#[derive(Debug, Default)]
struct DraftChapter {
    id: Option<String>,
    title: String,
    sections: Vec<String>,
    content: Vec<String>,
    meta: ChapterMeta,
    invalid: Vec<String>,
}

#[derive(Debug, Default)]
struct DraftPart {
    id: Option<String>,
    title: String,
    chapters: Vec<DraftChapter>,
}

fn parse_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn apply_chapter_tags(block: &BlockToken, chapter: &mut DraftChapter) {
    let tags = &block.children;
    if let Some(id) = extract_tag_value(tags, "chapterId") {
        chapter.id = Some(id);
    }
    let meta = &mut chapter.meta;
    if let Some(v) = non_empty(extract_tag_value(tags, "releasePlace")) {
        meta.release_place = Some(v);
    }
    for (tag, flag) in [
        ("isOnline", &mut meta.is_online),
        ("isInPerson", &mut meta.is_in_person),
        ("isCourseReview", &mut meta.is_course_review),
        ("isCourseExam", &mut meta.is_course_exam),
        ("isCourseConclusion", &mut meta.is_course_conclusion),
    ] {
        if let Some(v) = extract_tag_value(tags, tag) {
            *flag = parse_flag(Some(v));
        }
    }
    for (tag, date) in [("startDate", &mut meta.start_date), ("endDate", &mut meta.end_date)] {
        if let Some(v) = non_empty(extract_tag_value(tags, tag)) {
            match parse_local_datetime(&v) {
                Ok(dt) => *date = Some(dt),
                Err(e) => chapter.invalid.push(format!("{tag}: {e}")),
            }
        }
    }
    for (tag, field) in [
        ("timeZone", &mut meta.timezone),
        ("addressLine1", &mut meta.address_line_1),
        ("addressLine2", &mut meta.address_line_2),
        ("addressLine3", &mut meta.address_line_3),
        ("liveUrl", &mut meta.live_url),
        ("chatUrl", &mut meta.chat_url),
        ("liveLanguage", &mut meta.live_language),
    ] {
        if let Some(v) = non_empty(extract_tag_value(tags, tag)) {
            *field = Some(v);
        }
    }
    if let Some(v) = non_empty(extract_tag_value(tags, "availableSeats")) {
        match v.parse::<i32>() {
            Ok(seats) => meta.available_seats = Some(seats),
            Err(_) => chapter.invalid.push(format!("availableSeats: '{v}' is not a number")),
        }
    }
    meta.professors.extend(
        extract_tag_values(tags, "professor")
            .into_iter()
            .filter(|p| !p.is_empty()),
    );
}

fn walk_blocks(blocks: Vec<BlockToken>) -> Vec<DraftPart> {
    let mut parts: Vec<DraftPart> = Vec::new();

    for block in blocks {
        match block.kind {
            BlockKind::Heading(1) => parts.push(DraftPart {
                title: block.content,
                ..DraftPart::default()
            }),
            BlockKind::Heading(2) => {
                if let Some(part) = parts.last_mut() {
                    part.chapters.push(DraftChapter {
                        title: block.content,
                        ..DraftChapter::default()
                    });
                }
            }
            _ => {
                let Some(part) = parts.last_mut() else {
                    continue;
                };
                let tagged = block.raw.trim_start().starts_with('<');
                if tagged {
                    if let Some(id) = extract_tag_value(&block.children, "partId") {
                        if part.chapters.is_empty() {
                            part.id = Some(id);
                        }
                    }
                }
                let Some(chapter) = part.chapters.last_mut() else {
                    continue;
                };
                if let BlockKind::Heading(3) = block.kind {
                    chapter.sections.push(block.content.clone());
                }
                let raw = if tagged {
                    apply_chapter_tags(&block, chapter);
                    strip_inline_tags(&block.raw)
                } else {
                    block.raw
                };
                let raw = raw.trim_end();
                if !raw.trim().is_empty() {
                    chapter.content.push(raw.to_string());
                }
            }
        }
    }
    parts
}

fn parse_uuid(kind: &str, title: &str, raw: Option<&str>, path: &str) -> Result<Uuid, String> {
    match raw {
        Some(raw) => Uuid::parse_str(raw.trim())
            .map_err(|_| format!("Invalid {kind} id '{raw}' for '{title}' in {path}")),
        None => Err(format!("Missing {kind} id for '{title}' in {path}")),
    }
}

/// Parse one localized course file into its part/chapter tree.
///
/// Any invalid part or chapter id rejects the whole file.
pub fn parse_course_file(path: &str, language: &str, source: &str) -> Result<ParsedCourseFile, String> {
    let doc = parse_markdown_document::<CourseFrontMatter>(path, source).map_err(|e| e.to_string())?;
    let name = doc
        .front_matter
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| format!("Missing course name in {path}"))?;

    let mut parts = Vec::new();
    for (part_index, draft) in walk_blocks(tokenize(&doc.body)).into_iter().enumerate() {
        let part_id = parse_uuid("Part", &draft.title, draft.id.as_deref(), path)?;
        let mut chapters = Vec::new();
        for (chapter_index, chapter) in draft.chapters.into_iter().enumerate() {
            let chapter_id = parse_uuid("Chapter", &chapter.title, chapter.id.as_deref(), path)?;
            if let Some(problem) = chapter.invalid.first() {
                return Err(format!("Invalid chapter '{}' in {path}: {problem}", chapter.title));
            }
            chapters.push(ParsedChapter {
                chapter_id,
                index: chapter_index as i32 + 1,
                title: chapter.title,
                sections: chapter.sections,
                raw_content: chapter.content.join("\n\n"),
                meta: chapter.meta,
            });
        }
        parts.push(ParsedPart {
            part_id,
            index: part_index as i32 + 1,
            title: draft.title,
            chapters,
        });
    }

    Ok(ParsedCourseFile {
        language: language.to_string(),
        name,
        goal: doc.front_matter.goal,
        objectives: doc.front_matter.objectives,
        raw_description: doc.excerpt,
        parts,
    })
}

/// Everything written for one course.
#[derive(Debug, Clone)]
pub struct CoursePlan {
    pub course: CourseRecord,
    pub files: Vec<ParsedCourseFile>,
    /// Languages with a file in the group, including ones that failed to parse.
    pub languages: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub last_commit: String,
}

/// Parse and validate a course group. Localized files that fail are
/// reported in `errors` and left out of the plan. `Ok(None)` means the group
/// has no `course.yml`.
pub async fn plan_course(
    content: &ChangedContent,
    errors: &mut SyncErrors,
) -> Result<Option<CoursePlan>, ImportError> {
    let Some(main_file) = content.main_file(MAIN_FILE) else {
        // TODO: push a warning instead once draft courses without course.yml are gone from the repo.
        debug!(path = %content.group_path, "no course.yml, skipping");
        return Ok(None);
    };
    let main: CourseMain = load_yaml(main_file).await?;
    let course = main
        .validate(&content.natural_id)
        .map_err(|message| ImportError::invalid(&main_file.path, message))?;

    let mut files = Vec::new();
    for file in content.files_except(MAIN_FILE) {
        if !file.path.ends_with(".md") {
            continue;
        }
        let source = match file.load_string().await {
            Ok(source) => source,
            Err(err) => {
                errors.push_error(format!("Error reading {}: {err:#}", file.path));
                continue;
            }
        };
        match parse_course_file(&file.path, &file.language(), &source) {
            Ok(parsed) => {
                if parsed.chapter_count() == 0 {
                    errors.push_warning(format!("No chapters found in {}", file.path));
                }
                files.push(parsed);
            }
            Err(message) => errors.push_error(message),
        }
    }

    let (last_updated, last_commit) = freshness(content);
    Ok(Some(CoursePlan {
        course,
        files,
        languages: content.languages(MAIN_FILE, ".md"),
        last_updated,
        last_commit,
    }))
}

async fn write_course(conn: &mut PgConnection, plan: &CoursePlan) -> Result<(), sqlx::Error> {
    let course = &plan.course;
    sqlx::query(
        "INSERT INTO content.courses
           (id, level, hours, topic, subtopic, original_language, requires_payment,
            paid_price_dollars, payment_expiration_date, is_archived, start_date, end_date,
            last_updated, last_commit, last_sync)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
         ON CONFLICT (id) DO UPDATE SET
           level = EXCLUDED.level,
           hours = EXCLUDED.hours,
           topic = EXCLUDED.topic,
           subtopic = EXCLUDED.subtopic,
           original_language = EXCLUDED.original_language,
           requires_payment = EXCLUDED.requires_payment,
           paid_price_dollars = EXCLUDED.paid_price_dollars,
           payment_expiration_date = EXCLUDED.payment_expiration_date,
           is_archived = EXCLUDED.is_archived,
           start_date = EXCLUDED.start_date,
           end_date = EXCLUDED.end_date,
           last_updated = EXCLUDED.last_updated,
           last_commit = EXCLUDED.last_commit,
           last_sync = NOW()",
    )
    .bind(&course.id)
    .bind(&course.level)
    .bind(course.hours)
    .bind(&course.topic)
    .bind(&course.subtopic)
    .bind(&course.original_language)
    .bind(course.requires_payment)
    .bind(course.paid_price_dollars)
    .bind(course.payment_expiration_date)
    .bind(course.is_archived)
    .bind(course.start_date)
    .bind(course.end_date)
    .bind(plan.last_updated)
    .bind(&plan.last_commit)
    .execute(&mut *conn)
    .await?;

    db::relink_contributors(&mut *conn, "course_professors", "course_id", &course.id, &course.professors).await?;
    db::relink_tags(&mut *conn, "course_tags", "course_id", &course.id, &course.tags).await?;
    db::upsert_proofreading(&mut *conn, ProofreadingOwner::Course(&course.id), &course.proofreading).await?;

    for table in ["course_chapters_localised", "course_parts_localised", "courses_localised"] {
        db::prune_languages(&mut *conn, table, "course_id", &course.id, &plan.languages).await?;
    }
    for file in &plan.files {
        write_localized(&mut *conn, &course.id, file).await?;
    }
    Ok(())
}

async fn write_localized(conn: &mut PgConnection, course_id: &str, file: &ParsedCourseFile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO content.courses_localised (course_id, language, name, goal, objectives, raw_description)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (course_id, language) DO UPDATE SET
           name = EXCLUDED.name,
           goal = EXCLUDED.goal,
           objectives = EXCLUDED.objectives,
           raw_description = EXCLUDED.raw_description",
    )
    .bind(course_id)
    .bind(&file.language)
    .bind(&file.name)
    .bind(&file.goal)
    .bind(&file.objectives)
    .bind(&file.raw_description)
    .execute(&mut *conn)
    .await?;

    for part in &file.parts {
        sqlx::query(
            "INSERT INTO content.course_parts (course_id, part_id, part_index, last_sync)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (course_id, part_id) DO UPDATE SET
               part_index = EXCLUDED.part_index,
               last_sync = NOW()",
        )
        .bind(course_id)
        .bind(part.part_id)
        .bind(part.index)
        .execute(&mut *conn)
        .await?;
    }

    for part in &file.parts {
        sqlx::query(
            "INSERT INTO content.course_parts_localised (course_id, part_id, language, title)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (course_id, part_id, language) DO UPDATE SET title = EXCLUDED.title",
        )
        .bind(course_id)
        .bind(part.part_id)
        .bind(&file.language)
        .bind(&part.title)
        .execute(&mut *conn)
        .await?;
    }

    let chapters = file
        .parts
        .iter()
        .flat_map(|part| part.chapters.iter().map(move |chapter| (part.part_id, chapter)))
        .collect::<Vec<_>>();

    for (part_id, chapter) in &chapters {
        let meta = &chapter.meta;
        sqlx::query(
            "INSERT INTO content.course_chapters
               (chapter_id, course_id, part_id, chapter_index, release_place, is_online, is_in_person,
                is_course_review, is_course_exam, is_course_conclusion, start_date, end_date, timezone,
                address_line_1, address_line_2, address_line_3, live_url, chat_url, available_seats,
                live_language, last_sync)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, NOW())
             ON CONFLICT (chapter_id) DO UPDATE SET
               course_id = EXCLUDED.course_id,
               part_id = EXCLUDED.part_id,
               chapter_index = EXCLUDED.chapter_index,
               release_place = EXCLUDED.release_place,
               is_online = EXCLUDED.is_online,
               is_in_person = EXCLUDED.is_in_person,
               is_course_review = EXCLUDED.is_course_review,
               is_course_exam = EXCLUDED.is_course_exam,
               is_course_conclusion = EXCLUDED.is_course_conclusion,
               start_date = EXCLUDED.start_date,
               end_date = EXCLUDED.end_date,
               timezone = EXCLUDED.timezone,
               address_line_1 = EXCLUDED.address_line_1,
               address_line_2 = EXCLUDED.address_line_2,
               address_line_3 = EXCLUDED.address_line_3,
               live_url = EXCLUDED.live_url,
               chat_url = EXCLUDED.chat_url,
               available_seats = EXCLUDED.available_seats,
               live_language = EXCLUDED.live_language,
               last_sync = NOW()",
        )
        .bind(chapter.chapter_id)
        .bind(course_id)
        .bind(part_id)
        .bind(chapter.index)
        .bind(&meta.release_place)
        .bind(meta.is_online)
        .bind(meta.is_in_person)
        .bind(meta.is_course_review)
        .bind(meta.is_course_exam)
        .bind(meta.is_course_conclusion)
        .bind(meta.start_date)
        .bind(meta.end_date)
        .bind(&meta.timezone)
        .bind(&meta.address_line_1)
        .bind(&meta.address_line_2)
        .bind(&meta.address_line_3)
        .bind(&meta.live_url)
        .bind(&meta.chat_url)
        .bind(meta.available_seats)
        .bind(&meta.live_language)
        .execute(&mut *conn)
        .await?;
    }

    for (_, chapter) in &chapters {
        sqlx::query(
            "INSERT INTO content.course_chapters_localised (chapter_id, course_id, language, title, sections, raw_content)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (chapter_id, language) DO UPDATE SET
               course_id = EXCLUDED.course_id,
               title = EXCLUDED.title,
               sections = EXCLUDED.sections,
               raw_content = EXCLUDED.raw_content",
        )
        .bind(chapter.chapter_id)
        .bind(course_id)
        .bind(&file.language)
        .bind(&chapter.title)
        .bind(&chapter.sections)
        .bind(&chapter.raw_content)
        .execute(&mut *conn)
        .await?;
    }

    let part_ids = file.parts.iter().map(|part| part.part_id).collect::<Vec<_>>();
    let chapter_ids = chapters.iter().map(|(_, chapter)| chapter.chapter_id).collect::<Vec<_>>();
    sqlx::query(
        "DELETE FROM content.course_parts_localised
         WHERE course_id = $1 AND language = $2 AND NOT (part_id = ANY($3))",
    )
    .bind(course_id)
    .bind(&file.language)
    .bind(&part_ids)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "DELETE FROM content.course_chapters_localised
         WHERE course_id = $1 AND language = $2 AND NOT (chapter_id = ANY($3))",
    )
    .bind(course_id)
    .bind(&file.language)
    .bind(&chapter_ids)
    .execute(&mut *conn)
    .await?;

    for (_, chapter) in &chapters {
        sqlx::query(
            "DELETE FROM content.course_chapters_professors
             WHERE chapter_id = $1 AND NOT (contributor_id = ANY($2))",
        )
        .bind(chapter.chapter_id)
        .bind(&chapter.meta.professors)
        .execute(&mut *conn)
        .await?;
        for professor in &chapter.meta.professors {
            db::ensure_contributor(&mut *conn, professor).await?;
            sqlx::query(
                "INSERT INTO content.course_chapters_professors (chapter_id, contributor_id)
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(chapter.chapter_id)
            .bind(professor)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

pub struct CourseImporter;

#[async_trait]
impl ContentImporter for CourseImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Courses
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(plan) = plan_course(content, errors).await? else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        write_course(&mut tx, &plan).await?;
        tx.commit().await?;
        info!(
            course = %plan.course.id,
            languages = plan.files.len(),
            "course imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::ChangedFile;

    const PART: &str = "8d8a2d0e-5a6f-4a3c-9a51-0b2c0f6a1e01";
    const CH1: &str = "4b1e9c3a-2f3d-4e5a-8b6c-7d8e9f0a1b02";
    const CH2: &str = "9c2f0d4b-3a4e-4f6b-9c7d-8e9f0a1b2c03";

    fn course_md(chapter_id: &str) -> String {
        format!(
            "---\nname: Bitcoin 101\ngoal: Understand Bitcoin\nobjectives:\n  - keys\n---\n+++\nA first course.\n+++\n\
             # The basics\n<partId>{PART}</partId>\n\n\
             ## Money\n<chapterId>{chapter_id}</chapterId>\n<professor>alice_smith</professor>\n<isOnline>true</isOnline>\n<startDate>2024-05-14T10:00</startDate>\n\n\
             Money is a *social* technology.\n\n\
             ### History\n\nBarter came first.\n\n\
             ## Keys\n<chapterId>{CH2}</chapterId>\n\nKeys sign things.\n"
        )
    }

    #[test]
    fn markdown_walk_builds_parts_and_chapters() {
        let parsed = parse_course_file("courses/btc101/en.md", "en", &course_md(CH1)).unwrap();

        assert_eq!(parsed.name, "Bitcoin 101");
        assert_eq!(parsed.raw_description.as_deref(), Some("A first course."));
        assert_eq!(parsed.parts.len(), 1);
        let part = &parsed.parts[0];
        assert_eq!(part.part_id.to_string(), PART);
        assert_eq!(part.title, "The basics");
        assert_eq!(part.chapters.len(), 2);

        let money = &part.chapters[0];
        assert_eq!(money.chapter_id.to_string(), CH1);
        assert_eq!(money.index, 1);
        assert_eq!(money.sections, vec!["History".to_string()]);
        assert_eq!(money.meta.professors, vec!["alice_smith".to_string()]);
        assert!(money.meta.is_online);
        assert_eq!(money.meta.start_date.unwrap().to_string(), "2024-05-14 10:00:00");
        assert!(!money.raw_content.contains("<chapterId>"));
        assert!(!money.raw_content.contains("<professor>"));
        assert!(money.raw_content.starts_with("Money is a *social* technology."));
        assert!(money.raw_content.contains("### History"));

        assert_eq!(part.chapters[1].index, 2);
        assert_eq!(part.chapters[1].raw_content, "Keys sign things.");
    }

    #[test]
    fn invalid_chapter_id_rejects_the_file_with_its_path() {
        let err = parse_course_file("courses/btc101/fr.md", "fr", &course_md("not-a-uuid")).unwrap_err();
        assert!(err.contains("Chapter id"));
        assert!(err.contains("courses/btc101/fr.md"));
    }

    #[test]
    fn missing_part_id_is_reported() {
        let src = "---\nname: X\n---\n# Part without id\n\n## Chapter\n<chapterId>4b1e9c3a-2f3d-4e5a-8b6c-7d8e9f0a1b02</chapterId>\n";
        let err = parse_course_file("courses/x/en.md", "en", src).unwrap_err();
        assert!(err.contains("Part id"));
    }

    #[test]
    fn main_file_defaults() {
        let main: CourseMain = serde_yaml::from_str("level: beginner\ntags: [Bitcoin, Keys]\nstart_date: 20240101\n").unwrap();
        let record = main.validate("btc101").unwrap();
        assert!(!record.is_archived);
        assert!(!record.requires_payment);
        assert_eq!(record.tags, vec!["bitcoin".to_string(), "keys".to_string()]);
        assert_eq!(record.start_date.format("%Y%m%d").to_string(), "20240101");
        assert_eq!(record.end_date.format("%Y%m%d").to_string(), "20000101");
    }

    fn group(files: Vec<ChangedFile>) -> ChangedContent {
        ChangedContent {
            content_type: ContentType::Courses,
            natural_id: "btc101".into(),
            group_path: "courses/btc101".into(),
            parent: None,
            files,
        }
    }

    #[tokio::test]
    async fn invalid_sibling_file_does_not_block_the_course() {
        let content = group(vec![
            ChangedFile::from_bytes("courses/btc101/course.yml", "level: beginner\n", 10),
            ChangedFile::from_bytes("courses/btc101/en.md", course_md(CH1), 30),
            ChangedFile::from_bytes("courses/btc101/fr.md", course_md("nope"), 20),
        ]);
        let mut errors = SyncErrors::new();

        let plan = plan_course(&content, &mut errors).await.unwrap().unwrap();

        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].language, "en");
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.errors()[0].contains("courses/btc101/fr.md"));
        assert_eq!(plan.last_updated.timestamp_millis(), 30);
        // fr failed to parse but is still present, so its stored rows are kept.
        assert_eq!(plan.languages, vec!["en", "fr"]);
    }

    #[tokio::test]
    async fn description_only_language_is_a_warning() {
        let content = group(vec![
            ChangedFile::from_bytes("courses/btc101/course.yml", "", 1),
            ChangedFile::from_bytes("courses/btc101/es.md", "---\nname: Bitcoin 101\n---\nSolo descripcion.\n", 1),
        ]);
        let mut errors = SyncErrors::new();
        let plan = plan_course(&content, &mut errors).await.unwrap().unwrap();
        assert_eq!(plan.files.len(), 1);
        assert!(!errors.has_errors());
        assert_eq!(errors.warnings().len(), 1);
    }

    #[tokio::test]
    async fn group_without_main_file_is_skipped() {
        let content = group(vec![ChangedFile::from_bytes("courses/btc101/en.md", course_md(CH1), 1)]);
        let mut errors = SyncErrors::new();
        assert!(plan_course(&content, &mut errors).await.unwrap().is_none());
        assert!(!errors.has_errors());
    }
}

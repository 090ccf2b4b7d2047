//! Removes rows whose `last_sync` predates the current cycle, i.e. content
//! that disappeared from the repositories.

use chrono::{DateTime, Utc};
use edu_core::{ContentType, SyncErrors};
use sqlx::PgPool;
use tracing::{debug, warn};

/// One statement of a stale-row pass. `$1` is the cycle start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleStatement {
    pub table: &'static str,
    pub sql: &'static str,
}

const fn stmt(table: &'static str, sql: &'static str) -> StaleStatement {
    StaleStatement { table, sql }
}

/// Statements for `content_type`, children before parents.
pub fn stale_delete_plan(content_type: ContentType) -> Vec<StaleStatement> {
    match content_type {
        ContentType::Courses => vec![
            stmt(
                "course_chapters_professors",
                "DELETE FROM content.course_chapters_professors WHERE chapter_id IN
                   (SELECT chapter_id FROM content.course_chapters WHERE last_sync < $1)",
            ),
            stmt(
                "course_chapters_localised",
                "DELETE FROM content.course_chapters_localised WHERE chapter_id IN
                   (SELECT chapter_id FROM content.course_chapters WHERE last_sync < $1)",
            ),
            stmt(
                "course_chapters",
                "DELETE FROM content.course_chapters WHERE last_sync < $1",
            ),
            stmt(
                "course_parts_localised",
                "DELETE FROM content.course_parts_localised WHERE (course_id, part_id) IN
                   (SELECT course_id, part_id FROM content.course_parts WHERE last_sync < $1)",
            ),
            stmt(
                "course_parts",
                "DELETE FROM content.course_parts WHERE last_sync < $1",
            ),
            stmt(
                "proofreading_contributors",
                "DELETE FROM content.proofreading_contributors WHERE proofreading_id IN
                   (SELECT p.id FROM content.proofreading p
                    JOIN content.courses c ON c.id = p.course_id WHERE c.last_sync < $1)",
            ),
            stmt(
                "proofreading",
                "DELETE FROM content.proofreading WHERE course_id IN
                   (SELECT id FROM content.courses WHERE last_sync < $1)",
            ),
            stmt(
                "course_professors",
                "DELETE FROM content.course_professors WHERE course_id IN
                   (SELECT id FROM content.courses WHERE last_sync < $1)",
            ),
            stmt(
                "course_tags",
                "DELETE FROM content.course_tags WHERE course_id IN
                   (SELECT id FROM content.courses WHERE last_sync < $1)",
            ),
            stmt(
                "courses_localised",
                "DELETE FROM content.courses_localised WHERE course_id IN
                   (SELECT id FROM content.courses WHERE last_sync < $1)",
            ),
            stmt("courses", "DELETE FROM content.courses WHERE last_sync < $1"),
        ],
        ContentType::Tutorials => vec![
            stmt(
                "proofreading_contributors",
                "DELETE FROM content.proofreading_contributors WHERE proofreading_id IN
                   (SELECT p.id FROM content.proofreading p
                    JOIN content.tutorials t ON t.id = p.tutorial_id WHERE t.last_sync < $1)",
            ),
            stmt(
                "proofreading",
                "DELETE FROM content.proofreading WHERE tutorial_id IN
                   (SELECT id FROM content.tutorials WHERE last_sync < $1)",
            ),
            stmt(
                "tutorial_tags",
                "DELETE FROM content.tutorial_tags WHERE tutorial_id IN
                   (SELECT id FROM content.tutorials WHERE last_sync < $1)",
            ),
            stmt(
                "tutorials_localised",
                "DELETE FROM content.tutorials_localised WHERE tutorial_id IN
                   (SELECT id FROM content.tutorials WHERE last_sync < $1)",
            ),
            stmt("tutorials", "DELETE FROM content.tutorials WHERE last_sync < $1"),
        ],
        ContentType::Resources => vec![
            stmt(
                "proofreading_contributors",
                "DELETE FROM content.proofreading_contributors WHERE proofreading_id IN
                   (SELECT p.id FROM content.proofreading p
                    JOIN content.resources r ON r.id = p.resource_id WHERE r.last_sync < $1)",
            ),
            stmt(
                "proofreading",
                "DELETE FROM content.proofreading WHERE resource_id IN
                   (SELECT id FROM content.resources WHERE last_sync < $1)",
            ),
            stmt(
                "resource_tags",
                "DELETE FROM content.resource_tags WHERE resource_id IN
                   (SELECT id FROM content.resources WHERE last_sync < $1)",
            ),
            stmt(
                "resources_localised",
                "DELETE FROM content.resources_localised WHERE resource_id IN
                   (SELECT id FROM content.resources WHERE last_sync < $1)",
            ),
            stmt("resources", "DELETE FROM content.resources WHERE last_sync < $1"),
        ],
        ContentType::Blogs => vec![
            stmt(
                "blog_tags",
                "DELETE FROM content.blog_tags WHERE blog_id IN
                   (SELECT id FROM content.blogs WHERE last_sync < $1)",
            ),
            stmt(
                "blogs_localised",
                "DELETE FROM content.blogs_localised WHERE blog_id IN
                   (SELECT id FROM content.blogs WHERE last_sync < $1)",
            ),
            stmt("blogs", "DELETE FROM content.blogs WHERE last_sync < $1"),
        ],
        ContentType::Legals => vec![stmt("legals", "DELETE FROM content.legals WHERE last_sync < $1")],
        ContentType::QuizQuestions => vec![stmt(
            "quiz_questions",
            "UPDATE content.quiz_questions SET disabled = true WHERE last_sync < $1 AND NOT disabled",
        )],
        ContentType::Professors => vec![
            stmt(
                "professor_tags",
                "DELETE FROM content.professor_tags WHERE professor_id IN
                   (SELECT contributor_id FROM content.professors WHERE last_sync < $1)",
            ),
            stmt(
                "professors_localised",
                "DELETE FROM content.professors_localised WHERE professor_id IN
                   (SELECT contributor_id FROM content.professors WHERE last_sync < $1)",
            ),
            stmt("professors", "DELETE FROM content.professors WHERE last_sync < $1"),
        ],
        ContentType::Events => vec![stmt("events", "DELETE FROM content.events WHERE last_sync < $1")],
        ContentType::BCertificates => vec![stmt(
            "b_certificate_exams",
            "DELETE FROM content.b_certificate_exams WHERE last_sync < $1",
        )],
    }
}

/// Run the stale pass for one content type. A failing statement is recorded
/// and the remaining ones still run. Returns the number of affected rows.
pub async fn delete_stale(
    pool: &PgPool,
    content_type: ContentType,
    sync_start: DateTime<Utc>,
    errors: &mut SyncErrors,
) -> u64 {
    let mut affected = 0;
    for statement in stale_delete_plan(content_type) {
        match sqlx::query(statement.sql).bind(sync_start).execute(pool).await {
            Ok(result) => {
                affected += result.rows_affected();
                debug!(table = statement.table, rows = result.rows_affected(), "stale rows removed");
            }
            Err(err) => {
                warn!(table = statement.table, error = %err, "stale pass failed");
                errors.push_error(format!(
                    "Error removing stale {content_type} rows from {}: {err}",
                    statement.table
                ));
            }
        }
    }
    affected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(plan: &[StaleStatement], table: &str) -> usize {
        plan.iter()
            .position(|s| s.table == table)
            .unwrap_or_else(|| panic!("{table} missing from plan"))
    }

    #[test]
    fn course_plan_removes_children_first() {
        let plan = stale_delete_plan(ContentType::Courses);
        let order = [
            "course_chapters_professors",
            "course_chapters_localised",
            "course_chapters",
            "course_parts_localised",
            "course_parts",
            "course_professors",
            "courses_localised",
            "courses",
        ];
        let positions = order.iter().map(|t| position(&plan, t)).collect::<Vec<_>>();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(position(&plan, "proofreading_contributors") < position(&plan, "proofreading"));
        assert!(position(&plan, "proofreading") < position(&plan, "courses"));
    }

    #[test]
    fn quiz_questions_are_disabled_not_deleted() {
        let plan = stale_delete_plan(ContentType::QuizQuestions);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].sql.starts_with("UPDATE"));
        assert!(plan[0].sql.contains("disabled = true"));
    }

    #[test]
    fn every_type_ends_with_its_entity_table_and_binds_the_cycle_start() {
        for content_type in ContentType::IMPORT_ORDER {
            let plan = stale_delete_plan(content_type);
            assert!(!plan.is_empty(), "{content_type}");
            assert!(plan.iter().all(|s| s.sql.contains("last_sync < $1")), "{content_type}");
        }
        assert_eq!(stale_delete_plan(ContentType::Tutorials).last().unwrap().table, "tutorials");
        assert_eq!(stale_delete_plan(ContentType::Professors).last().unwrap().table, "professors");
    }
}

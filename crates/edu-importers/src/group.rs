//! Classify repository files by content type and group them per entity.

use std::collections::BTreeMap;

use edu_core::{ChangedContent, ChangedFile, ContentType, SyncErrors};

/// How paths of one content type map onto entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingRule {
    pub content_type: ContentType,
    pub root: &'static str,
    /// Leading segments that identify one entity, e.g. 2 for `courses/<id>`.
    pub id_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDetails {
    pub id: String,
    pub parent: Option<String>,
    pub group_path: String,
    pub full_path: String,
    pub language: String,
}

const QUIZ_SEGMENT: &str = "quizz";

pub fn grouping_rule(content_type: ContentType) -> GroupingRule {
    let (root, id_depth) = match content_type {
        ContentType::Courses => ("courses", 2),
        ContentType::QuizQuestions => ("courses", 4),
        ContentType::Tutorials => ("tutorials", 3),
        ContentType::Resources => ("resources", 3),
        ContentType::Professors => ("professors", 2),
        ContentType::Events => ("events", 2),
        ContentType::Legals => ("legals", 2),
        ContentType::Blogs => ("blogs", 3),
        ContentType::BCertificates => ("bcert", 2),
    };
    GroupingRule {
        content_type,
        root,
        id_depth,
    }
}

impl GroupingRule {
    pub fn matches(&self, path: &str) -> bool {
        let mut segments = path.split('/');
        if segments.next() != Some(self.root) {
            return false;
        }
        let is_quiz = path.split('/').nth(2) == Some(QUIZ_SEGMENT);
        match self.content_type {
            ContentType::Courses => !is_quiz && path.contains('/'),
            ContentType::QuizQuestions => is_quiz,
            _ => path.contains('/'),
        }
    }

    /// Decompose `<root>/[<parent>/]<id>/<language>.<ext>` by position.
    pub fn parse_details_from_path(&self, path: &str) -> Result<PathDetails, String> {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments.len() <= self.id_depth || segments.iter().any(|s| s.is_empty()) {
            return Err(format!(
                "Invalid {} path {path}: expected at least {} segments",
                self.content_type,
                self.id_depth + 1
            ));
        }

        let id = segments[self.id_depth - 1].to_string();
        let parent = match self.content_type {
            ContentType::Tutorials | ContentType::Resources | ContentType::Blogs => {
                Some(segments[1].to_string())
            }
            ContentType::QuizQuestions => Some(segments[1].to_string()),
            _ => None,
        };
        let file_name = segments[segments.len() - 1];
        let stem = file_name.split_once('.').map(|(s, _)| s).unwrap_or(file_name);

        Ok(PathDetails {
            id,
            parent,
            group_path: segments[..self.id_depth].join("/"),
            full_path: path.to_string(),
            language: stem.to_lowercase(),
        })
    }
}

/// Group every file of `content_type` into one [`ChangedContent`] per entity.
///
/// Malformed paths are recorded in `errors` and skipped.
pub fn group_by_type(
    content_type: ContentType,
    files: &[ChangedFile],
    errors: &mut SyncErrors,
) -> Vec<ChangedContent> {
    let rule = grouping_rule(content_type);
    let mut groups: BTreeMap<String, ChangedContent> = BTreeMap::new();

    for file in files.iter().filter(|f| rule.matches(&f.path)) {
        let details = match rule.parse_details_from_path(&file.path) {
            Ok(details) => details,
            Err(message) => {
                errors.push_error(message);
                continue;
            }
        };
        groups
            .entry(details.group_path.clone())
            .or_insert_with(|| ChangedContent {
                content_type,
                natural_id: details.id,
                group_path: details.group_path,
                parent: details.parent,
                files: Vec::new(),
            })
            .files
            .push(file.clone());
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> Vec<ChangedFile> {
        paths
            .iter()
            .map(|p| ChangedFile::from_bytes(*p, "", 0))
            .collect()
    }

    #[test]
    fn path_details_recover_id_and_lowercase_language() {
        let rule = grouping_rule(ContentType::Courses);
        let details = rule.parse_details_from_path("courses/btc101/PT.md").unwrap();
        assert_eq!(details.id, "btc101");
        assert_eq!(details.language, "pt");
        assert_eq!(details.group_path, "courses/btc101");

        let rule = grouping_rule(ContentType::Tutorials);
        let details = rule
            .parse_details_from_path("tutorials/wallet/green-wallet/en.md")
            .unwrap();
        assert_eq!(details.id, "green-wallet");
        assert_eq!(details.parent.as_deref(), Some("wallet"));
    }

    #[test]
    fn course_files_collapse_into_one_group_and_skip_quizzes() {
        let mut errors = SyncErrors::new();
        let input = files(&[
            "courses/btc101/course.yml",
            "courses/btc101/en.md",
            "courses/btc101/fr.md",
            "courses/btc101/quizz/001/question.yml",
            "courses/lnp201/en.md",
            "tutorials/wallet/green/en.md",
        ]);

        let groups = group_by_type(ContentType::Courses, &input, &mut errors);

        assert!(!errors.has_errors());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].natural_id, "btc101");
        assert_eq!(groups[0].files.len(), 3);
        assert_eq!(groups[1].natural_id, "lnp201");
    }

    #[test]
    fn quiz_questions_group_under_their_course() {
        let mut errors = SyncErrors::new();
        let input = files(&[
            "courses/btc101/quizz/001/question.yml",
            "courses/btc101/quizz/001/en.yml",
            "courses/btc101/en.md",
        ]);
        let groups = group_by_type(ContentType::QuizQuestions, &input, &mut errors);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].natural_id, "001");
        assert_eq!(groups[0].parent.as_deref(), Some("btc101"));
        assert_eq!(groups[0].files.len(), 2);
    }

    #[test]
    fn short_paths_are_errors_not_panics() {
        let mut errors = SyncErrors::new();
        let input = files(&["courses/README.md", "courses/btc101/en.md"]);

        let groups = group_by_type(ContentType::Courses, &input, &mut errors);

        assert_eq!(groups.len(), 1);
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.errors()[0].contains("courses/README.md"));
    }
}

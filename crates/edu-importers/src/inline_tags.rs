//! Metadata carried in Markdown as inline pseudo-tags, e.g.
//! `<chapterId>6a0e...</chapterId>`.

use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::InlineToken;

/// Closed vocabulary of recognised tags. Anything else stays in the content.
pub const INLINE_TAGS: [&str; 19] = [
    "chapterId",
    "partId",
    "professor",
    "releasePlace",
    "isOnline",
    "isInPerson",
    "isCourseReview",
    "isCourseExam",
    "isCourseConclusion",
    "startDate",
    "endDate",
    "timeZone",
    "addressLine1",
    "addressLine2",
    "addressLine3",
    "liveUrl",
    "chatUrl",
    "availableSeats",
    "liveLanguage",
];

/// Tokens scanned after an opening tag when re-joining a value that the
/// tokenizer split around underscores.
pub const UNDERSCORE_LOOKAHEAD: usize = 10;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let names = INLINE_TAGS.join("|");
    Regex::new(&format!(r"<(?:{names})>[\s\S]*?</(?:{names})>[ \t]*\n?")).expect("inline tag regex")
});

/// Every value of `tag` in `children`, in document order.
///
/// The tokenizer emits `_` and `*` as tokens of their own, so `foo_bar`
/// arrives as `foo`, `_`, `bar`. When such a marker shows up before the
/// closing tag the fragments are concatenated again, scanning at most
/// [`UNDERSCORE_LOOKAHEAD`] - 1 tokens past the opening tag. If the closing
/// tag is not reached within that window the partial value is returned.
pub fn extract_tag_values(children: &[InlineToken], tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();

    for (i, token) in children.iter().enumerate() {
        if token.content != open {
            continue;
        }
        let window = children[i + 1..]
            .iter()
            .take(UNDERSCORE_LOOKAHEAD - 1)
            .take_while(|t| t.content != close)
            .collect::<Vec<_>>();
        let Some(first) = window.first() else {
            if children.get(i + 1).is_some() {
                values.push(String::new());
            }
            continue;
        };

        let value = if window.iter().any(|t| is_split_marker(&t.content)) {
            window.iter().map(|t| t.content.as_str()).collect::<String>()
        } else {
            first.content.clone()
        };
        values.push(value.trim().to_string());
    }
    values
}

fn is_split_marker(content: &str) -> bool {
    content == "_" || content == "*"
}

pub fn extract_tag_value(children: &[InlineToken], tag: &str) -> Option<String> {
    extract_tag_values(children, tag).into_iter().next()
}

/// Remove every recognised tag (with its value) from raw Markdown.
pub fn strip_inline_tags(raw: &str) -> String {
    TAG_PATTERN.replace_all(raw, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::tokenize_inline;

    #[test]
    fn extracts_value_followed_by_siblings() {
        let tokens = tokenize_inline("<chapterId>abc-123</chapterId>\n<isOnline>true</isOnline> trailing *text*");
        assert_eq!(extract_tag_value(&tokens, "chapterId").as_deref(), Some("abc-123"));
        assert_eq!(extract_tag_value(&tokens, "isOnline").as_deref(), Some("true"));
        assert_eq!(extract_tag_value(&tokens, "partId"), None);
    }

    #[test]
    fn rejoins_underscore_fragments() {
        let tokens = tokenize_inline("<liveLanguage>foo_bar</liveLanguage>");
        assert_eq!(extract_tag_value(&tokens, "liveLanguage").as_deref(), Some("foo_bar"));

        let tokens = tokenize_inline("<liveUrl>https://x.org/a__b_c</liveUrl>");
        assert_eq!(
            extract_tag_value(&tokens, "liveUrl").as_deref(),
            Some("https://x.org/a__b_c")
        );
    }

    #[test]
    fn rejoin_stops_at_the_lookahead_bound() {
        let tokens = tokenize_inline("<timeZone>a_b_c_d_e_f</timeZone>");
        let value = extract_tag_value(&tokens, "timeZone").unwrap();
        assert_eq!(value, "a_b_c_d_e");
        assert_ne!(value, "a_b_c_d_e_f");
    }

    #[test]
    fn rejoins_asterisk_fragments() {
        let tokens = tokenize_inline("<liveUrl>https://meet.example/room*1</liveUrl>");
        assert_eq!(
            extract_tag_value(&tokens, "liveUrl").as_deref(),
            Some("https://meet.example/room*1")
        );

        let tokens = tokenize_inline("<liveLanguage>a*b_c</liveLanguage>");
        assert_eq!(extract_tag_value(&tokens, "liveLanguage").as_deref(), Some("a*b_c"));
    }

    #[test]
    fn empty_tag_yields_empty_value() {
        let tokens = tokenize_inline("<partId></partId>");
        assert_eq!(extract_tag_value(&tokens, "partId").as_deref(), Some(""));
    }

    #[test]
    fn repeated_tags_yield_every_value() {
        let tokens = tokenize_inline("<professor>alice</professor>\n<professor>bob_smith</professor>");
        assert_eq!(
            extract_tag_values(&tokens, "professor"),
            vec!["alice".to_string(), "bob_smith".to_string()]
        );
    }

    #[test]
    fn strip_removes_only_known_tags() {
        let raw = "<chapterId>abc</chapterId>\nIntro with <b>bold</b>\n<startDate>2024-01-01</startDate>";
        assert_eq!(strip_inline_tags(raw), "Intro with <b>bold</b>\n");
    }
}

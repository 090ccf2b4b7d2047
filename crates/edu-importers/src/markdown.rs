//! Minimal block + inline Markdown tokenizer.
//!
//! Only the structure the importers rely on is recognised: ATX headings,
//! fenced code, HTML blocks and paragraphs, with inline HTML, code spans,
//! soft breaks and emphasis delimiters. Every block keeps its raw source so
//! content can be stored verbatim.
//!
//! Emphasis delimiters (`_` and `*`) are always emitted as their own one
//! character text tokens, so `foo_bar` tokenizes as `foo`, `_`, `bar`. The
//! inline tag extraction depends on this exact fragmentation.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    HtmlBlock,
    Fence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockToken {
    pub kind: BlockKind,
    /// Source lines of the block, unmodified.
    pub raw: String,
    /// Inline source: heading text, paragraph text or the HTML itself.
    pub content: String,
    pub children: Vec<InlineToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    Text,
    HtmlInline,
    Code,
    SoftBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineToken {
    pub kind: InlineKind,
    pub content: String,
}

impl InlineToken {
    fn new(kind: InlineKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").expect("heading regex"));
static SINGLE_TAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^ {0,3}</?[A-Za-z][A-Za-z0-9-]*(?:\s+[^<>]*)?/?>\s*$"#).expect("single tag regex")
});
static BLOCK_TAG_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^ {0,3}(?:<!--|</?(?:address|article|aside|blockquote|details|dialog|div|dl|fieldset|figcaption|figure|footer|form|h[1-6]|header|hr|iframe|li|main|nav|ol|p|pre|section|summary|table|tbody|td|th|thead|tr|ul|video)(?:\s|/?>|$))",
    )
    .expect("block tag regex")
});
static INLINE_HTML: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:<!--[\s\S]*?-->|</?[A-Za-z][A-Za-z0-9-]*(?:\s+[^<>]*?)?/?>)"#).expect("inline html regex")
});

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn fence_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m))
}

fn parse_heading(line: &str) -> Option<(u8, String)> {
    let caps = HEADING.captures(line)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    Some((level, text.to_string()))
}

fn starts_html_block(line: &str, interrupting: bool) -> bool {
    BLOCK_TAG_START.is_match(line) || (!interrupting && SINGLE_TAG_LINE.is_match(line))
}

/// Split a document into block tokens.
pub fn tokenize(source: &str) -> Vec<BlockToken> {
    let normalized = source.replace("\r\n", "\n");
    let lines = normalized.lines().collect::<Vec<_>>();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if is_blank(line) {
            i += 1;
            continue;
        }

        if let Some(marker) = fence_marker(line) {
            let start = i;
            i += 1;
            while i < lines.len() && fence_marker(lines[i]) != Some(marker) {
                i += 1;
            }
            let end = (i + 1).min(lines.len());
            let inner_end = i.min(lines.len());
            blocks.push(BlockToken {
                kind: BlockKind::Fence,
                raw: lines[start..end].join("\n"),
                content: lines[start + 1..inner_end].join("\n"),
                children: Vec::new(),
            });
            i = end;
            continue;
        }

        if let Some((level, text)) = parse_heading(line) {
            blocks.push(BlockToken {
                kind: BlockKind::Heading(level),
                raw: line.to_string(),
                children: tokenize_inline(&text),
                content: text,
            });
            i += 1;
            continue;
        }

        if starts_html_block(line, false) {
            let start = i;
            while i < lines.len() && !is_blank(lines[i]) {
                i += 1;
            }
            let raw = lines[start..i].join("\n");
            blocks.push(BlockToken {
                kind: BlockKind::HtmlBlock,
                children: tokenize_inline(raw.trim()),
                content: raw.trim().to_string(),
                raw,
            });
            continue;
        }

        let start = i;
        i += 1;
        while i < lines.len() {
            let next = lines[i];
            if is_blank(next)
                || parse_heading(next).is_some()
                || fence_marker(next).is_some()
                || starts_html_block(next, true)
            {
                break;
            }
            i += 1;
        }
        let raw = lines[start..i].join("\n");
        let content = lines[start..i]
            .iter()
            .map(|l| l.trim())
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(BlockToken {
            kind: BlockKind::Paragraph,
            children: tokenize_inline(&content),
            content,
            raw,
        });
    }

    blocks
}

/// Split inline text into tokens.
pub fn tokenize_inline(text: &str) -> Vec<InlineToken> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let flush = |buffer: &mut String, tokens: &mut Vec<InlineToken>| {
        if !buffer.is_empty() {
            tokens.push(InlineToken::new(InlineKind::Text, std::mem::take(buffer)));
        }
    };

    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        match ch {
            '<' => {
                if let Some(m) = INLINE_HTML.find(rest) {
                    flush(&mut buffer, &mut tokens);
                    tokens.push(InlineToken::new(InlineKind::HtmlInline, m.as_str()));
                    pos += m.end();
                    continue;
                }
                buffer.push(ch);
            }
            '`' => {
                let ticks = rest.len() - rest.trim_start_matches('`').len();
                let fence = &rest[..ticks];
                if let Some(close) = rest[ticks..].find(fence) {
                    flush(&mut buffer, &mut tokens);
                    let inner = &rest[ticks..ticks + close];
                    tokens.push(InlineToken::new(InlineKind::Code, inner.trim()));
                    pos += ticks + close + ticks;
                    continue;
                }
                buffer.push_str(fence);
                pos += ticks;
                continue;
            }
            '_' | '*' => {
                flush(&mut buffer, &mut tokens);
                tokens.push(InlineToken::new(InlineKind::Text, ch.to_string()));
            }
            '\n' => {
                let trimmed = buffer.trim_end().len();
                buffer.truncate(trimmed);
                flush(&mut buffer, &mut tokens);
                tokens.push(InlineToken::new(InlineKind::SoftBreak, "\n"));
            }
            '\\' => {
                if let Some(next) = rest[1..].chars().next().filter(|c| c.is_ascii_punctuation()) {
                    buffer.push(next);
                    pos += 1 + next.len_utf8();
                    continue;
                }
                buffer.push(ch);
            }
            _ => buffer.push(ch),
        }
        pos += ch.len_utf8();
    }
    flush(&mut buffer, &mut tokens);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(tokens: &[InlineToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.content.as_str()).collect()
    }

    #[test]
    fn blocks_keep_raw_source() {
        let src = "# Part one\n\nSome *intro* text\nwrapped.\n\n## Chapter\n\n```rust\nlet a_b = 1;\n```\n";
        let blocks = tokenize(src);
        let kinds = blocks.iter().map(|b| b.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(1),
                BlockKind::Paragraph,
                BlockKind::Heading(2),
                BlockKind::Fence
            ]
        );
        assert_eq!(blocks[0].content, "Part one");
        assert_eq!(blocks[1].raw, "Some *intro* text\nwrapped.");
        assert_eq!(blocks[3].raw, "```rust\nlet a_b = 1;\n```");
    }

    #[test]
    fn underscores_fragment_text_tokens() {
        let tokens = tokenize_inline("<chapterId>foo_bar</chapterId>");
        assert_eq!(
            contents(&tokens),
            vec!["<chapterId>", "foo", "_", "bar", "</chapterId>"]
        );
        assert_eq!(tokens[0].kind, InlineKind::HtmlInline);
    }

    #[test]
    fn tag_lines_inside_paragraphs_stay_inline() {
        let blocks = tokenize("<chapterId>abc-123</chapterId>\n<isOnline>true</isOnline>\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(
            contents(&blocks[0].children),
            vec![
                "<chapterId>",
                "abc-123",
                "</chapterId>",
                "\n",
                "<isOnline>",
                "true",
                "</isOnline>"
            ]
        );
    }

    #[test]
    fn standalone_block_html_is_an_html_block() {
        let blocks = tokenize("<div class=\"note\">\nhello\n</div>\n\ntext");
        assert_eq!(blocks[0].kind, BlockKind::HtmlBlock);
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn code_spans_are_not_split() {
        let tokens = tokenize_inline("use `snake_case` here");
        assert_eq!(contents(&tokens), vec!["use ", "snake_case", " here"]);
        assert_eq!(tokens[1].kind, InlineKind::Code);
    }

    #[test]
    fn headings_need_a_space_after_hashes() {
        assert!(parse_heading("#hashtag").is_none());
        assert_eq!(parse_heading("### Section ###"), Some((3, "Section".to_string())));
    }
}

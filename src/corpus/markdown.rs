//! Markdown segmentation: page splitting, ATX headings, slugs and plain text.
use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, TagEnd};
use regex::Regex;
use serde::Serialize;

static ATX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").unwrap()
});

/// A span of a document bounded by a heading.
///
/// Offsets are byte offsets into the owning document's text: `start` is the
/// heading line, `body_start` the first byte after it, `end` the start of the
/// next heading (or the end of the text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub heading: String,
    pub slug: String,
    /// 1..=6 for ATX headings, 0 for synthetic sections.
    pub depth: u8,
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
    /// Heading and body with markup stripped, used for indexing.
    pub plain: String,
}

impl Section {
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.depth == 0
    }
}

/// Splits concatenated pages on lines equal to `delimiter`.
///
/// Delimiters inside fenced code blocks are ordinary text. Blank pages are
/// dropped; if every page is blank the whole text is returned as one page.
pub fn split_pages(text: &str, delimiter: &str) -> Vec<Range<usize>> {
    let marker = delimiter.trim();
    let mut pages = Vec::new();
    let mut fence = FenceState::default();
    let mut page_start = 0;

    for (offset, line) in lines_with_offsets(text) {
        if fence.advance(line) {
            continue;
        }
        if !marker.is_empty() && line.trim() == marker {
            pages.push(page_start..offset);
            page_start = offset + line.len();
        }
    }
    pages.push(page_start..text.len());

    let pages: Vec<Range<usize>> = pages
        .into_iter()
        .filter(|r| !text[r.clone()].trim().is_empty())
        .collect();

    if pages.is_empty() {
        vec![0..text.len()]
    } else {
        pages
    }
}

/// Segments a document into sections at ATX headings.
///
/// `fallback_heading` names the synthetic section used for a document
/// without headings, or for non-blank text before the first heading.
pub fn parse_sections(text: &str, fallback_heading: &str) -> Vec<Section> {
    let headings = scan_headings(text);
    let mut slugs = SlugRegistry::default();
    let mut sections = Vec::with_capacity(headings.len() + 1);

    let first_start = headings.first().map_or(text.len(), |h| h.start);
    let preamble = &text[..first_start];
    if headings.is_empty() || !preamble.trim().is_empty() {
        sections.push(Section {
            heading: fallback_heading.to_string(),
            slug: slugs.claim(""),
            depth: 0,
            start: 0,
            body_start: 0,
            end: first_start,
            plain: strip_markup(preamble).trim().to_string(),
        });
    }

    for (i, heading) in headings.iter().enumerate() {
        let end = headings.get(i + 1).map_or(text.len(), |next| next.start);
        let body = strip_markup(&text[heading.body_start..end]);
        sections.push(Section {
            heading: heading.text.clone(),
            slug: slugs.claim(&slugify(&heading.text)),
            depth: heading.depth,
            start: heading.start,
            body_start: heading.body_start,
            end,
            plain: format!("{}\n{}", heading.text, body.trim()),
        });
    }

    sections
}

/// Derives the anchor slug of a heading: lowercase, whitespace to `-`,
/// everything else that is not alphanumeric or `-` removed.
pub fn slugify(heading: &str) -> String {
    heading
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('-')
            } else if c.is_alphanumeric() || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Renders markdown to plain text: link and image syntax, emphasis and raw
/// HTML are dropped; link text, image alt text and code are kept.
pub fn strip_markup(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::TableCell) => out.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableHead
                | TagEnd::TableRow,
            ) => out.push('\n'),
            _ => {}
        }
    }

    out
}

// ── Internals ────────────────────────────────────────────────────────

struct RawHeading {
    depth: u8,
    text: String,
    start: usize,
    body_start: usize,
}

fn scan_headings(text: &str) -> Vec<RawHeading> {
    let mut headings = Vec::new();
    let mut fence = FenceState::default();

    for (offset, line) in lines_with_offsets(text) {
        if fence.advance(line) {
            continue;
        }
        let content = line.trim_end_matches(['\n', '\r']);
        if let Some(caps) = ATX_HEADING.captures(content) {
            let raw = caps.get(2).map_or("", |m| m.as_str());
            headings.push(RawHeading {
                depth: caps[1].len() as u8,
                text: heading_text(raw),
                start: offset,
                body_start: offset + line.len(),
            });
        }
    }

    headings
}

/// Inline markup of a heading, flattened to single-spaced text.
fn heading_text(raw: &str) -> String {
    // Parsed inside a heading so "1. Foo" is not read as a list item.
    let stripped = strip_markup(&format!("# {raw}"));
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

/// Tracks fenced code blocks (``` or ~~~) line by line.
#[derive(Default)]
struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Feeds one line; returns `true` if the line is a fence or inside one.
    fn advance(&mut self, line: &str) -> bool {
        let content = line.trim_end_matches(['\n', '\r']);
        let rest = content.trim_start_matches(' ');
        let marker = if content.len() - rest.len() <= 3 {
            fence_marker(rest)
        } else {
            None
        };

        match (self.open, marker) {
            (None, Some(open)) => {
                self.open = Some(open);
                true
            }
            (Some((ch, len)), Some((close_ch, close_len)))
                if close_ch == ch && close_len >= len && rest[close_len..].trim().is_empty() =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

fn fence_marker(rest: &str) -> Option<(char, usize)> {
    let ch = rest.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = rest.chars().take_while(|&c| c == ch).count();
    (len >= 3).then_some((ch, len))
}

#[derive(Default)]
struct SlugRegistry {
    taken: HashSet<String>,
}

impl SlugRegistry {
    fn claim(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIM: &str = "<!-- handbook-page-break -->";

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Building Composites"), "building-composites");
        assert_eq!(slugify("Ha-cy (Cyrillic)"), "ha-cy-cyrillic");
        assert_eq!(slugify("What’s New?"), "whats-new");
        assert_eq!(slugify("  Überschrift  "), "überschrift");
    }

    #[test]
    fn test_heading_depths_and_offsets() {
        let text = "# Components\n\nIntro.\n\n#### Building Composites\n\nUse Create Composite.\n";
        let sections = parse_sections(text, "components");

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].depth, 1);
        assert_eq!(sections[0].slug, "components");
        assert_eq!(sections[1].depth, 4);
        assert_eq!(sections[1].heading, "Building Composites");
        assert_eq!(sections[1].slug, "building-composites");
        assert!(text[sections[1].start..sections[1].end].starts_with("#### Building"));
        assert_eq!(
            text[sections[1].body_start..sections[1].end].trim(),
            "Use Create Composite."
        );
        assert_eq!(sections[0].end, sections[1].start);
    }

    #[test]
    fn test_duplicate_slugs_get_suffixes() {
        let text = "# Options\n\n## Options\n\n## Options\n\n## Options-1\n";
        let slugs: Vec<String> = parse_sections(text, "x")
            .into_iter()
            .map(|s| s.slug)
            .collect();
        assert_eq!(slugs, vec!["options", "options-1", "options-2", "options-1-1"]);
    }

    #[test]
    fn test_no_headings_yields_synthetic_section() {
        let text = "Just a paragraph with [a link](https://example.com).";
        let sections = parse_sections(text, "notes");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].slug, "");
        assert_eq!(sections[0].heading, "notes");
        assert!(sections[0].is_synthetic());
        assert_eq!(sections[0].end, text.len());
        assert_eq!(sections[0].plain, "Just a paragraph with a link.");
    }

    #[test]
    fn test_preamble_becomes_synthetic_section() {
        let text = "Preface text.\n\n# Title\n\nBody.\n";
        let sections = parse_sections(text, "doc");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].slug, "");
        assert_eq!(sections[1].slug, "title");
    }

    #[test]
    fn test_headings_inside_code_fences_are_ignored() {
        let text = "# Real\n\n```python\n# not a heading\n```\n\n~~~~\n## also not\n~~~\n~~~~\n";
        let sections = parse_sections(text, "x");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].plain.contains("not a heading"));
    }

    #[test]
    fn test_heading_syntax_variants() {
        let text = "## Closing hashes ##\n#hashtag\n   ### Indented\n## *Emphasis* and `code`\n";
        let headings: Vec<String> = parse_sections(text, "x")
            .into_iter()
            .map(|s| s.heading)
            .collect();
        assert_eq!(
            headings,
            vec!["Closing hashes", "Indented", "Emphasis and code"]
        );
    }

    #[test]
    fn test_strip_markup() {
        let md = "See ![Kerning panel](img/kerning.png) and [Components](components.md#x).\n\n\
                  <img src=\"a.png\">\n\n**Bold** _text_";
        let plain = strip_markup(md);
        assert!(plain.contains("See Kerning panel and Components."));
        assert!(plain.contains("Bold text"));
        assert!(!plain.contains("img/kerning.png"));
        assert!(!plain.contains("<img"));
        assert!(!plain.contains("components.md"));
    }

    #[test]
    fn test_split_pages() {
        let text = format!("# Components\n\nA\n{DELIM}\n# Create\n\nB\n");
        let pages = split_pages(&text, DELIM);
        assert_eq!(pages.len(), 2);
        assert!(text[pages[0].clone()].starts_with("# Components"));
        assert!(text[pages[1].clone()].starts_with("# Create"));
        assert!(!text[pages[0].clone()].contains(DELIM));
    }

    #[test]
    fn test_split_pages_ignores_delimiter_in_fence() {
        let text = format!("# Doc\n\n```\n{DELIM}\n```\n\nTail\n");
        let pages = split_pages(&text, DELIM);
        assert_eq!(pages, vec![0..text.len()]);
    }

    #[test]
    fn test_split_pages_drops_blank_parts() {
        let text = format!("{DELIM}\n# Only\n{DELIM}\n\n");
        let pages = split_pages(&text, DELIM);
        assert_eq!(pages.len(), 1);
        assert_eq!(text[pages[0].clone()].trim(), "# Only");

        let blank = format!("{DELIM}\n");
        assert_eq!(split_pages(&blank, DELIM), vec![0..blank.len()]);
    }
}

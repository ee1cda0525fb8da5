//! Markdown rendering for assistant answers.
//!
//! Answers arrive as loosely formatted text in which list items are often
//! glued together (`1. Travel2. Food`). `normalize` re-inserts the line breaks
//! a markdown parser needs; `to_html` parses with hard line breaks and drops
//! anything that could run script in the page.

use std::sync::LazyLock;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use regex::Regex;

#[cfg(test)]
#[path = "markdown_test.rs"]
mod markdown_test;

const UNSAFE_SCHEMES: [&str; 4] = ["javascript:", "vbscript:", "data:", "file:"];

// =============================================================================
// NORMALIZATION
// =============================================================================

static GLUED_NUMBER: LazyLock<Regex> = LazyLock::new(|| regex(r"([^\n\d])(\d+\.\s)"));
static GLUED_DASH: LazyLock<Regex> = LazyLock::new(|| regex(r"([^\n])(-\s)"));
static DOT_BULLET: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^[ \t]*•[ \t]+"));
static COLON_LIST: LazyLock<Regex> = LazyLock::new(|| regex(r":\s*(\d+\.|-\s)"));
static NUMBERED_SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?m)(^[ \t]*\d+\.\s[^\n]+?)((?:These|This|Those|The|Our|We|Advantis)[A-Za-z])")
});
static NUMBERED_CASE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^([ \t]*\d+\.\s+[A-Za-z]*[a-z])([A-Z])"));
static BULLET_SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?m)(^[ \t]*[-*+]\s[^\n]+?)((?:These|This|Those|The|Our|We|Advantis)[A-Za-z])")
});
static BULLET_CASE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^([ \t]*[-*+]\s+[A-Za-z]*[a-z])([A-Z])"));

fn regex(pattern: &str) -> Regex {
    // Patterns are constants covered by tests.
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid pattern {pattern}: {e}"))
}

/// Re-insert the line breaks that glued list items and sentences lost.
#[must_use]
pub fn normalize(md: &str) -> String {
    let md = GLUED_NUMBER.replace_all(md, "$1\n$2");
    let md = GLUED_DASH.replace_all(&md, "$1\n$2");
    let md = DOT_BULLET.replace_all(&md, "- ");
    let md = COLON_LIST.replace_all(&md, ":\n$1");
    let md = NUMBERED_SENTENCE.replace_all(&md, "$1\n$2");
    let md = NUMBERED_CASE.replace_all(&md, "$1\n$2");
    let md = BULLET_SENTENCE.replace_all(&md, "$1\n$2");
    let md = BULLET_CASE.replace_all(&md, "$1\n$2");
    md.into_owned()
}

// =============================================================================
// RENDERING
// =============================================================================

/// Normalize, parse and sanitize `md` into an HTML fragment. Never fails.
#[must_use]
pub fn to_html(md: &str) -> String {
    let normalized = normalize(md);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(&normalized, options).filter_map(|event| match event {
        Event::Html(_) | Event::InlineHtml(_) => None,
        Event::SoftBreak => Some(Event::HardBreak),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Some(Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        })),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Some(Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        })),
        other => Some(other),
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let squeezed: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if UNSAFE_SCHEMES.iter().any(|scheme| squeezed.starts_with(scheme)) {
        CowStr::Borrowed("")
    } else {
        url
    }
}

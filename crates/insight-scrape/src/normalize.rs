//! Shared content normalization for all scrapers.
//!
//! Every scraper runs its extracted text through [`clean_content`] and
//! renders the final block with [`format_signal`], so the downstream LLM
//! analysis step always sees the same markdown-like shape regardless of
//! source. Both functions are pure: the same input always yields
//! byte-identical output.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)>")
        .expect("script/style regex is valid")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex is valid"));

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid"));

/// Strip markup and collapse whitespace into normalized plain text.
///
/// Removes `<script>`/`<style>` blocks, then all remaining tags, decodes the
/// common HTML entities, trims every line, and collapses runs of blank lines
/// down to one separator. Running the result through `clean_content` again
/// yields the same string.
#[must_use]
pub fn clean_content(raw: &str) -> String {
    let no_scripts = SCRIPT_STYLE.replace_all(raw, " ");
    let no_tags = TAG.replace_all(&no_scripts, " ");
    let decoded = decode_entities(&no_tags);

    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_pending = !lines.is_empty();
        } else {
            if blank_pending {
                lines.push(String::new());
                blank_pending = false;
            }
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

fn decode_entities(input: &str) -> String {
    // Longest-first so "&amp;" doesn't leave a dangling suffix.
    const ENTITIES: [(&str, &str); 6] = [
        ("&nbsp;", " "),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&amp;", "&"),
    ];
    let mut out = input.to_owned();
    for (entity, plain) in ENTITIES {
        out = out.replace(entity, plain);
    }
    out
}

/// Extract the `<title>` of an HTML document, cleaned, if present.
#[must_use]
pub fn extract_html_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| clean_content(m.as_str()))
        .filter(|t| !t.is_empty())
}

/// Render one scraped item as the uniform markdown block.
///
/// Layout: a `##` title line, one `**Key**: value` line per metadata field
/// (in the order given), then the cleaned body separated by a blank line.
/// Fields with empty values are skipped.
#[must_use]
pub fn format_signal(title: &str, fields: &[(&str, String)], body: &str) -> String {
    let mut out = String::new();
    let title = clean_content(title);
    out.push_str("## ");
    out.push_str(if title.is_empty() { "(untitled)" } else { &title });
    out.push('\n');

    for (key, value) in fields {
        if value.is_empty() {
            continue;
        }
        out.push_str("\n**");
        out.push_str(key);
        out.push_str("**: ");
        out.push_str(value);
    }

    let body = clean_content(body);
    if !body.is_empty() {
        out.push_str("\n\n");
        out.push_str(&body);
    }
    out
}

//! Summary cleanup and representative-image extraction for feed entries.

use feed_rs::model::Entry;
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum summary length, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[A-Za-z/!?][^>]*>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

/// Strip markup from a feed summary and bound its length.
///
/// Tags are stripped, entities decoded, then tags stripped again to drop
/// escaped markup (`&lt;b&gt;`). Only `<` followed by a letter, `/`, `!` or
/// `?` starts a tag, so decoded comparisons like `3 < 5` are kept.
pub fn clean_summary(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let stripped = TAG_RE.replace_all(raw, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let stripped = TAG_RE.replace_all(&decoded, " ");
    let collapsed = WS_RE.replace_all(&stripped, " ");
    truncate_chars(collapsed.trim(), MAX_SUMMARY_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Pick a representative image for an entry.
///
/// Precedence, first match wins:
/// 1. media content carrying a URL (untyped or `image/*`)
/// 2. the first media thumbnail
/// 3. an enclosure link typed `image/*`
/// 4. the first `<img src>` in the entry's HTML content, then its summary
///
/// feed-rs folds audio and video enclosures into `entry.media` alongside
/// Media RSS images, so media content with a non-image type is skipped.
pub fn extract_image(entry: &Entry) -> Option<String> {
    let media_content = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| {
            let url = c.url.as_ref()?;
            let is_image = c
                .content_type
                .as_ref()
                .map(|m| m.to_string().starts_with("image"))
                .unwrap_or(true);
            is_image.then(|| url.to_string())
        });
    if media_content.is_some() {
        return media_content;
    }

    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.trim())
        .find(|uri| !uri.is_empty());
    if let Some(uri) = thumbnail {
        return Some(uri.to_string());
    }

    let enclosure = entry.links.iter().find(|l| {
        l.rel
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("enclosure"))
            .unwrap_or(false)
            && l.media_type
                .as_deref()
                .map(|t| t.starts_with("image"))
                .unwrap_or(false)
    });
    if let Some(link) = enclosure {
        return Some(link.href.clone());
    }

    let content_html = entry.content.as_ref().and_then(|c| c.body.as_deref());
    let summary_html = entry.summary.as_ref().map(|s| s.content.as_str());
    content_html
        .and_then(first_img_src)
        .or_else(|| summary_html.and_then(first_img_src))
}

pub fn first_img_src(html: &str) -> Option<String> {
    IMG_SRC_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|src| !src.is_empty())
}

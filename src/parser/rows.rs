use std::sync::LazyLock;

use regex::Regex;

static TR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>").unwrap());
static TD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<td([^>]*)>(.*?)</td>").unwrap());
static ENTRY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href="([^"]*/(?:result|survey)/[^"]*)""#).unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// One listing row, tag-stripped but otherwise uninterpreted.
///
/// `full_text` carries the whole row plus any detail row that follows it,
/// flattened so field regexes can run over a single string.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub university: String,
    pub program_text: String,
    pub date_text: String,
    pub full_text: String,
    pub url: Option<String>,
}

/// Split one listings page into raw rows. Detail rows (a single full-width
/// cell under the main row) are folded into the preceding row's text.
pub fn split_rows(html: &str, page_url: &str) -> Vec<RawRow> {
    let body = table_body(html);
    let mut rows: Vec<RawRow> = Vec::new();

    for tr in TR_RE.captures_iter(body) {
        let row_html = &tr[1];
        let cells: Vec<(String, String)> = TD_RE
            .captures_iter(row_html)
            .map(|c| (c[1].to_string(), clean_text(&c[2])))
            .collect();

        // Detail row: one spanning cell with the badge cluster.
        if cells.len() == 1 && cells[0].0.contains("colspan") {
            if let Some(prev) = rows.last_mut() {
                prev.full_text.push(' ');
                prev.full_text.push_str(&cells[0].1);
            }
            continue;
        }

        if cells.len() < 4 {
            continue;
        }

        let url = ENTRY_LINK_RE
            .captures(row_html)
            .map(|c| absolutize(&c[1], page_url));

        rows.push(RawRow {
            university: cells[0].1.clone(),
            program_text: cells[1].1.clone(),
            date_text: cells[2].1.clone(),
            full_text: clean_text(row_html),
            url,
        });
    }

    rows
}

fn table_body(html: &str) -> &str {
    let start = html.find("<tbody").unwrap_or(0);
    let end = html[start..]
        .find("</tbody>")
        .map(|i| start + i)
        .unwrap_or(html.len());
    &html[start..end]
}

/// Strip tags, unescape the common entities, collapse whitespace.
pub fn clean_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    let unescaped = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&middot;", "\u{b7}")
        .replace("&nbsp;", " ");
    WS_RE.replace_all(&unescaped, " ").trim().to_string()
}

fn absolutize(href: &str, page_url: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix('/') {
        return format!("{}/{}", origin(page_url), rest);
    }
    format!("{}/{}", page_url.trim_end_matches('/'), href)
}

fn origin(url: &str) -> String {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => url[..after_scheme + i].to_string(),
        None => url.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://www.thegradcafe.com/survey/?page=1";

    #[test]
    fn clean_strips_tags_and_entities() {
        assert_eq!(
            clean_text("<span>Electrical &amp; Computer</span>\n  <b>Engineering</b>"),
            "Electrical & Computer Engineering"
        );
    }

    #[test]
    fn fixture_rows() {
        let html = std::fs::read_to_string("tests/fixtures/survey_page.html").unwrap();
        let rows = split_rows(&html, PAGE_URL);
        assert_eq!(rows.len(), 4);

        let first = &rows[0];
        assert_eq!(first.university, "Johns Hopkins University");
        assert!(first.program_text.contains("Computer Science"));
        assert_eq!(first.date_text, "September 01, 2025");
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.thegradcafe.com/result/901234")
        );
        // Detail row folded into the main row's text.
        assert!(first.full_text.contains("GPA 3.85"));
        assert!(first.full_text.contains("Fall 2025"));
    }

    #[test]
    fn row_without_entry_link_has_no_url() {
        let html = std::fs::read_to_string("tests/fixtures/survey_page.html").unwrap();
        let rows = split_rows(&html, PAGE_URL);
        assert!(rows[3].url.is_none());
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(split_rows("<html><body>No results</body></html>", PAGE_URL).is_empty());
    }

    #[test]
    fn absolute_links_pass_through() {
        assert_eq!(
            absolutize("https://other.site/result/5", PAGE_URL),
            "https://other.site/result/5"
        );
        assert_eq!(
            absolutize("/result/5", PAGE_URL),
            "https://www.thegradcafe.com/result/5"
        );
    }
}

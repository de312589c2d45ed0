use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::record::Status;

// Plausible score bounds. Out-of-range values are discarded to empty, never
// clamped.
const GPA_MIN: f64 = 0.0;
const GPA_MAX: f64 = 4.0;
const GRE_TOTAL_MIN: f64 = 260.0;
const GRE_TOTAL_MAX: f64 = 340.0;
const GRE_VERBAL_MIN: f64 = 130.0;
const GRE_VERBAL_MAX: f64 = 170.0;
const GRE_AW_MIN: f64 = 0.0;
const GRE_AW_MAX: f64 = 6.0;

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(Accepted|Rejected|Interview|Wait\s?listed)\b(?:\s+on\s+(\d{1,2}\s+[A-Za-z]{3,9}|[A-Za-z]{3,9}\s+\d{1,2}(?:,\s+\d{4})?))?",
    )
    .unwrap()
});
static OTHER_STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Pending|Withdrawn|Deferred)\b").unwrap());
static TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Fall|Spring|Summer|Winter)\s+(\d{4})\b").unwrap());
static GPA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bGPA\b[^0-9]{0,12}([0-9]+(?:[.,][0-9]+)?)").unwrap());
static GRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGRE\s*(V(?:erbal)?|AWA?)?\s*[:\s]\s*([0-9]+(?:\.[0-9]+)?)").unwrap()
});
static DEGREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(Masters|Master'?s|M\.?S\.?|PhD|MFA|MBA|JD|EdD|PsyD|Other)\b").unwrap()
});
static DAY_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s+([A-Za-z]{3,9})$").unwrap());
static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{3,9})\s+(\d{1,2})$").unwrap());

/// Decision badge pulled out of a row's flattened text.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: Status,
    /// Verbatim token when the text missed the closed enumeration.
    pub status_raw: Option<String>,
    /// Raw "on <date>" text, resolved to a date later against the row's year.
    pub decided_on: Option<String>,
}

pub fn extract_decision(full_text: &str) -> Option<Decision> {
    if let Some(caps) = STATUS_RE.captures(full_text) {
        return Some(Decision {
            status: Status::parse(&caps[1]),
            status_raw: None,
            decided_on: caps.get(2).map(|m| m.as_str().trim().to_string()),
        });
    }
    OTHER_STATUS_RE.captures(full_text).map(|caps| Decision {
        status: Status::Other,
        status_raw: Some(caps[1].to_string()),
        decided_on: None,
    })
}

/// "fall 2025" → "Fall 2025".
pub fn extract_term(full_text: &str) -> Option<String> {
    TERM_RE.captures(full_text).map(|caps| {
        let season = &caps[1];
        let mut chars = season.chars();
        let season = match chars.next() {
            Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        format!("{} {}", season, &caps[2])
    })
}

pub fn extract_citizenship(full_text: &str) -> Option<String> {
    let low = full_text.to_lowercase();
    if low.contains("international") {
        Some("International".to_string())
    } else if low.contains("american") {
        Some("American".to_string())
    } else {
        None
    }
}

pub fn extract_gpa(full_text: &str) -> Option<f64> {
    let caps = GPA_RE.captures(full_text)?;
    let value: f64 = caps[1].replace(',', ".").parse().ok()?;
    in_range(value, GPA_MIN, GPA_MAX)
}

/// All GRE sub-scores in one pass: (total, verbal, analytical writing).
pub fn extract_gre(full_text: &str) -> (Option<f64>, Option<f64>, Option<f64>) {
    let mut total = None;
    let mut verbal = None;
    let mut aw = None;

    for caps in GRE_RE.captures_iter(full_text) {
        let value: f64 = match caps[2].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match caps.get(1).map(|m| m.as_str().to_lowercase()) {
            None => total = total.or(in_range(value, GRE_TOTAL_MIN, GRE_TOTAL_MAX)),
            Some(q) if q.starts_with('v') => {
                verbal = verbal.or(in_range(value, GRE_VERBAL_MIN, GRE_VERBAL_MAX))
            }
            Some(_) => aw = aw.or(in_range(value, GRE_AW_MIN, GRE_AW_MAX)),
        }
    }

    (total, verbal, aw)
}

/// Split a combined "Program · Degree" cell. The degree token, when present,
/// is canonicalized; everything before it is the program.
pub fn split_program_degree(cell: &str) -> (String, Option<String>) {
    let text = cell.replace('·', " ");
    match DEGREE_RE.find(&text) {
        Some(m) => {
            let program = text[..m.start()]
                .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '-')
                .to_string();
            (program, canonical_degree(m.as_str()))
        }
        None => (text.trim().to_string(), None),
    }
}

fn canonical_degree(token: &str) -> Option<String> {
    let key: String = token
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != '\u{2019}')
        .collect();
    let canon = match key.as_str() {
        "masters" | "master's" | "ms" => "Masters",
        "phd" => "PhD",
        "mfa" => "MFA",
        "mba" => "MBA",
        "jd" => "JD",
        "edd" => "EdD",
        "psyd" => "PsyD",
        "other" => "Other",
        _ => return None,
    };
    Some(canon.to_string())
}

/// Free-text listing date → calendar date. Unknown formats yield `None`;
/// the record is kept either way.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

/// Decision badge dates come with or without a year ("Accepted on 28 Aug");
/// short forms are resolved against the listing year.
pub fn parse_badge_date(text: &str, default_year: Option<i32>) -> Option<NaiveDate> {
    let s = text.trim();
    if let Some(d) = parse_date(s) {
        return Some(d);
    }

    let year = default_year?;
    let (day, month) = if let Some(caps) = DAY_MONTH_RE.captures(s) {
        (caps[1].to_string(), caps[2].to_string())
    } else if let Some(caps) = MONTH_DAY_RE.captures(s) {
        (caps[2].to_string(), caps[1].to_string())
    } else {
        return None;
    };

    let assembled = format!("{day} {month} {year}");
    for fmt in ["%d %b %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&assembled, fmt) {
            return Some(d);
        }
    }
    None
}

fn in_range(value: f64, min: f64, max: f64) -> Option<f64> {
    (min..=max).contains(&value).then_some(value)
}

// ── Tests ──

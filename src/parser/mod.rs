pub mod fields;
pub mod rows;

use crate::record::{Candidate, DropReason, Status};

/// Normalizer output for one page: validated records plus an account of
/// every row that was attempted and why the dropped ones were refused.
#[derive(Debug, Default)]
pub struct PageReport {
    pub attempted: usize,
    pub records: Vec<Candidate>,
    pub dropped: Vec<DropReason>,
}

/// Two-pass pipeline: page HTML → raw rows → coerced, validated records.
pub fn process_page(html: &str, page_url: &str) -> PageReport {
    let raw_rows = rows::split_rows(html, page_url);
    let mut report = PageReport {
        attempted: raw_rows.len(),
        ..Default::default()
    };

    for row in &raw_rows {
        match normalize_row(row) {
            Ok(candidate) => report.records.push(candidate),
            Err(reason) => report.dropped.push(reason),
        }
    }

    report
}

/// Coerce every field independently, then enforce the required set.
/// Optional fields degrade to empty; required ones drop the row.
fn normalize_row(row: &rows::RawRow) -> Result<Candidate, DropReason> {
    let url = row
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(DropReason::MissingUrl)?;

    let university = row.university.trim();
    if university.is_empty() {
        return Err(DropReason::MissingUniversity);
    }

    let (program, degree) = fields::split_program_degree(&row.program_text);
    if program.is_empty() {
        return Err(DropReason::MissingProgram);
    }

    let date_added_raw = row.date_text.trim();
    if date_added_raw.is_empty() {
        return Err(DropReason::MissingDateAdded);
    }
    // Unparsable dates leave the field empty; presence of the raw text is
    // what satisfies the required-field rule.
    let date_added = fields::parse_date(date_added_raw);

    let decision = fields::extract_decision(&row.full_text).ok_or(DropReason::MissingStatus)?;

    let default_year = date_added.map(|d| chrono::Datelike::year(&d));
    let decided = decision
        .decided_on
        .as_deref()
        .and_then(|s| fields::parse_badge_date(s, default_year));
    let (accept_date, reject_date) = match decision.status {
        Status::Accepted => (decided, None),
        Status::Rejected => (None, decided),
        _ => (None, None),
    };

    let (gre_total, gre_verbal, gre_aw) = fields::extract_gre(&row.full_text);

    Ok(Candidate {
        program,
        university: university.to_string(),
        date_added_raw: date_added_raw.to_string(),
        date_added,
        url: url.to_string(),
        status: decision.status,
        status_raw: decision.status_raw,
        term: fields::extract_term(&row.full_text),
        citizenship: fields::extract_citizenship(&row.full_text),
        gpa: fields::extract_gpa(&row.full_text),
        gre_total,
        gre_verbal,
        gre_aw,
        degree,
        comments: None,
        accept_date,
        reject_date,
        canonical_program: None,
        canonical_university: None,
    })
}

// ── Tests ──

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Decision outcome as listed on the survey site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Accepted,
    Rejected,
    Waitlisted,
    Interview,
    Other,
}

impl Status {
    /// Case-insensitive prefix/substring match against the closed set.
    /// Anything else is `Other`; callers keep the source text verbatim.
    pub fn parse(raw: &str) -> Status {
        let s = raw.trim().to_lowercase().replace(' ', "");
        if s.contains("wait") {
            Status::Waitlisted
        } else if s.starts_with("accept") {
            Status::Accepted
        } else if s.starts_with("reject") {
            Status::Rejected
        } else if s.starts_with("interview") {
            Status::Interview
        } else {
            Status::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Accepted => "Accepted",
            Status::Rejected => "Rejected",
            Status::Waitlisted => "Waitlisted",
            Status::Interview => "Interview",
            Status::Other => "Other",
        }
    }
}

/// A parsed-but-not-yet-stored admissions result.
///
/// `url` is the natural dedup key; a candidate without one never reaches the
/// loader. `canonical_*` are set only by the standardizer and, when present,
/// have already been adopted into `program`/`university`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub program: String,
    pub university: String,
    /// Source text of the listing date; kept even when unparsable.
    pub date_added_raw: String,
    #[serde(default)]
    pub date_added: Option<NaiveDate>,
    pub url: String,
    pub status: Status,
    /// Verbatim source text when the status missed the closed set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_raw: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub citizenship: Option<String>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub gre_total: Option<f64>,
    #[serde(default)]
    pub gre_verbal: Option<f64>,
    #[serde(default)]
    pub gre_aw: Option<f64>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub accept_date: Option<NaiveDate>,
    #[serde(default)]
    pub reject_date: Option<NaiveDate>,
    #[serde(default)]
    pub canonical_program: Option<String>,
    #[serde(default)]
    pub canonical_university: Option<String>,
}

impl Candidate {
    /// Minimal record with only required fields set; used by tests and seeds.
    pub fn bare(program: &str, university: &str, date_added_raw: &str, url: &str, status: Status) -> Self {
        Candidate {
            program: program.to_string(),
            university: university.to_string(),
            date_added_raw: date_added_raw.to_string(),
            date_added: None,
            url: url.to_string(),
            status,
            status_raw: None,
            term: None,
            citizenship: None,
            gpa: None,
            gre_total: None,
            gre_verbal: None,
            gre_aw: None,
            degree: None,
            comments: None,
            accept_date: None,
            reject_date: None,
            canonical_program: None,
            canonical_university: None,
        }
    }
}

/// Why the normalizer refused a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    MissingUrl,
    MissingProgram,
    MissingUniversity,
    MissingDateAdded,
    MissingStatus,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingUrl => "missing url",
            DropReason::MissingProgram => "missing program",
            DropReason::MissingUniversity => "missing university",
            DropReason::MissingDateAdded => "missing date_added",
            DropReason::MissingStatus => "missing status",
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefix_and_substring() {
        assert_eq!(Status::parse("Accepted"), Status::Accepted);
        assert_eq!(Status::parse("accepted on 15 Mar"), Status::Accepted);
        assert_eq!(Status::parse("REJECTED"), Status::Rejected);
        assert_eq!(Status::parse("Wait listed"), Status::Waitlisted);
        assert_eq!(Status::parse("waitlisted"), Status::Waitlisted);
        assert_eq!(Status::parse("Interview"), Status::Interview);
    }

    #[test]
    fn status_unmatched_is_other() {
        assert_eq!(Status::parse("Pending"), Status::Other);
        assert_eq!(Status::parse("Withdrawn"), Status::Other);
        assert_eq!(Status::parse(""), Status::Other);
    }

    #[test]
    fn candidate_roundtrips_through_json() {
        let mut c = Candidate::bare(
            "Computer Science",
            "Johns Hopkins University",
            "September 01, 2025",
            "https://example.com/result/1",
            Status::Accepted,
        );
        c.gpa = Some(3.8);
        c.term = Some("Fall 2025".to_string());

        let json = serde_json::to_string(&c).unwrap();
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, c.url);
        assert_eq!(back.status, Status::Accepted);
        assert_eq!(back.gpa, Some(3.8));
    }
}

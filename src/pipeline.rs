use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cards;
use crate::db::{self, LoadStats};
use crate::fetch;
use crate::guard::RunGuard;
use crate::parser;
use crate::queries::{self, QueryStatus};
use crate::record::Candidate;
use crate::standardize::{self, HttpStandardizer, NopStandardizer, StandardizeStats};

/// Outcome of a triggered action: the run completed with a report, or the
/// guard was busy and nothing was done. Store and configuration failures
/// surface as `Err`; the guard still releases on that path.
pub enum RunOutcome<T> {
    Done(T),
    Busy,
}

pub struct IngestOptions {
    pub base_url: String,
    pub pages: u32,
    pub delay: f64,
    pub standardize: bool,
    pub standardizer_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub rows_attempted: usize,
    pub rows_accepted: usize,
    pub drop_reasons: BTreeMap<&'static str, usize>,
    pub standardized: usize,
    pub standardize_failed: usize,
    pub load: LoadStats,
}

/// Fetch → normalize → standardize → load, gated by the run guard.
/// Page fetch errors and per-row drops are absorbed into the report;
/// only store-level failures abort the run.
pub async fn run_ingestion(
    guard: &RunGuard,
    conn: &Connection,
    opts: &IngestOptions,
) -> Result<RunOutcome<IngestReport>> {
    let Some(_permit) = guard.try_start() else {
        return Ok(RunOutcome::Busy);
    };

    let client = fetch::build_client()?;
    let pages = fetch::fetch_pages(&client, &opts.base_url, opts.pages, opts.delay).await?;

    let mut report = IngestReport::default();
    let mut records: Vec<Candidate> = Vec::new();

    for page in &pages {
        let Some(html) = &page.html else {
            report.pages_failed += 1;
            continue;
        };
        report.pages_fetched += 1;

        let parsed = parser::process_page(html, &page.url);
        report.rows_attempted += parsed.attempted;
        report.rows_accepted += parsed.records.len();
        for reason in &parsed.dropped {
            *report.drop_reasons.entry(reason.as_str()).or_insert(0) += 1;
        }
        records.extend(parsed.records);
    }

    let stats = standardize_records(&mut records, opts).await;
    report.standardized = stats.applied;
    report.standardize_failed = stats.failed;

    report.load = db::insert_applicants(conn, &records)?;
    info!(
        "Ingestion done: {} attempted, {} inserted, {} skipped, {} rejected",
        report.load.attempted, report.load.inserted, report.load.skipped, report.load.rejected
    );

    Ok(RunOutcome::Done(report))
}

async fn standardize_records(
    records: &mut [Candidate],
    opts: &IngestOptions,
) -> StandardizeStats {
    if !opts.standardize {
        return standardize::standardize_batch(records, &NopStandardizer).await;
    }
    match &opts.standardizer_url {
        Some(url) => match HttpStandardizer::new(url) {
            Ok(standardizer) => standardize::standardize_batch(records, &standardizer).await,
            Err(e) => {
                warn!("standardizer unavailable, passing records through: {e:#}");
                standardize::standardize_batch(records, &NopStandardizer).await
            }
        },
        None => {
            warn!("standardization requested but STANDARDIZER_URL is unset; skipping");
            standardize::standardize_batch(records, &NopStandardizer).await
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub written: usize,
    pub failed: Vec<(String, String)>,
}

/// Execute the saved query battery and rewrite every card, gated by the
/// same guard as ingestion. A failing query loses only its own card.
pub fn run_analysis(
    guard: &RunGuard,
    conn: &Connection,
    queries_dir: &Path,
    cards_dir: &Path,
) -> Result<RunOutcome<AnalysisReport>> {
    let Some(_permit) = guard.try_start() else {
        return Ok(RunOutcome::Busy);
    };

    let defs = queries::load_dir(queries_dir)?;
    let runs = queries::run_all(conn, &defs);

    let mut report = AnalysisReport::default();
    for run in runs {
        match (run.status, run.value) {
            (QueryStatus::Succeeded, Some(value)) => {
                cards::write_card(cards_dir, &run.id, &run.label, &value)?;
                report.written += 1;
            }
            (QueryStatus::Failed(reason), _) => {
                report.failed.push((run.id, reason));
            }
            _ => {}
        }
    }

    info!(
        "Analysis done: {} cards written, {} queries failed",
        report.written,
        report.failed.len()
    );
    Ok(RunOutcome::Done(report))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let mut records = Vec::new();
        for (i, citizenship) in [("1", "International"), ("2", "American"), ("3", "American")] {
            let mut r = Candidate::bare(
                "Computer Science",
                "Test University",
                "2025-09-01",
                &format!("https://example.com/result/{i}"),
                Status::Accepted,
            );
            r.citizenship = Some(citizenship.to_string());
            r.term = Some("Fall 2025".to_string());
            records.push(r);
        }
        db::insert_applicants(&conn, &records).unwrap();
        conn
    }

    fn write_query(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn analysis_writes_cards_and_reports_failures() {
        let guard = RunGuard::new();
        let conn = seeded_conn();
        let queries_dir = tempfile::tempdir().unwrap();
        let cards_dir = tempfile::tempdir().unwrap();

        write_query(
            queries_dir.path(),
            "q01.sql",
            "-- label: Percent international\n-- shape: scalar\n\
             SELECT ROUND(100.0 * SUM(CASE WHEN us_or_international = 'International'\n\
             THEN 1 ELSE 0 END) / NULLIF(COUNT(*), 0), 2) FROM applicants;\n",
        );
        write_query(
            queries_dir.path(),
            "q02.sql",
            "-- label: Broken\nSELECT nope FROM missing_table;\n",
        );

        let outcome =
            run_analysis(&guard, &conn, queries_dir.path(), cards_dir.path()).unwrap();
        let report = match outcome {
            RunOutcome::Done(report) => report,
            RunOutcome::Busy => panic!("guard should have been idle"),
        };

        assert_eq!(report.written, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "q02");

        let card: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(cards_dir.path().join("q01.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(card["shape"], "scalar");
        assert_eq!(card["value"], serde_json::json!(33.33));
        assert!(!cards_dir.path().join("q02.json").exists());

        // Guard released for the next trigger.
        assert!(!guard.is_busy());
    }

    #[test]
    fn analysis_conflicts_while_a_run_is_in_flight() {
        let guard = RunGuard::new();
        let conn = seeded_conn();
        let queries_dir = tempfile::tempdir().unwrap();
        let cards_dir = tempfile::tempdir().unwrap();

        let _permit = guard.try_start().unwrap();
        let outcome =
            run_analysis(&guard, &conn, queries_dir.path(), cards_dir.path()).unwrap();
        assert!(matches!(outcome, RunOutcome::Busy));
    }

    #[tokio::test]
    async fn ingestion_conflicts_while_a_run_is_in_flight() {
        let guard = RunGuard::new();
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();

        let opts = IngestOptions {
            base_url: "https://example.invalid/survey/".to_string(),
            pages: 1,
            delay: 0.0,
            standardize: false,
            standardizer_url: None,
        };

        let _permit = guard.try_start().unwrap();
        let outcome = run_ingestion(&guard, &conn, &opts).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Busy));
    }

    #[test]
    fn fixture_page_loads_idempotently_without_standardization() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();

        // One of the fixture urls is already stored.
        let existing = Candidate::bare(
            "Computer Science",
            "Johns Hopkins University",
            "September 01, 2025",
            "https://www.thegradcafe.com/result/901234",
            Status::Accepted,
        );
        db::insert_applicants(&conn, &[existing]).unwrap();

        let html = std::fs::read_to_string("tests/fixtures/survey_page.html").unwrap();
        let parsed = parser::process_page(&html, "https://www.thegradcafe.com/survey/?page=1");
        assert_eq!(parsed.records.len(), 3);

        let stats = db::insert_applicants(&conn, &parsed.records).unwrap();
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn guard_released_after_store_failure() {
        let guard = RunGuard::new();
        let conn = Connection::open_in_memory().unwrap();
        // A missing queries dir aborts the run before any query executes.
        let cards_dir = tempfile::tempdir().unwrap();
        let missing = cards_dir.path().join("no-such-dir");

        let result = run_analysis(&guard, &conn, &missing, cards_dir.path());
        assert!(result.is_err());
        assert!(!guard.is_busy());
        assert!(guard.try_start().is_some());
    }
}

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::record::Candidate;

pub const DEFAULT_DB_PATH: &str = "data/admissions.sqlite";

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path).with_context(|| format!("failed to open {path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS applicants (
            p_id        INTEGER PRIMARY KEY,
            program     TEXT NOT NULL,
            university  TEXT NOT NULL,
            date_added  TEXT,
            url         TEXT UNIQUE NOT NULL,
            status      TEXT NOT NULL,
            status_raw  TEXT,
            term        TEXT,
            us_or_international TEXT,
            gpa         REAL,
            gre         REAL,
            gre_v       REAL,
            gre_aw      REAL,
            degree      TEXT,
            comments    TEXT,
            accept_date TEXT,
            reject_date TEXT,
            llm_generated_program    TEXT,
            llm_generated_university TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_applicants_term ON applicants(term);
        CREATE INDEX IF NOT EXISTS idx_applicants_status ON applicants(status);
        CREATE INDEX IF NOT EXISTS idx_applicants_university ON applicants(university);
        ",
    )?;
    Ok(())
}

/// Stable 64-bit FNV-1a of the entry url, masked non-negative for the
/// INTEGER surrogate key. Collisions between distinct urls are treated as
/// negligible; the url UNIQUE constraint is the authoritative dedup.
pub fn applicant_id(url: &str) -> i64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in url.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    (hash & 0x7fff_ffff_ffff_ffff) as i64
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub attempted: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
}

/// Idempotent batch load: one transaction, INSERT OR IGNORE per row, so a
/// previously seen url is a normal skip rather than an error or an update.
/// Replaying any batch never changes row count beyond the net-new urls.
pub fn insert_applicants(conn: &Connection, records: &[Candidate]) -> Result<LoadStats> {
    let tx = conn.unchecked_transaction()?;
    let mut stats = LoadStats::default();
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO applicants
             (p_id, program, university, date_added, url, status, status_raw, term,
              us_or_international, gpa, gre, gre_v, gre_aw, degree, comments,
              accept_date, reject_date, llm_generated_program, llm_generated_university)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        )?;
        for r in records {
            stats.attempted += 1;
            let url = r.url.trim();
            if url.is_empty() {
                stats.rejected += 1;
                continue;
            }
            let changed = stmt.execute(rusqlite::params![
                applicant_id(url),
                r.program,
                r.university,
                r.date_added.map(|d| d.to_string()),
                url,
                r.status.as_str(),
                r.status_raw,
                r.term,
                r.citizenship,
                r.gpa,
                r.gre_total,
                r.gre_verbal,
                r.gre_aw,
                r.degree,
                r.comments,
                r.accept_date.map(|d| d.to_string()),
                r.reject_date.map(|d| d.to_string()),
                r.canonical_program,
                r.canonical_university,
            ])?;
            if changed == 1 {
                stats.inserted += 1;
            } else {
                stats.skipped += 1;
            }
        }
    }
    tx.commit()?;
    Ok(stats)
}

// ── Stats ──

pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

pub struct DbStats {
    pub total: i64,
    pub universities: i64,
    pub latest_added: Option<String>,
    pub by_status: Vec<StatusCount>,
}

pub fn get_stats(conn: &Connection) -> Result<DbStats> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM applicants", [], |r| r.get(0))?;
    let universities: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT university) FROM applicants",
        [],
        |r| r.get(0),
    )?;
    let latest_added: Option<String> =
        conn.query_row("SELECT MAX(date_added) FROM applicants", [], |r| r.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) AS n FROM applicants GROUP BY status ORDER BY n DESC, status",
    )?;
    let by_status = stmt
        .query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DbStats {
        total,
        universities,
        latest_added,
        by_status,
    })
}

// ── Recent entries ──

pub struct RecentRow {
    pub university: String,
    pub program: String,
    pub degree: Option<String>,
    pub status: String,
    pub term: Option<String>,
    pub date_added: Option<String>,
    pub gpa: Option<f64>,
}

pub fn fetch_recent(
    conn: &Connection,
    status: Option<&str>,
    term: Option<&str>,
    limit: usize,
) -> Result<Vec<RecentRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(s) = status {
        conditions.push(format!("status = ?{}", params.len() + 1));
        params.push(Box::new(s.to_string()));
    }
    if let Some(t) = term {
        conditions.push(format!("term = ?{}", params.len() + 1));
        params.push(Box::new(t.to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT university, program, degree, status, term, date_added, gpa
         FROM applicants{}
         ORDER BY date_added DESC, p_id
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(RecentRow {
                university: row.get(0)?,
                program: row.get(1)?,
                degree: row.get(2)?,
                status: row.get(3)?,
                term: row.get(4)?,
                date_added: row.get(5)?,
                gpa: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──

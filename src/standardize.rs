use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::Candidate;

const CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Canonical labels returned by the classification host. Empty or absent
/// fields leave the record untouched.
#[derive(Debug, Default, Deserialize)]
pub struct Canonical {
    pub program: Option<String>,
    pub university: Option<String>,
}

/// One bounded classification call per record. Implementations must not
/// retry internally; a failed call is recorded by the caller and the record
/// passes through with its raw fields.
pub trait Standardizer {
    async fn canonicalize(&self, program: &str, university: &str) -> Result<Canonical>;
}

/// Pass-through used when standardization is switched off.
pub struct NopStandardizer;

impl Standardizer for NopStandardizer {
    async fn canonicalize(&self, _program: &str, _university: &str) -> Result<Canonical> {
        Ok(Canonical::default())
    }
}

/// Talks to the local text-classification host.
pub struct HttpStandardizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStandardizer {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .context("failed to build standardizer client")?;
        Ok(HttpStandardizer {
            client,
            endpoint: format!("{}/standardize", base_url.trim_end_matches('/')),
        })
    }
}

impl Standardizer for HttpStandardizer {
    async fn canonicalize(&self, program: &str, university: &str) -> Result<Canonical> {
        #[derive(Serialize)]
        struct Request<'a> {
            program: &'a str,
            university: &'a str,
        }

        let canonical = self
            .client
            .post(&self.endpoint)
            .json(&Request { program, university })
            .send()
            .await
            .context("standardizer unreachable")?
            .error_for_status()
            .context("standardizer returned an error status")?
            .json::<Canonical>()
            .await
            .context("standardizer response was not valid JSON")?;
        Ok(canonical)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StandardizeStats {
    pub applied: usize,
    pub failed: usize,
}

/// Run every record through the standardizer. Non-empty canonical values
/// overwrite the display fields and are retained on the record for the
/// audit columns; failures are counted, never fatal.
pub async fn standardize_batch<S: Standardizer>(
    records: &mut [Candidate],
    standardizer: &S,
) -> StandardizeStats {
    let mut stats = StandardizeStats::default();

    for record in records.iter_mut() {
        match standardizer.canonicalize(&record.program, &record.university).await {
            Ok(canonical) => {
                if apply(record, canonical) {
                    stats.applied += 1;
                }
            }
            Err(e) => {
                warn!("standardization failed for {}: {e:#}", record.url);
                stats.failed += 1;
            }
        }
    }

    stats
}

fn apply(record: &mut Candidate, canonical: Canonical) -> bool {
    let mut touched = false;

    if let Some(program) = nonempty(canonical.program) {
        record.canonical_program = Some(program.clone());
        record.program = program;
        touched = true;
    }
    if let Some(university) = nonempty(canonical.university) {
        record.canonical_university = Some(university.clone());
        record.university = university;
        touched = true;
    }

    touched
}

fn nonempty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ── Tests ──

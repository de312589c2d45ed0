mod cards;
mod db;
mod fetch;
mod guard;
mod parser;
mod pipeline;
mod queries;
mod record;
mod standardize;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use guard::GUARD;
use pipeline::{IngestOptions, IngestReport, RunOutcome};

#[derive(Parser)]
#[command(
    name = "admit_scraper",
    about = "Grad admissions results scraper + analysis cards"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Scrape listing pages, normalize, standardize, and load new rows
    Ingest {
        /// Number of listing pages to fetch
        #[arg(short = 'n', long, default_value_t = 5)]
        pages: u32,
        /// Seconds to wait between page requests
        #[arg(long, default_value_t = 0.8)]
        delay: f64,
        /// Skip the program/university standardization step
        #[arg(long)]
        no_standardize: bool,
        /// Listing base URL
        #[arg(long, default_value = fetch::DEFAULT_BASE_URL)]
        base_url: String,
    },
    /// Re-run the saved query battery and rewrite the analysis cards
    Analyze {
        #[arg(long, default_value = "queries")]
        queries_dir: PathBuf,
        #[arg(long, default_value = "data/analysis")]
        cards_dir: PathBuf,
    },
    /// Load candidate records from a JSON file (same duplicate policy as ingest)
    Seed {
        file: PathBuf,
    },
    /// Show table statistics
    Stats,
    /// Recent entries table
    Recent {
        /// Filter by status (Accepted, Rejected, Waitlisted, Interview, Other)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by term (e.g. "Fall 2025")
        #[arg(short, long)]
        term: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let db_path = std::env::var("ADMIT_DB").unwrap_or_else(|_| db::DEFAULT_DB_PATH.to_string());

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {db_path}.");
            Ok(())
        }
        Commands::Ingest {
            pages,
            delay,
            no_standardize,
            base_url,
        } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let opts = IngestOptions {
                base_url,
                pages,
                delay,
                standardize: !no_standardize,
                standardizer_url: std::env::var("STANDARDIZER_URL").ok(),
            };
            match pipeline::run_ingestion(&GUARD, &conn, &opts).await? {
                RunOutcome::Done(report) => {
                    print_ingest(&report);
                    Ok(())
                }
                RunOutcome::Busy => busy_exit(),
            }
        }
        Commands::Analyze {
            queries_dir,
            cards_dir,
        } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            match pipeline::run_analysis(&GUARD, &conn, &queries_dir, &cards_dir)? {
                RunOutcome::Done(report) => {
                    println!("Wrote {} cards to {}", report.written, cards_dir.display());
                    for (id, reason) in &report.failed {
                        println!("  {id} failed: {reason}");
                    }
                    Ok(())
                }
                RunOutcome::Busy => busy_exit(),
            }
        }
        Commands::Seed { file } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records: Vec<record::Candidate> = serde_json::from_str(&text)
                .context("seed file is not a JSON array of candidate records")?;
            let stats = db::insert_applicants(&conn, &records)?;
            println!(
                "Seeded from {}: {} attempted, {} inserted, {} skipped, {} rejected",
                file.display(),
                stats.attempted,
                stats.inserted,
                stats.skipped,
                stats.rejected
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Applicants:   {}", s.total);
            println!("Universities: {}", s.universities);
            println!(
                "Latest added: {}",
                s.latest_added.as_deref().unwrap_or("-")
            );
            for sc in &s.by_status {
                println!("  {:<12} {}", sc.status, sc.count);
            }
            Ok(())
        }
        Commands::Recent {
            status,
            term,
            limit,
        } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_recent(&conn, status.as_deref(), term.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No entries found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<28} | {:<28} | {:<8} | {:<10} | {:<10} | {:>4}",
                "#", "University", "Program", "Degree", "Status", "Added", "GPA"
            );
            println!("{}", "-".repeat(108));
            for (i, r) in rows.iter().enumerate() {
                let gpa = r.gpa.map(|g| format!("{g:.2}")).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<28} | {:<28} | {:<8} | {:<10} | {:<10} | {:>4}",
                    i + 1,
                    truncate(&r.university, 28),
                    truncate(&r.program, 28),
                    r.degree.as_deref().unwrap_or("-"),
                    r.status,
                    r.date_added.as_deref().unwrap_or("-"),
                    gpa
                );
            }
            println!("\n{} entries", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_ingest(report: &IngestReport) {
    println!(
        "Pages: {} fetched, {} failed",
        report.pages_fetched, report.pages_failed
    );
    println!(
        "Rows: {} attempted, {} accepted",
        report.rows_attempted, report.rows_accepted
    );
    for (reason, count) in &report.drop_reasons {
        println!("  dropped ({reason}): {count}");
    }
    if report.standardized > 0 || report.standardize_failed > 0 {
        println!(
            "Standardized: {} applied, {} failed",
            report.standardized, report.standardize_failed
        );
    }
    println!(
        "Load: {} attempted, {} inserted, {} skipped, {} rejected",
        report.load.attempted, report.load.inserted, report.load.skipped, report.load.rejected
    );
}

fn busy_exit() -> ! {
    eprintln!("Another run is in flight; try again shortly.");
    std::process::exit(2);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

mod dashboard;
mod launcher;

use dashboard::{render_trends, AnomalyReport, Dashboard, ExportOutcome};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall QR attendance dashboard")]
struct Cli {
    /// Attendance database (defaults to ROLLCALL_DB_PATH or the XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every logged scan, newest first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete every logged scan
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Write all scans to a JSON report sorted by roll number
    Export {
        #[arg(short, long, default_value = "attendance_report.json")]
        output: PathBuf,
    },
    /// Present scans per day
    Trends,
    /// Fit the anomaly model and list unusual scans
    Train,
    /// Enroll a student
    Enroll {
        /// Name exactly as it appears in the badge payload
        name: String,
        roll_no: String,
    },
    /// List enrolled students
    Enrollments,
    /// Start the scanner on this database
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(rollcall_store::default_db_path);
    let dashboard = Dashboard::open(&db_path)?;

    match cli.command {
        Commands::List { json } => {
            let rows = dashboard.rows()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No attendance records.");
            } else {
                println!("{:<24} {:<10} {:<20} Status", "Name", "Roll No", "Scan Time");
                for row in &rows {
                    println!(
                        "{:<24} {:<10} {:<20} {}",
                        row.name,
                        row.roll_no.as_deref().unwrap_or("-"),
                        row.scan_time,
                        row.status
                    );
                }
                println!("{} record(s)", rows.len());
            }
        }
        Commands::Clear { yes } => {
            if !yes && !confirm("Delete all attendance records?")? {
                println!("Aborted.");
                return Ok(());
            }
            let removed = dashboard.clear()?;
            println!("Cleared {removed} record(s).");
        }
        Commands::Export { output } => match dashboard.export(&output)? {
            ExportOutcome::Empty => println!("No attendance records found to export."),
            ExportOutcome::Written { path, records } => {
                println!("Exported {records} record(s) to {}", path.display());
            }
        },
        Commands::Trends => {
            let days = dashboard.trends()?;
            if days.is_empty() {
                println!("No present scans yet.");
            } else {
                print!("{}", render_trends(&days));
            }
        }
        Commands::Train => match dashboard.anomalies()? {
            AnomalyReport::InsufficientData { present } => {
                println!(
                    "Not enough history to train: {present} present scan(s), need {}.",
                    rollcall_core::anomaly::MIN_TRAINING_EVENTS
                );
            }
            AnomalyReport::Trained {
                events,
                threshold,
                flagged,
            } => {
                println!("Trained on {events} present scan(s); threshold {threshold:.4}.");
                if flagged.is_empty() {
                    println!("No unusual scans.");
                }
                for (event, score) in &flagged {
                    println!(
                        "  unusual: {} at {} (score {score:.4})",
                        event.payload,
                        event.timestamp.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        },
        Commands::Enroll { name, roll_no } => {
            let record = dashboard.enroll(&name, &roll_no)?;
            println!("Enrolled {} ({})", record.display_name(), record.roll_no);
        }
        Commands::Enrollments => {
            let records = dashboard.enrollments()?;
            if records.is_empty() {
                println!("No students enrolled.");
            }
            for record in &records {
                println!(
                    "{:<24} {:<10} {}",
                    record.display_name(),
                    record.roll_no,
                    record.created_at
                );
            }
        }
        Commands::Scan => {
            let scanner = launcher::scanner_path();
            launcher::run_scanner(&scanner, dashboard.db_path()).await?;
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

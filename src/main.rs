mod models;
mod settings;
mod sheet;
mod text;
mod tracker;
mod tui;
mod view;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use models::{EmploymentType, Job, JobDraft};
use settings::{Config, Preferences};
use sheet::{JobStore, SheetClient};
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracker::{NoticeLevel, PollOutcome, Tracker};
use view::{filter_and_sort, StatusCounts, StatusFilter};

#[derive(Parser)]
#[command(name = "jobsheet")]
#[command(about = "Track job postings and applications in a shared spreadsheet")]
struct Cli {
    /// Sheet script endpoint URL
    #[arg(long, global = true, env = "JOBSHEET_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs
    List {
        /// Only jobs whose company or position contains this text
        #[arg(short, long, default_value = "")]
        search: String,

        /// Filter by status (all, applied, not-applied)
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },

    /// Show job details
    Show {
        /// Job ID (e.g. acme-tester)
        id: String,
    },

    /// Post a new job
    Post {
        #[arg(long)]
        company: String,

        #[arg(long)]
        position: String,

        /// Link to the posting
        #[arg(long, default_value = "")]
        link: String,

        /// Predicted pay, free text
        #[arg(long, default_value = "")]
        pay: String,

        /// Salary and benefits, free text
        #[arg(long, default_value = "")]
        benefits: String,

        #[arg(long, default_value = "")]
        notes: String,

        /// Employment type (full-time, part-time, contract)
        #[arg(long = "type", default_value = "full-time")]
        employment_type: EmploymentType,
    },

    /// Edit a job's details (status is kept)
    Edit {
        /// Job ID
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        position: Option<String>,

        #[arg(long)]
        link: Option<String>,

        #[arg(long)]
        pay: Option<String>,

        #[arg(long)]
        benefits: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long = "type")]
        employment_type: Option<EmploymentType>,
    },

    /// Mark a job as applied (today)
    Apply {
        /// Job ID
        id: String,
    },

    /// Record the response you got for a job
    Respond {
        /// Job ID
        id: String,

        /// Response text (e.g. "interview friday", "rejection")
        response: String,
    },

    /// Replace a job's notes
    Notes {
        /// Job ID
        id: String,

        notes: String,
    },

    /// Delete a job
    Delete {
        /// Job ID
        id: String,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Browse jobs interactively
    Browse {
        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },

    /// Show or change the color theme
    Theme {
        mode: Option<ThemeMode>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeMode {
    Dark,
    Light,
    Toggle,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", env!("CARGO_PKG_NAME"))));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // .env is optional

    let cli = Cli::parse();

    let log_file = match cli.command {
        Commands::Browse { .. } => Some(settings::log_path()?),
        _ => None,
    };
    init_logging(log_file.as_deref())?;

    let mut prefs = Preferences::load(&Preferences::default_path())?;

    if let Commands::Theme { mode } = cli.command {
        match mode {
            Some(ThemeMode::Dark) => prefs.set_dark_mode(true)?,
            Some(ThemeMode::Light) => prefs.set_dark_mode(false)?,
            Some(ThemeMode::Toggle) => {
                prefs.toggle_dark_mode()?;
            }
            None => {}
        }
        println!("Theme: {}", if prefs.dark_mode { "dark" } else { "light" });
        return Ok(());
    }

    let config = Config::resolve(cli.endpoint, &prefs)?;
    let store = SheetClient::new(config.endpoint.clone(), config.timeout)
        .context("Failed to set up HTTP client")?;
    debug!("Using sheet endpoint {}", store.endpoint());
    let mut tracker = Tracker::new(store)
        .with_poll(config.poll)
        .with_notice_ttl(config.notice_ttl);

    // First Ctrl-C stops a running confirmation, a second one exits
    let canceller = tracker.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
            eprintln!("\nCancelling... press Ctrl-C again to quit");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    match cli.command {
        Commands::List { search, status } => {
            load(&mut tracker).await?;
            let jobs = filter_and_sort(tracker.jobs(), &search, status);
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<32} {:<8} {:<28} {:<20} {:<11} {:<16}",
                    "ID", "APPLIED", "POSITION", "COMPANY", "POSTED", "RESPONSE"
                );
                println!("{}", "-".repeat(120));
                for job in &jobs {
                    let response = if job.is_applied() { job.response_label() } else { "-" };
                    println!(
                        "{:<32} {:<8} {:<28} {:<20} {:<11} {:<16}",
                        truncate(&job.id, 30),
                        job.applied.as_str(),
                        truncate(&job.position, 26),
                        truncate(&job.company, 18),
                        job.date_posted,
                        truncate(response, 16)
                    );
                }
                let counts = StatusCounts::of(tracker.jobs());
                println!(
                    "\n{} shown | {} total, {} applied, {} not applied",
                    jobs.len(),
                    counts.all,
                    counts.applied,
                    counts.not_applied
                );
            }
        }

        Commands::Show { id } => {
            load(&mut tracker).await?;
            match tracker.get(&id) {
                Some(job) => print_job(job),
                None => println!("Job '{}' not found.", id),
            }
        }

        Commands::Post {
            company,
            position,
            link,
            pay,
            benefits,
            notes,
            employment_type,
        } => {
            // Only used to notice a duplicate id; the post goes ahead regardless
            let known = tracker.load_quietly().await;
            debug!("{} jobs known before posting", known);
            let draft = JobDraft {
                company,
                position,
                posting_link: link,
                predicted_pay: pay,
                salary_benefits: benefits,
                notes,
                employment_type,
            };
            let result = tracker.create(draft).await;
            report(&tracker);
            if let PollOutcome::Unconfirmed | PollOutcome::Cancelled = result? {
                println!("Run 'jobsheet list' in a moment to check again.");
            }
        }

        Commands::Edit {
            id,
            company,
            position,
            link,
            pay,
            benefits,
            notes,
            employment_type,
        } => {
            load(&mut tracker).await?;
            let Some(current) = tracker.get(&id) else {
                println!("Job '{}' not found.", id);
                return Ok(());
            };
            let base = JobDraft::from(current);
            let draft = JobDraft {
                company: company.unwrap_or(base.company),
                position: position.unwrap_or(base.position),
                posting_link: link.unwrap_or(base.posting_link),
                predicted_pay: pay.unwrap_or(base.predicted_pay),
                salary_benefits: benefits.unwrap_or(base.salary_benefits),
                notes: notes.unwrap_or(base.notes),
                employment_type: employment_type.unwrap_or(base.employment_type),
            };
            let result = tracker.edit(&id, draft).await;
            report(&tracker);
            let updated = result?;
            if updated.id != id {
                println!("New id: {}", updated.id);
            }
        }

        Commands::Apply { id } => {
            load(&mut tracker).await?;
            let result = tracker.mark_applied(&id).await;
            report(&tracker);
            if !result? {
                println!("Already applied.");
            }
        }

        Commands::Respond { id, response } => {
            load(&mut tracker).await?;
            let result = tracker.record_response(&id, &response).await;
            report(&tracker);
            result?;
        }

        Commands::Notes { id, notes } => {
            load(&mut tracker).await?;
            let result = tracker.update_notes(&id, &notes).await;
            report(&tracker);
            result?;
        }

        Commands::Delete { id, yes } => {
            load(&mut tracker).await?;
            let result = tracker.delete(&id, |job| yes || confirm_delete(job)).await;
            report(&tracker);
            if !result? {
                println!("Kept.");
            }
        }

        Commands::Browse { search, status } => {
            // A failed load shows up as a notice inside the view
            let _ = tracker.load().await;
            tui::run_browse(&mut tracker, &mut prefs, search, status).await?;
        }

        Commands::Theme { .. } => unreachable!("handled above"),
    }

    Ok(())
}

async fn load<S: JobStore>(tracker: &mut Tracker<S>) -> Result<usize> {
    tracker
        .load()
        .await
        .context("Failed to load jobs from the sheet")
}

/// Prints the tracker's current notice, if any.
fn report<S: JobStore>(tracker: &Tracker<S>) {
    let Some(notice) = tracker.notice() else { return };
    match notice.level {
        NoticeLevel::Success => println!("{}", notice.message),
        NoticeLevel::Info => println!("Note: {}", notice.message),
        NoticeLevel::Error => eprintln!("Error: {}", notice.message),
    }
}

fn confirm_delete(job: &Job) -> bool {
    print!(
        "Are you sure you want to delete the job at {} ({})? [y/N] ",
        job.company, job.position
    );
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_job(job: &Job) {
    println!("{} at {}", job.position, job.company);
    println!("ID: {}", job.id);
    if job.is_applied() {
        println!("Status: applied on {}", job.date_applied);
        println!("Response: {}", job.response_label());
    } else {
        println!("Status: ready to apply");
    }
    println!("Type: {}", job.employment_type);
    println!("Posted: {}", job.date_posted);
    if !job.predicted_pay.is_empty() {
        println!("Pay: {}", job.predicted_pay);
    }
    if !job.posting_link.is_empty() {
        println!("Link: {}", job.posting_link);
    }
    if !job.salary_benefits.is_empty() {
        println!("\n--- Salary & Benefits ---\n{}", job.salary_benefits);
    }
    if !job.notes.is_empty() {
        println!("\n--- Notes ---\n{}", job.notes);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

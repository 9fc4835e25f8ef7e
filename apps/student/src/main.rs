mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{FailureContext, HttpAssignmentApi, SessionEvent, StudentSession};
use shared::domain::{AssignmentId, SubmissionId, SubmissionRecord};
use storage::Storage;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, prepare_database_url};

#[derive(Parser, Debug)]
#[command(name = "student", about = "Submit assignments and check on their feedback")]
struct Cli {
    /// Path to a TOML settings file (default: ./student.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the name submissions are made under.
    Name {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// Show the current name.
    Whoami,
    /// List the available assignments.
    Assignments,
    /// Submit work for an assignment.
    Submit {
        assignment_id: String,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List local submissions, newest first.
    Submissions,
    /// Ask the server for the latest status of a submission.
    Refresh {
        #[arg(required_unless_present = "pending")]
        submission_id: Option<String>,
        /// Refresh every submission that has not been evaluated yet.
        #[arg(long, conflicts_with = "submission_id")]
        pending: bool,
    },
}

impl Command {
    /// Failures this command already surfaces through its own result.
    fn reported_failures(&self) -> &'static [FailureContext] {
        match self {
            Command::Name { .. } => &[FailureContext::Identity],
            Command::Assignments => &[FailureContext::LoadAssignments],
            Command::Submit { .. } => &[FailureContext::LoadAssignments, FailureContext::Submit],
            Command::Refresh { .. } => &[FailureContext::Refresh],
            Command::Whoami | Command::Submissions => &[],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?
        .with_overrides(cli.server_url, cli.database_url);

    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await?;
    let api = HttpAssignmentApi::new(&settings.server_url, settings.request_timeout())?;
    info!(server_url = %settings.server_url, %database_url, "student: session opening");

    let session = StudentSession::open(Arc::new(api), Arc::new(storage)).await?;
    let mut events = session.subscribe_events();

    let reported = cli.command.reported_failures();
    let result = run(cli.command, &session).await;
    for event in drain_notices(&mut events, reported) {
        match event {
            SessionEvent::Error { .. } => eprintln!("{event}"),
            _ => println!("{event}"),
        }
    }
    result
}

async fn run(command: Command, session: &StudentSession) -> Result<()> {
    match command {
        Command::Name { name } => {
            let identity = session.enter_identity(&name.join(" ")).await?;
            println!("Submitting as {identity}.");
        }
        Command::Whoami => match session.identity().await {
            Some(identity) => println!("{identity}"),
            None => println!("No name set yet. Run `student name <NAME>` first."),
        },
        Command::Assignments => {
            let assignments = session.list_assignments().await?;
            if assignments.is_empty() {
                println!("No assignments available.");
            }
            for assignment in assignments {
                println!(
                    "{}  {}  (posted {})",
                    assignment.assignment_id,
                    assignment.title,
                    assignment.created_at.format("%Y-%m-%d")
                );
                if !assignment.description.is_empty() {
                    println!("    {}", assignment.description);
                }
            }
        }
        Command::Submit {
            assignment_id,
            content,
            file,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read submission file '{}'", path.display()))?,
                (None, None) => return Err(anyhow!("either --content or --file is required")),
            };

            session.list_assignments().await?;
            let assignment_id = AssignmentId::new(assignment_id);
            let assignment = session
                .assignment(&assignment_id)
                .await
                .ok_or_else(|| anyhow!("no assignment with id '{assignment_id}'"))?;

            let record = session.submit(&assignment, &content).await?;
            print_record(&record);
        }
        Command::Submissions => {
            let records = session.submissions().await;
            if records.is_empty() {
                println!("No submissions yet.");
            }
            for record in &records {
                print_record(record);
            }
        }
        Command::Refresh {
            submission_id: Some(submission_id),
            pending: false,
        } => {
            let record = session.refresh(&SubmissionId::new(submission_id)).await?;
            print_record(&record);
        }
        Command::Refresh { .. } => {
            let results = session.refresh_pending().await;
            if results.is_empty() {
                println!("Nothing pending.");
            }
            let mut failed = 0usize;
            for (submission_id, result) in results {
                match result {
                    Ok(record) => print_record(&record),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{submission_id}: {err}");
                    }
                }
            }
            if failed > 0 {
                return Err(anyhow!("{failed} submission(s) could not be refreshed"));
            }
        }
    }
    Ok(())
}

fn print_record(record: &SubmissionRecord) {
    println!(
        "{}  {}  submitted {}  [{}]",
        record.submission_id,
        record.assignment_title,
        record.submitted_at.format("%Y-%m-%d %H:%M UTC"),
        record.status
    );
    if let Some(feedback) = &record.feedback {
        println!(
            "    score {}  plagiarism risk: {}",
            feedback.score, feedback.plagiarism_risk
        );
        println!("    {}", feedback.feedback_summary);
    }
}

/// Session notices that arrived while the command ran, minus the failures
/// the command reports itself.
fn drain_notices(
    events: &mut Receiver<SessionEvent>,
    reported: &[FailureContext],
) -> Vec<SessionEvent> {
    let mut notices = Vec::new();
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Error { context, .. }) if reported.contains(&context) => {}
            Ok(event) => notices.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "student: session notices dropped");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    notices
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

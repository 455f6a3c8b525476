//! CLI argument parsing for secwait
use clap::{Parser, Subcommand};
use sechub_testkit::{ExecutionState, PdsJobState};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "secwait",
    version,
    about = "Wait for and assert SecHub/PDS state during integration runs",
    long_about = "Polls a SecHub server (and its PDS) until a job, the event inspection trace or the auto-cleanup counters reach an expected state",
    after_help = "CONFIGURATION (environment):
  SECHUB_SERVER, SECHUB_USERID, SECHUB_APITOKEN   required
  SECHUB_PDS_SERVER                              needed by pds-job and --pds
  SECHUB_DISABLE_CERT_VALIDATION=true            accept self signed certificates
  RUST_LOG                                       overrides --debug

EXIT CODES:
  0  expected state reached
  1  expectation failed (timeout, terminal state, mismatch)
  2  configuration, input or transport problem

EXAMPLES:
  secwait job-done --project project1 --job 3a1f0c2e-5b7d-4a7e-9c1b-2d3e4f5a6b7c --fail-fast
  secwait --timeout-secs 30 pds-job --job <uuid> --state done
  secwait events-assert --expectation expected.json --write-history out --id UC_ADMIN_STARTS_JOB"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Log every poll attempt
    #[arg(long, global = true)]
    pub debug: bool,

    /// Overall wait budget in seconds (each subcommand has its own default)
    #[arg(long, global = true, value_parser = validate_positive)]
    pub timeout_secs: Option<u64>,

    /// Pause between two poll attempts in milliseconds (default 1000, 300 for
    /// the stability checks of events-start)
    #[arg(long, global = true, value_parser = validate_positive)]
    pub interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait until a job has ENDED with result OK (default timeout 5s)
    JobDone {
        /// Project id
        #[arg(short, long, value_parser = validate_project)]
        project: String,

        /// Job UUID
        #[arg(short, long)]
        job: Uuid,

        /// Stop at once when the job reports result FAILED
        #[arg(long)]
        fail_fast: bool,
    },

    /// Wait until a job is in one of the given execution states (default timeout 5s)
    JobState {
        #[arg(short, long, value_parser = validate_project)]
        project: String,

        #[arg(short, long)]
        job: Uuid,

        /// Accepted states, e.g. started, cancel-requested, ENDED
        #[arg(short, long = "state", required = true, num_args = 1.., value_parser = clap::value_parser!(ExecutionState))]
        states: Vec<ExecutionState>,
    },

    /// Wait until a PDS job reaches a state (default timeout 5s)
    PdsJob {
        #[arg(short, long)]
        job: Uuid,

        /// Wanted PDS job state, e.g. running, done, failed
        #[arg(short, long, value_parser = clap::value_parser!(PdsJobState))]
        state: PdsJobState,
    },

    /// Wait until no new events are recorded, then start the event inspection
    EventsStart,

    /// Reset the event inspection and stop recording
    EventsStop,

    /// Assert the recorded event trace against an expectation file (default timeout 3s)
    EventsAssert {
        /// JSON array of expected events
        #[arg(short, long, value_parser = validate_file)]
        expectation: PathBuf,

        /// Also write the matching history as JSON below this directory
        #[arg(long, requires = "id")]
        write_history: Option<PathBuf>,

        /// Identifier of the history file, e.g. the use case id
        #[arg(long, requires = "write_history", value_parser = validate_identifier)]
        id: Option<String>,

        /// Optional file name suffix for variants of the same use case
        #[arg(long, requires = "id", value_parser = validate_identifier)]
        variant: Option<String>,
    },

    /// Wait, then print a ready-to-paste expectation for the recorded trace
    EventsPropose {
        /// Seconds to wait before reading the trace
        #[arg(long, default_value = "3")]
        wait_secs: u64,
    },

    /// Wait until the auto-cleanup delete counters match a file (default timeout 15s)
    DeleteCounts {
        /// JSON array of {"variant", "className", "deleteCount"} entries
        #[arg(short, long, value_parser = validate_file)]
        expectation: PathBuf,

        /// Inspect the PDS instead of the SecHub server
        #[arg(long)]
        pds: bool,
    },

    /// Prove that no auto-cleanup delete happens for the whole timeout (default 15s)
    NoDeletes {
        #[arg(long)]
        pds: bool,
    },

    /// Reset the auto-cleanup delete counters
    CleanupReset {
        #[arg(long)]
        pds: bool,
    },
}

fn validate_positive(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value == 0 {
        return Err("Value must be greater than 0".to_string());
    }
    Ok(value)
}

/// Project ids are path segments on the server side.
fn validate_project(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("Project id cannot be empty".to_string());
    }
    if trimmed.contains('/') {
        return Err(format!("Project id '{}' must not contain '/'", trimmed));
    }
    Ok(trimmed.to_string())
}

/// Used as directory and file name, so only a conservative character set.
fn validate_identifier(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }
    if let Some(bad) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!(
            "Identifier '{}' contains invalid character '{}' (allowed: letters, digits, '_', '-')",
            s, bad
        ));
    }
    Ok(s.to_string())
}

fn validate_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.is_file() {
        return Err(format!("File '{}' does not exist", s));
    }
    Ok(path)
}

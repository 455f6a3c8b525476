//! Execution of the secwait subcommands.
use crate::cli::{Cli, Commands};
use crate::error::{Result, WaitError};
use sechub_testkit::{
    AutoCleanupApi, DeleteCountExpectation, EventExpectation, JobStatusExpectation, PollSettings,
    SecHubClient,
};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const JOB_TIMEOUT_SECS: u64 = 5;
const EVENTS_TIMEOUT_SECS: u64 = 3;
const CLEANUP_TIMEOUT_SECS: u64 = 15;
const POLL_INTERVAL_MS: u64 = 1_000;
const STABLE_CHECK_INTERVAL_MS: u64 = 300;

/// Run the parsed command and return what should be printed on stdout.
pub async fn execute(client: &SecHubClient, cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::JobDone {
            project,
            job,
            fail_fast,
        } => {
            let expectation = if *fail_fast {
                JobStatusExpectation::done_fail_fast()
            } else {
                JobStatusExpectation::done()
            };
            let polled = client
                .job_api()
                .wait_for_job(project, job, &expectation, settings(cli, JOB_TIMEOUT_SECS))
                .await?;
            to_json(&polled.snapshot)
        }
        Commands::JobState {
            project,
            job,
            states,
        } => {
            let polled = client
                .job_api()
                .wait_for_job(
                    project,
                    job,
                    &JobStatusExpectation::in_any_state(states),
                    settings(cli, JOB_TIMEOUT_SECS),
                )
                .await?;
            to_json(&polled.snapshot)
        }
        Commands::PdsJob { job, state } => {
            let status = client
                .pds_api()
                .wait_for_pds_job_in_state(job, *state, settings(cli, JOB_TIMEOUT_SECS))
                .await?;
            to_json(&status)
        }
        Commands::EventsStart => {
            client
                .event_inspection_api()
                .start_with_interval(interval(cli, STABLE_CHECK_INTERVAL_MS))
                .await?;
            Ok("event inspection started".to_string())
        }
        Commands::EventsStop => {
            client.event_inspection_api().reset_and_stop().await?;
            Ok("event inspection reset and stopped".to_string())
        }
        Commands::EventsAssert {
            expectation,
            write_history,
            id,
            variant,
        } => {
            let expectation = EventExpectation::from_json(&read_file(expectation)?)?;
            let history = client
                .event_inspection_api()
                .assert_events_with(&expectation, settings(cli, EVENTS_TIMEOUT_SECS))
                .await?;

            if let (Some(dir), Some(id)) = (write_history, id) {
                history.write_to_dir(dir, id, variant.as_deref())?;
            }
            to_json(&history)
        }
        Commands::EventsPropose { wait_secs } => Err(client
            .event_inspection_api()
            .propose_expectation(Duration::from_secs(*wait_secs))
            .await
            .into()),
        Commands::DeleteCounts { expectation, pds } => {
            let expectation = DeleteCountExpectation::from_json(&read_file(expectation)?)?;
            let counts = cleanup_api(client, *pds)
                .assert_delete_counts(&expectation, settings(cli, CLEANUP_TIMEOUT_SECS))
                .await?;
            to_json(&counts)
        }
        Commands::NoDeletes { pds } => {
            let counts = cleanup_api(client, *pds)
                .assert_delete_counts(
                    &DeleteCountExpectation::never_any_delete(),
                    settings(cli, CLEANUP_TIMEOUT_SECS),
                )
                .await?;
            to_json(&counts)
        }
        Commands::CleanupReset { pds } => {
            cleanup_api(client, *pds).reset_inspection().await?;
            Ok("auto-cleanup inspection reset".to_string())
        }
    }
}

/// Poll settings from the global flags, with a per-command default timeout.
pub fn settings(cli: &Cli, default_timeout_secs: u64) -> PollSettings {
    PollSettings::new(
        Duration::from_secs(cli.timeout_secs.unwrap_or(default_timeout_secs)),
        interval(cli, POLL_INTERVAL_MS),
    )
}

/// `--interval-ms`, or the command's own default.
pub fn interval(cli: &Cli, default_ms: u64) -> Duration {
    Duration::from_millis(cli.interval_ms.unwrap_or(default_ms))
}

fn cleanup_api(client: &SecHubClient, pds: bool) -> AutoCleanupApi<'_> {
    if pds {
        client.pds_auto_cleanup_api()
    } else {
        client.auto_cleanup_api()
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(WaitError::from)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

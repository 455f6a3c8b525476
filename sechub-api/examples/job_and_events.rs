//! Wait for a job and assert the events it triggered.
//!
//! Needs `SECHUB_SERVER`, `SECHUB_USERID` and `SECHUB_APITOKEN`, and the job
//! UUID as first argument:
//!
//! ```text
//! cargo run --example job_and_events -- 3a1f0c2e-5b7d-4a7e-9c1b-2d3e4f5a6b7c
//! ```

use sechub_testkit::{EventExpectation, SecHubClient, SecHubConfig};
use std::time::Duration;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let job_uuid: Uuid = std::env::args()
        .nth(1)
        .ok_or("missing job UUID argument")?
        .parse()?;

    let client = SecHubClient::new(SecHubConfig::from_env()?)?;
    let events = client.event_inspection_api();

    events.start().await?;

    let status = client
        .job_api()
        .wait_for_job_done("project1", &job_uuid, 30, true)
        .await?;
    println!("job {} ended with {:?}", status.job_uuid, status.result);

    let expectation = EventExpectation::builder()
        .async_event("JOB_DONE")
        .from("ScanService")
        .to(&["ScheduleJobStatusMessageHandler"])
        .build();
    match events.assert_events(&expectation, Duration::from_secs(3)).await {
        Ok(history) => println!("{} event(s) as expected", history.sender_count()),
        Err(e) => eprintln!("{e}"),
    }

    events.reset_and_stop().await?;
    Ok(())
}

//! Step runner
//!
//! Sends each step to the engine and checks the response. Requests go out
//! strictly one at a time and the run stops at the first failing step.

use std::time::Duration;

use colored::Colorize;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::{Error, Result};
use crate::protocol::{self, LineChannel};

use super::suite::{Step, TestFile};

/// Runner settings
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// How long to wait for each response
    pub response_timeout: Duration,
    /// Print every response
    pub verbose: bool,
}

/// Outcome of a run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files whose steps all passed
    pub files_passed: usize,
    /// Requests sent, including the failing one
    pub steps_run: usize,
    /// Failing steps (0 or 1, since the run stops at the first)
    pub failures: usize,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// Build the request for a step: a copy with an `id` filled in
///
/// `index` is 1-based. Steps without a `type` are rejected.
pub fn build_request(test: &TestFile, index: usize, step: &Step) -> Result<Map<String, Value>> {
    let mut request = step.clone();
    request
        .entry("id")
        .or_insert_with(|| Value::String(format!("{}:{}", test.label(), index)));
    if !request.contains_key("type") {
        return Err(Error::MissingStepType {
            path: test.path.clone(),
            index,
        });
    }
    Ok(request)
}

/// Run every test file in order over `channel`
///
/// All requests are built up front so a malformed step aborts the run
/// before anything is sent.
pub async fn run_tests<S>(
    channel: &mut LineChannel<S>,
    tests: &[TestFile],
    options: &RunOptions,
) -> Result<RunSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let prepared = tests
        .iter()
        .map(|test| {
            test.steps
                .iter()
                .enumerate()
                .map(|(i, step)| build_request(test, i + 1, step))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut summary = RunSummary::default();

    for (test, requests) in tests.iter().zip(prepared) {
        let label = test.label();
        tracing::debug!(file = %test.path.display(), steps = requests.len(), "Running test file");

        for (i, request) in requests.into_iter().enumerate() {
            let step_label = format!("{}:{}", label, i + 1);

            channel.send(&request).await?;
            summary.steps_run += 1;
            let response = channel.receive(options.response_timeout).await?;

            if options.verbose {
                println!("{} -> {}", step_label, Value::Object(response.clone()));
            }

            let expected_id = request.get("id");
            if protocol::response_id(&response) != expected_id {
                println!(
                    "{} response id mismatch for {}: {}",
                    "Warning:".yellow().bold(),
                    step_label,
                    protocol::response_id(&response).unwrap_or(&Value::Null)
                );
            }

            if !protocol::response_ok(&response) {
                summary.failures += 1;
                println!(
                    "{} {}: {}",
                    "FAIL".red().bold(),
                    step_label,
                    Value::Object(response)
                );
                return Ok(summary);
            }
        }

        summary.files_passed += 1;
        println!("{} {}", "PASS".green().bold(), test.path.display());
    }

    Ok(summary)
}

//! Create-and-poll workflow for new instances.
//!
//! `create_virtual_machine` returns no useful identity, so the new
//! instance has to be discovered indirectly: by watching the shared
//! asynchronous-operations feed for a machine-typed, in-progress job
//! carrying the requested name that was not part of the pre-submission
//! baseline. The baseline snapshot (current instance ids + current job
//! ids in the lookback window) permanently excludes concurrent unrelated
//! activity from being mistaken for the new instance.
//!
//! Completion is signalled by the job disappearing from the active feed.
//! That cannot distinguish "finished successfully" from "silently dropped
//! out of the window" — a known limitation of the contract, preserved
//! here rather than papered over.

use std::collections::HashSet;

use serde_json::Value;

use crate::client::{
    ApiClient, CreateRequest, Job, OBJECT_TYPE_MACHINE, STATUS_IN_PROGRESS,
};
use crate::error::OktawaveError;
use crate::value::dive_i64;

/// Feed the poller runs against. Implemented by [`ApiClient`]; tests
/// substitute a scripted feed.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait JobFeed {
    async fn instance_ids(&mut self) -> Result<Vec<i64>, OktawaveError>;
    async fn running_jobs(&mut self, period_minutes: i64) -> Result<Vec<Job>, OktawaveError>;
    async fn submit_create(&mut self, req: &CreateRequest) -> Result<(), OktawaveError>;
}

impl JobFeed for ApiClient {
    async fn instance_ids(&mut self) -> Result<Vec<i64>, OktawaveError> {
        Ok(self
            .oci_list()
            .await?
            .iter()
            .filter_map(|o: &Value| dive_i64(o, &["virtual_machine_id"]))
            .collect())
    }

    async fn running_jobs(&mut self, period_minutes: i64) -> Result<Vec<Job>, OktawaveError> {
        ApiClient::running_jobs(self, period_minutes).await
    }

    async fn submit_create(&mut self, req: &CreateRequest) -> Result<(), OktawaveError> {
        self.oci_create(req).await.map(|_| ())
    }
}

/// Poll tuning. The defaults are the contract's fixed values.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sliding feed window, in minutes.
    pub lookback_minutes: i64,
    pub interval: std::time::Duration,
    pub max_iterations: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            lookback_minutes: 60,
            interval: std::time::Duration::from_secs(5),
            max_iterations: 30,
        }
    }
}

/// Observational output emitted while polling.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// The new instance's id was resolved (emitted exactly once).
    Resolved { oci_id: i64 },
    /// Progress of one matching job in the current iteration.
    Progress { label: String, percent: i64 },
}

/// Terminal state of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Id resolved and no matching job remains in the feed.
    Resolved { oci_id: i64 },
    /// Iteration cap reached with the id known but jobs still active.
    TimedOut { oci_id: i64 },
    /// Iteration cap reached without ever resolving an id.
    Unresolved,
}

/// Submit a creation request and poll the feed until the new instance's
/// job completes, the iteration cap is reached, or the id is never seen.
pub async fn run<A, F>(
    api: &mut A,
    req: &CreateRequest,
    config: &PollConfig,
    report: &mut F,
) -> Result<CreateOutcome, OktawaveError>
where
    A: JobFeed,
    F: FnMut(PollEvent),
{
    // Baseline snapshot, taken before submission.
    let baseline_feed = api.running_jobs(config.lookback_minutes).await?;
    let mut baseline_instances: HashSet<i64> = api.instance_ids().await?.into_iter().collect();
    baseline_instances.extend(
        baseline_feed
            .iter()
            .filter(|j| j.object_type_id == OBJECT_TYPE_MACHINE)
            .map(|j| j.object_id),
    );
    let baseline_jobs: HashSet<i64> = baseline_feed.iter().map(|j| j.operation_id).collect();

    api.submit_create(req).await?;
    tracing::info!(name = %req.name, template_id = req.template_id, "creation submitted");

    let mut oci_id: Option<i64> = None;
    for iteration in 0..config.max_iterations {
        tokio::time::sleep(config.interval).await;
        let feed = api.running_jobs(config.lookback_minutes).await?;
        let matching: Vec<&Job> = feed
            .iter()
            .filter(|j| job_matches(j, &req.name, &baseline_jobs, &baseline_instances, oci_id))
            .collect();

        for job in &matching {
            if oci_id.is_none() && job.object_id != 0 {
                oci_id = Some(job.object_id);
                report(PollEvent::Resolved {
                    oci_id: job.object_id,
                });
            }
            // A second non-baseline machine job can slip through in the
            // same batch the id was resolved in; skip it.
            if let Some(id) = oci_id
                && job.object_id != id
            {
                continue;
            }
            report(PollEvent::Progress {
                label: job.operation_label.clone(),
                percent: job.progress,
            });
        }

        // Disappearance from the active feed is the completion signal.
        if matching.is_empty()
            && let Some(id) = oci_id
        {
            tracing::debug!(oci_id = id, iteration, "creation job left the feed");
            return Ok(CreateOutcome::Resolved { oci_id: id });
        }
    }

    Ok(match oci_id {
        Some(id) => CreateOutcome::TimedOut { oci_id: id },
        None => CreateOutcome::Unresolved,
    })
}

/// A job belongs to the new instance when it is outside the baseline,
/// machine-typed, in progress, named like the request, and targets either
/// the resolved id or (pre-resolution) an id unknown to the baseline or
/// the placeholder 0.
fn job_matches(
    job: &Job,
    name: &str,
    baseline_jobs: &HashSet<i64>,
    baseline_instances: &HashSet<i64>,
    resolved: Option<i64>,
) -> bool {
    !baseline_jobs.contains(&job.operation_id)
        && job.object_type_id == OBJECT_TYPE_MACHINE
        && job.status_id == STATUS_IN_PROGRESS
        && job.object_name == name
        && match resolved {
            Some(id) => job.object_id == id,
            None => true,
        }
        && (!baseline_instances.contains(&job.object_id) || job.object_id == 0)
}

//  PAIRED.rs
//    by Lut99
//
//  Created:
//    26 Mar 2024, 09:12:40
//  Last edited:
//    03 Jul 2024, 16:21:17
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the outbound half of paired-service federation: for
//!   every paired twin of a service being run, a run request is sent
//!   to the peer (under the providers-state table, which is the sole
//!   cycle-breaker) and the peer's jobs are merged into the local job
//!   set as remote mirrors.
//

use std::str::FromStr;

use grassroots_par::set::ParameterSet;
use grassroots_svc::job::{ServiceJob, JOB_RESULTS_KEY, JOB_SERVICE_KEY, JOB_STATUS_VALUE_KEY, JOB_UUID_KEY};
use grassroots_svc::jobset::ServiceJobSet;
use grassroots_svc::paired::PairedService;
use grassroots_svc::remote::RemoteDetails;
use grassroots_svc::service::Service;
use log::{debug, warn};
use serde_json::{json, Value};
use specifications::envelope::{self, SERVICE_RESULTS_KEY};
use specifications::operations::{Operation, OperationStatus};
use specifications::providers::ProvidersStateTable;
use uuid::Uuid;

use crate::spec::Context;


/***** HELPER FUNCTIONS *****/
/// Sends one envelope to a peer and parses the response as JSON.
///
/// # Arguments
/// - `ctx`: The server context (for the shared HTTP client).
/// - `uri`: The peer's uri.
/// - `request`: The envelope to send.
///
/// # Returns
/// The peer's response, or [`None`] if the peer was unreachable or did not speak JSON (which
/// is logged, not fatal).
async fn post_envelope(ctx: &Context, uri: &str, request: &Value) -> Option<Value> {
    let response = match ctx.client.post(uri).json(request).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Peer '{uri}' is unreachable: {err}");
            return None;
        },
    };
    match response.json::<Value>().await {
        Ok(body) => Some(body),
        Err(err) => {
            warn!("Peer '{uri}' did not answer with JSON: {err}");
            None
        },
    }
}

/// Reads the status of one remote job entry.
fn entry_status(entry: &Value) -> Option<OperationStatus> {
    entry.get(JOB_STATUS_VALUE_KEY).and_then(Value::as_i64).and_then(|value| OperationStatus::from_value(value).ok())
}





/***** LIBRARY *****/
/// Dispatches a run to every paired twin of the given service that the providers-state table
/// has not seen yet, merging the peers' jobs into the given job set.
///
/// Peers are dispatched in declaration order. For every remote job that is still underway, a
/// remote mirror is stored in the jobs manager so later polls can be proxied to the peer;
/// completed remote jobs are merged with their materialised results.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `service`: The local service being run.
/// - `params`: The (validated) parameter set of the run.
/// - `state`: The providers-state table of the current request.
/// - `jobs`: The job set to merge remote mirrors into.
pub async fn dispatch(ctx: &Context, service: &Service, params: &ParameterSet, state: &mut ProvidersStateTable, jobs: &mut ServiceJobSet) {
    for paired in service.paired() {
        if state.contains(&paired.uri, &paired.service_name) {
            debug!("Suppressing dispatch of '{}' at '{}': already in the providers state", paired.service_name, paired.uri);
            continue;
        }

        // The request carries the state as it was _before_ this dispatch
        let request: Value = json!({
            envelope::HEADER_KEY: { envelope::SCHEMA_KEY: ctx.schema },
            envelope::SERVICES_KEY: [ {
                envelope::SERVICE_NAME_KEY: paired.service_name,
                envelope::SERVICE_RUN_KEY: true,
                envelope::PARAM_SET_KEY: params.to_json(true),
            } ],
            envelope::SERVERS_KEY: state.to_json(),
        });

        debug!("Dispatching '{}' to peer '{}' ('{}')", paired.service_name, paired.server_name, paired.uri);
        let response: Option<Value> = post_envelope(ctx, &paired.uri, &request).await;

        // Mark the pair as visited before reading anything, so even a failed call is not retried
        state.insert(paired.uri.clone(), paired.service_name.clone());

        let response: Value = match response {
            Some(response) => response,
            None => continue,
        };
        merge_response(ctx, service, paired, &response, jobs);
    }
}

/// Merges one peer's run response into the local job set.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `service`: The local service owning the mirrors.
/// - `paired`: The pairing that produced the response.
/// - `response`: The peer's response envelope.
/// - `jobs`: The job set to merge into.
fn merge_response(ctx: &Context, service: &Service, paired: &PairedService, response: &Value, jobs: &mut ServiceJobSet) {
    let results: &Vec<Value> = match response.get(SERVICE_RESULTS_KEY).and_then(Value::as_array) {
        Some(results) => results,
        None => {
            warn!("Peer '{}' answered without '{SERVICE_RESULTS_KEY}'", paired.uri);
            return;
        },
    };

    for entry in results {
        // Only the twin's own results concern us
        if entry.get(JOB_SERVICE_KEY).and_then(Value::as_str) != Some(paired.service_name.as_str()) {
            continue;
        }
        let remote_uuid: Option<Uuid> = entry.get(JOB_UUID_KEY).and_then(Value::as_str).and_then(|raw| Uuid::from_str(raw).ok());
        let status: OperationStatus = match entry_status(entry) {
            Some(status) => status,
            None => {
                warn!("Peer '{}' answered with a result without a readable status", paired.uri);
                continue;
            },
        };

        let name: String = format!("{} @ {}", paired.service_name, paired.server_name);
        if status.is_live() {
            // Still underway; keep a mirror so a later poll can be proxied to the peer
            let remote_uuid: Uuid = match remote_uuid {
                Some(remote_uuid) => remote_uuid,
                None => {
                    warn!("Peer '{}' reported a live job without a uuid; cannot mirror it", paired.uri);
                    continue;
                },
            };
            let job: ServiceJob =
                ServiceJob::new_remote(service.name(), name, RemoteDetails::new(paired.uri.clone(), paired.service_name.clone(), remote_uuid), status);
            if let Err(err) = ctx.jobs.add(&ctx.registry, &job) {
                warn!("Cannot store remote mirror '{}': {err}", job.uuid());
            }
            jobs.add(job);
        } else if status.is_success() {
            let details: RemoteDetails =
                RemoteDetails::new(paired.uri.clone(), paired.service_name.clone(), remote_uuid.unwrap_or_else(Uuid::new_v4));
            let mut job: ServiceJob = ServiceJob::new_remote(service.name(), name, details, status);
            if let Some(remote_results) = entry.get(JOB_RESULTS_KEY).and_then(Value::as_array) {
                job.set_results(remote_results.clone());
            }
            if let Err(err) = ctx.jobs.add(&ctx.registry, &job) {
                warn!("Cannot store remote result '{}': {err}", job.uuid());
            }
            jobs.add(job);
        } else if status.is_failure() {
            let details: RemoteDetails =
                RemoteDetails::new(paired.uri.clone(), paired.service_name.clone(), remote_uuid.unwrap_or_else(Uuid::new_v4));
            let mut job: ServiceJob = ServiceJob::new_remote(service.name(), name, details, status);
            job.add_general_error(format!("Peer '{}' reported {status} for service '{}'", paired.server_name, paired.service_name));
            jobs.add(job);
        }
    }
}

/// Proxies a poll for a remote mirror to the peer that runs the actual work.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `job`: The remote mirror to bring up to date. Updated in place with the peer's status
///   and (when available) results.
pub async fn poll_remote(ctx: &Context, job: &mut ServiceJob) {
    let remote: RemoteDetails = match job.remote() {
        Some(remote) => remote.clone(),
        None => return,
    };

    let request: Value = json!({
        envelope::HEADER_KEY: { envelope::SCHEMA_KEY: ctx.schema },
        envelope::OPERATIONS_KEY: {
            "operation": Operation::GetServiceResults.to_string(),
            envelope::SERVICES_KEY: [ remote.job_id.to_string() ],
        },
    });

    let response: Value = match post_envelope(ctx, &remote.uri, &request).await {
        Some(response) => response,
        None => return,
    };
    let entry: &Value = match response.get(SERVICE_RESULTS_KEY).and_then(Value::as_array).and_then(|entries| entries.first()) {
        Some(entry) => entry,
        None => {
            warn!("Peer '{}' answered a poll for '{}' without results", remote.uri, remote.job_id);
            return;
        },
    };

    if let Some(status) = entry_status(entry) {
        job.set_status(status);
    }
    if let Some(results) = entry.get(JOB_RESULTS_KEY).and_then(Value::as_array) {
        job.set_results(results.clone());
    }
}

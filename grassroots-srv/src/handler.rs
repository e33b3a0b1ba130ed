//  HANDLER.rs
//    by Lut99
//
//  Created:
//    26 Mar 2024, 13:44:09
//  Last edited:
//    04 Jul 2024, 10:58:23
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the top-level request dispatcher: parses an incoming
//!   JSON request, determines the high-level operation (or the
//!   services to run), fans the work out to local services and
//!   federated peers, and composes the initialised response envelope.
//!   The dispatcher never raises; every error path yields a JSON
//!   response.
//

use std::path::{Path, PathBuf};
use std::str::FromStr;

use grassroots_par::set::ParameterSet;
use grassroots_svc::job::ServiceJob;
use grassroots_svc::jobset::ServiceJobSet;
use grassroots_svc::service::Service;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use specifications::envelope::{
    self, build_error_response, build_response, RequestEnvelope, ServiceRunRequest, RESOURCE_KEY, SCHEMA_KEY, SERVER_STATUS_KEY, SERVER_UUID_KEY,
    SERVICES_KEY, SERVICE_RESULTS_KEY,
};
use specifications::operations::{Operation, OperationStatus};
use specifications::providers::ProvidersStateTable;
use specifications::resource::{DataResource, PROTOCOL_FILE, PROTOCOL_STRING};
use specifications::user::UserDetails;
use uuid::Uuid;

use crate::matcher::{ResourceMatcher, ServiceMatch, ServiceMatcher as _};
use crate::spec::Context;
use crate::{linked, paired};


/***** HELPER FUNCTIONS *****/
/// Stamps a response with the uuid of the server that produced it.
fn stamp(mut response: Value, uuid: Uuid) -> Value {
    if let Some(obj) = response.as_object_mut() {
        obj.entry(SERVER_UUID_KEY).or_insert_with(|| Value::String(uuid.to_string()));
    }
    response
}

/// Extracts the list of names (or uuids) below the given key of an operations object,
/// accepting both a single string and an array of strings.
fn extract_list(op: Option<&Value>, key: &str) -> Vec<String> {
    match op.and_then(|op| op.get(key)) {
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(many)) => many.iter().filter_map(Value::as_str).map(String::from).collect(),
        _ => vec![],
    }
}

/// Builds the descriptor of one service, with the schema that the matcher (or the handler)
/// volunteered.
fn describe(ctx: &Context, service: &Service, user: Option<&UserDetails>, matched: ServiceMatch) -> Value {
    let params: ParameterSet = match matched {
        ServiceMatch::Interested(params) => params,
        _ => match service.handler().parameters(user) {
            Ok(params) => params,
            Err(err) => {
                warn!("Service '{}' failed to build its schema for a listing: {}", service.name(), err);
                ParameterSet::new()
            },
        },
    };
    service.descriptor(Some(&ctx.provider), &params)
}





/***** OPERATION HANDLERS *****/
/// Handles LIST_ALL_SERVICES: local descriptors plus a providers-state-guarded fan-out to
/// every known external server.
async fn list_all_services(ctx: &Context, user: Option<&UserDetails>, state: &mut ProvidersStateTable) -> Value {
    let mut services: Vec<Value> = ctx.registry.iter().map(|service| describe(ctx, service, user, ServiceMatch::Yes)).collect();

    for server in ctx.servers.iter() {
        if state.contains_server(&server.uri) {
            debug!("Suppressing listing fan-out to '{}': already in the providers state", server.uri);
            continue;
        }

        let request: Value = json!({
            envelope::HEADER_KEY: { SCHEMA_KEY: ctx.schema },
            envelope::OPERATIONS_KEY: { "operation": Operation::ListAllServices.to_string() },
            envelope::SERVERS_KEY: state.to_json(),
        });
        let response = ctx.client.post(&server.uri).json(&request).send().await;
        state.insert_server(server.uri.clone());

        let body: Value = match response {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    warn!("Peer '{}' did not answer a listing with JSON: {}", server.uri, err);
                    continue;
                },
            },
            Err(err) => {
                warn!("Peer '{}' is unreachable for a listing: {}", server.uri, err);
                continue;
            },
        };
        if let Some(remote) = body.get(SERVICES_KEY).and_then(Value::as_array) {
            debug!("Peer '{}' contributed {} service(s)", server.name, remote.len());
            services.extend(remote.iter().cloned());
        }
    }

    build_response(&ctx.schema, SERVICES_KEY, Value::Array(services))
}

/// Handles LIST_INTERESTED_SERVICES: all services whose resource matcher accepts the given
/// resource, with their pre-populated parameter sets.
fn list_interested_services(ctx: &Context, user: Option<&UserDetails>, op: Option<&Value>) -> Value {
    let resource: DataResource = match op.and_then(|op| op.get(envelope::OPERATION_RESOURCE_KEY)) {
        Some(raw) => match serde_json::from_value::<DataResource>(raw.clone()).ok().or_else(|| raw.as_str().and_then(|s| DataResource::from_str(s).ok())) {
            Some(resource) => resource,
            None => return build_error_response(&ctx.schema, format!("Cannot parse '{}' as a data resource", raw)),
        },
        None => return build_error_response(&ctx.schema, "LIST_INTERESTED_SERVICES needs a 'resource'"),
    };

    let matcher: ResourceMatcher = ResourceMatcher::new(resource);
    let hits = ctx.registry.find(&matcher, user, false);
    let services: Vec<Value> = hits.into_iter().map(|hit| describe(ctx, &hit.service, user, hit.matched)).collect();
    build_response(&ctx.schema, SERVICES_KEY, Value::Array(services))
}

/// Handles GET_NAMED_SERVICES: the descriptors of the named services.
fn get_named_services(ctx: &Context, user: Option<&UserDetails>, op: Option<&Value>) -> Value {
    let names: Vec<String> = {
        let mut names = extract_list(op, SERVICES_KEY);
        names.extend(extract_list(op, "service_name"));
        names
    };
    if names.is_empty() {
        return build_error_response(&ctx.schema, "GET_NAMED_SERVICES needs one or more service names");
    }

    let mut services: Vec<Value> = vec![];
    for name in names {
        match ctx.registry.get(&name) {
            Some(service) => services.push(describe(ctx, service, user, ServiceMatch::Yes)),
            None => {
                debug!("GET_NAMED_SERVICES: no service answers to '{name}'");
                services.push(json!({ "service_name": name, "error": "unknown service" }));
            },
        }
    }
    build_response(&ctx.schema, SERVICES_KEY, Value::Array(services))
}

/// Handles GET_SERVICE_INFO: as GET_NAMED_SERVICES, but in the indexing-data shape.
fn get_service_info(ctx: &Context, op: Option<&Value>) -> Value {
    let names: Vec<String> = {
        let mut names = extract_list(op, SERVICES_KEY);
        names.extend(extract_list(op, "service_name"));
        names
    };
    if names.is_empty() {
        return build_error_response(&ctx.schema, "GET_SERVICE_INFO needs one or more service names");
    }

    let mut services: Vec<Value> = vec![];
    for name in names {
        match ctx.registry.get(&name) {
            Some(service) => services.push(service.handler().indexing_data().unwrap_or_else(|| {
                json!({
                    "service_name": service.name(),
                    "description": service.info().description,
                })
            })),
            None => services.push(json!({ "service_name": name, "error": "unknown service" })),
        }
    }
    build_response(&ctx.schema, SERVICES_KEY, Value::Array(services))
}

/// Handles RUN_KEYWORD_SERVICES: runs every keyword-aware service with the keyword injected;
/// services that merely match the keyword as a resource are listed as interested instead.
async fn run_keyword_services(ctx: &Context, user: Option<&UserDetails>, op: Option<&Value>, state: &mut ProvidersStateTable) -> Value {
    let keyword: &str = match op.and_then(|op| op.get(envelope::OPERATION_KEYWORD_KEY)).and_then(Value::as_str) {
        Some(keyword) => keyword,
        None => return build_error_response(&ctx.schema, "RUN_KEYWORD_SERVICES needs a 'keyword'"),
    };
    info!("Running keyword services for '{keyword}'");

    let mut results: Vec<Value> = vec![];
    let mut interested: Vec<Value> = vec![];
    for service in ctx.registry.iter() {
        let mut params: ParameterSet = match service.handler().parameters(user) {
            Ok(params) => params,
            Err(err) => {
                warn!("Service '{}' failed to build its schema for a keyword run: {}", service.name(), err);
                continue;
            },
        };

        if params.has_keyword_parameter() {
            for param in params.iter_mut() {
                if param.is_keyword() {
                    if let Err(err) = param.set_current_from_str(keyword) {
                        warn!("Cannot inject keyword into '{}' of service '{}': {}", param.name(), service.name(), err);
                    }
                }
            }
            results.extend(run_with_params(ctx, service, params, user, state).await);
        } else {
            // Not keyword-aware; but it may still recognise the keyword as a resource
            let matcher: ResourceMatcher = ResourceMatcher::new(DataResource::new(PROTOCOL_STRING, keyword));
            if let ServiceMatch::Interested(matched) = matcher.matches(service, user) {
                interested.push(describe(ctx, service, user, ServiceMatch::Interested(matched)));
            }
        }
    }

    let mut response: Value = build_response(&ctx.schema, SERVICE_RESULTS_KEY, Value::Array(results));
    if let Some(obj) = response.as_object_mut() {
        obj.insert(SERVICES_KEY.into(), Value::Array(interested));
    }
    response
}

/// Handles GET_SERVICE_RESULTS: returns each job's results (or its status while it is still
/// underway), applying the polling policy: terminal failures are removed from the jobs
/// manager on first poll, terminal successes are retained.
async fn get_service_results(ctx: &Context, op: Option<&Value>) -> Value {
    let uuids: Vec<String> = extract_list(op, SERVICES_KEY);
    if uuids.is_empty() {
        return build_error_response(&ctx.schema, "GET_SERVICE_RESULTS needs one or more job uuids");
    }

    let mut results: Vec<Value> = vec![];
    for raw in uuids {
        let uuid: Uuid = match Uuid::from_str(&raw) {
            Ok(uuid) => uuid,
            Err(err) => {
                results.push(json!({ "uuid": raw, "error": format!("not a uuid: {err}") }));
                continue;
            },
        };

        let mut job: ServiceJob = match ctx.jobs.get(&ctx.registry, uuid) {
            Ok(Some(job)) => job,
            Ok(None) => {
                results.push(json!({ "uuid": raw, "error": "not found" }));
                continue;
            },
            Err(err) => {
                error!("Cannot load job '{uuid}': {err}");
                results.push(json!({ "uuid": raw, "error": err.to_string() }));
                continue;
            },
        };

        // Bring the job up to date, remotely or locally
        if job.is_remote() {
            paired::poll_remote(ctx, &mut job).await;
        } else if let Some(service) = ctx.registry.get(job.service_name()) {
            let settled: bool = job.status().is_success();
            if let Err(err) = job.update(service.handler().as_ref()).await {
                warn!("Cannot update job '{uuid}': {err}");
                job.add_general_error(err.to_string());
            }
            // The poll that observes a job settling into success fires its linked-service
            // arcs; a job that was already settled had them fired at that first observation
            if !settled && job.status().is_success() {
                linked::process_job(ctx, service, &mut job);
            }
            // Keep the service's live set in step with what we report
            let mut live = service.jobs();
            if let Some(mirror) = live.get_mut(uuid) {
                *mirror = job.clone();
            }
        }

        // The polling policy
        if job.status().is_failure() {
            debug!("Dropping job '{uuid}' from the jobs manager: observed terminal failure {}", job.status());
            if let Err(err) = ctx.jobs.remove(uuid, false) {
                warn!("Cannot drop failed job '{uuid}': {err}");
            }
        } else if let Err(err) = ctx.jobs.add(&ctx.registry, &job) {
            warn!("Cannot refresh stored job '{uuid}': {err}");
        }

        results.push(job.to_json(false));
    }
    build_response(&ctx.schema, SERVICE_RESULTS_KEY, Value::Array(results))
}

/// Handles GET_RESOURCE: reads a named file below the configured resource root.
fn get_resource(ctx: &Context, op: Option<&Value>) -> Value {
    let resource: DataResource = match op.and_then(|op| op.get(envelope::OPERATION_RESOURCE_KEY)) {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(resource) => resource,
            Err(err) => return build_error_response(&ctx.schema, format!("Cannot parse resource: {err}")),
        },
        None => return build_error_response(&ctx.schema, "GET_RESOURCE needs a 'resource'"),
    };
    if resource.protocol != PROTOCOL_FILE {
        return build_error_response(&ctx.schema, format!("Cannot serve resources with protocol '{}'", resource.protocol));
    }
    let root: &Path = match &ctx.resource_root {
        Some(root) => root,
        None => return build_error_response(&ctx.schema, "This server has no resources configured"),
    };

    // Refuse anything that escapes the root
    let path: PathBuf = root.join(&resource.value);
    let path: PathBuf = match path.canonicalize() {
        Ok(path) => path,
        Err(err) => return build_error_response(&ctx.schema, format!("Cannot resolve resource '{}': {err}", resource.value)),
    };
    let root: PathBuf = match root.canonicalize() {
        Ok(root) => root,
        Err(err) => return build_error_response(&ctx.schema, format!("Cannot resolve the resource root: {err}")),
    };
    if !path.starts_with(&root) {
        warn!("Refusing to serve '{}': outside the resource root", resource.value);
        return build_error_response(&ctx.schema, format!("Resource '{}' lies outside the resource root", resource.value));
    }

    match std::fs::read_to_string(&path) {
        Ok(data) => build_response(&ctx.schema, RESOURCE_KEY, json!({ "protocol": resource.protocol, "value": resource.value, "data": data })),
        Err(err) => build_error_response(&ctx.schema, format!("Cannot read resource '{}': {err}", resource.value)),
    }
}

/// Handles SERVER_STATUS: a snapshot of every job known to the jobs manager, results left
/// out.
fn server_status(ctx: &Context) -> Value {
    match ctx.jobs.list() {
        Ok(jobs) => build_response(&ctx.schema, SERVER_STATUS_KEY, Value::Array(jobs.iter().map(|job| job.to_json(true)).collect())),
        Err(err) => {
            error!("Cannot snapshot the jobs manager: {err}");
            build_error_response(&ctx.schema, format!("Cannot snapshot the jobs manager: {err}"))
        },
    }
}





/***** RUNNING *****/
/// Runs one service with an already-prepared parameter set: lock, providers-state
/// registration, the run callback, paired fan-out, linked-service chaining, persistence.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `service`: The service to run.
/// - `params`: The validated parameter set to run with.
/// - `user`: The credentials of the requesting user, if any.
/// - `state`: The providers-state table of the current request.
///
/// # Returns
/// The wire forms of all jobs this run produced (local and remote mirrors alike).
async fn run_with_params(
    ctx: &Context,
    service: &Service,
    params: ParameterSet,
    user: Option<&UserDetails>,
    state: &mut ProvidersStateTable,
) -> Vec<Value> {
    let handler = service.handler();

    // Lockable services serialise their whole run
    let _guard = match service.sync() {
        Some(sync) => Some(sync.lock().await),
        None => None,
    };

    // We are now in flight on this server
    state.insert(ctx.provider.uri.clone(), service.name());

    let mut jobset: ServiceJobSet = match handler.run(&params, user, service.cancellation_token()).await {
        Ok(jobset) => jobset,
        Err(err) => {
            error!("Service '{}' failed to run: {}", service.name(), err);
            let mut job: ServiceJob = ServiceJob::new(service.name(), format!("{} run", service.name()), None);
            job.set_status(OperationStatus::Error);
            job.add_general_error(err.to_string());
            let mut jobset: ServiceJobSet = ServiceJobSet::new(service.name());
            jobset.add(job);
            jobset
        },
    };
    for job in jobset.jobs_mut() {
        handler.customise_job(job);
    }

    // Fan out to the paired twins, then chain the linked services of every success
    paired::dispatch(ctx, service, &params, state, &mut jobset).await;
    for job in jobset.jobs_mut() {
        if job.status().is_success() {
            linked::process_job(ctx, service, job);
        }
    }

    // Persist; a failed write keeps the job in memory, polling still works on what we return
    for job in jobset.jobs() {
        if !job.is_remote() {
            if let Err(err) = ctx.jobs.add(&ctx.registry, job) {
                error!("Cannot persist job '{}': {err}", job.uuid());
            }
        }
    }

    let results: Vec<Value> = jobset.to_json(false);
    service.merge_jobs(jobset);
    results
}

/// Runs one entry of a request's `services` array.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `entry`: The run request entry.
/// - `user`: The credentials of the requesting user, if any.
/// - `state`: The providers-state table of the current request.
///
/// # Returns
/// The wire forms of all jobs this entry produced (which may be a single failed-to-start
/// stub if the parameters were rejected).
async fn run_service_entry(ctx: &Context, entry: &ServiceRunRequest, user: Option<&UserDetails>, state: &mut ProvidersStateTable) -> Vec<Value> {
    let service = match ctx.registry.get(&entry.name) {
        Some(service) => service,
        None => {
            debug!("Run request for unknown service '{}'", entry.name);
            return vec![json!({ "service": entry.name, "error": "unknown service" })];
        },
    };
    let handler = service.handler();

    // Build the schema and apply the request's values to it
    let mut params: ParameterSet = match handler.parameters(user) {
        Ok(params) => params,
        Err(err) => {
            error!("Service '{}' failed to build its schema: {}", service.name(), err);
            let mut job: ServiceJob = ServiceJob::new(service.name(), format!("{} run", service.name()), None);
            job.set_status(OperationStatus::FailedToStart);
            job.add_general_error(err.to_string());
            return vec![job.to_json(false)];
        },
    };
    if let Some(fragment) = &entry.param_set {
        if let Err((name, err)) = params.apply_request(fragment, handler.parameter_decoder()) {
            info!("Rejecting run of '{}': {}", service.name(), err);
            let mut job: ServiceJob = ServiceJob::new(service.name(), format!("{} run", service.name()), None);
            job.set_status(OperationStatus::FailedToStart);
            match name {
                Some(name) => match params.get(&name).map(|param| param.kind()) {
                    Some(kind) => job.add_parameter_error(name, kind, err.to_string()),
                    None => job.add_general_error(err.to_string()),
                },
                None => job.add_general_error(err.to_string()),
            }
            return vec![job.to_json(false)];
        }
    }

    run_with_params(ctx, service, params, user, state).await
}





/***** LIBRARY *****/
/// The top-level entry point: consumes one JSON request, produces one JSON response.
///
/// This function never errors; malformed requests yield an error envelope, and per-service
/// failures are recorded in the affected jobs.
///
/// # Arguments
/// - `ctx`: The server context.
/// - `request`: The raw incoming JSON request.
///
/// # Returns
/// The JSON response, stamped with this server's uuid.
pub async fn handle(ctx: &Context, request: Value) -> Value {
    let parsed: RequestEnvelope = match RequestEnvelope::from_json(&request) {
        Ok(parsed) => parsed,
        Err(err) => {
            info!("Rejecting malformed request: {err}");
            return stamp(build_error_response(&ctx.schema, err), ctx.uuid);
        },
    };

    // A schema mismatch is worth knowing about, but old clients are served on a best-effort basis
    if let Some(schema) = &parsed.header.schema {
        if !ctx.schema.is_compatible_with(schema) {
            warn!("Request speaks schema {schema}, we speak {}; answering best-effort", ctx.schema);
        }
    }

    // Another server's uuid proxies the request there wholesale
    if let Some(raw) = &parsed.server_uri {
        match Uuid::from_str(raw) {
            Ok(uuid) if uuid != ctx.uuid => {
                return proxy(ctx, uuid, &request).await;
            },
            Ok(_) => {},
            Err(err) => {
                return stamp(build_error_response(&ctx.schema, format!("Cannot parse server uuid '{raw}': {err}")), ctx.uuid);
            },
        }
    }

    // Seed the per-request providers state from the request
    let mut state: ProvidersStateTable = match &parsed.servers {
        Some(servers) => match ProvidersStateTable::from_json(servers) {
            Ok(state) => state,
            Err(err) => {
                return stamp(build_error_response(&ctx.schema, err), ctx.uuid);
            },
        },
        None => ProvidersStateTable::new(),
    };

    let user: Option<&UserDetails> = parsed.user.as_ref();
    let response: Value = if let Some(operations) = &parsed.operations {
        let op: Operation = match Operation::from_json(operations) {
            Ok(op) => op,
            Err(err) => {
                // Unknown operation: an empty result set with a diagnostic
                info!("Rejecting unknown operation: {err}");
                let mut response: Value = build_error_response(&ctx.schema, err);
                if let Some(obj) = response.as_object_mut() {
                    obj.insert(SERVICE_RESULTS_KEY.into(), Value::Array(vec![]));
                }
                return stamp(response, ctx.uuid);
            },
        };
        debug!("Handling operation {op}");

        let op_obj: Option<&Value> = operations.is_object().then_some(operations);
        match op {
            Operation::ListAllServices => list_all_services(ctx, user, &mut state).await,
            Operation::GetSchemaVersion => build_response(&ctx.schema, SCHEMA_KEY, serde_json::to_value(ctx.schema).unwrap_or(Value::Null)),
            Operation::ListInterestedServices => list_interested_services(ctx, user, op_obj),
            Operation::GetNamedServices => get_named_services(ctx, user, op_obj),
            Operation::GetServiceResults => get_service_results(ctx, op_obj).await,
            Operation::GetResource => get_resource(ctx, op_obj),
            Operation::ServerStatus => server_status(ctx),
            Operation::GetServiceInfo => get_service_info(ctx, op_obj),
            Operation::RunKeywordServices => run_keyword_services(ctx, user, op_obj, &mut state).await,
        }
    } else {
        // No operation: the services array drives the request
        let mut results: Vec<Value> = vec![];
        for entry in &parsed.services {
            if !entry.run {
                debug!("Skipping services entry '{}': run flag not set", entry.name);
                continue;
            }
            results.extend(run_service_entry(ctx, entry, user, &mut state).await);
        }
        build_response(&ctx.schema, SERVICE_RESULTS_KEY, Value::Array(results))
    };

    stamp(response, ctx.uuid)
}

/// Proxies a whole request to the external server with the given uuid, substituting the
/// server uuid in the response.
async fn proxy(ctx: &Context, uuid: Uuid, request: &Value) -> Value {
    let server = match ctx.servers.get(uuid) {
        Some(server) => server,
        None => {
            return stamp(build_error_response(&ctx.schema, format!("No external server with uuid '{uuid}'")), ctx.uuid);
        },
    };

    info!("Proxying request to '{}' ('{}')", server.name, server.uri);
    let response = match ctx.client.post(&server.uri).json(request).send().await {
        Ok(response) => response,
        Err(err) => {
            return stamp(build_error_response(&ctx.schema, format!("External server '{}' is unreachable: {err}", server.name)), ctx.uuid);
        },
    };
    let mut body: Value = match response.json().await {
        Ok(body) => body,
        Err(err) => {
            return stamp(build_error_response(&ctx.schema, format!("External server '{}' did not answer with JSON: {err}", server.name)), ctx.uuid);
        },
    };

    if let Some(obj) = body.as_object_mut() {
        obj.insert(SERVER_UUID_KEY.into(), Value::String(server.uuid.to_string()));
    } else {
        body = json!({ SERVER_UUID_KEY: server.uuid.to_string(), "response": body });
    }
    body
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use grassroots_svc::linked::{LinkedService, MappedParameter};
    use grassroots_svc::paired::PairedService;
    use specifications::provider::Provider;
    use specifications::version::CURRENT_SCHEMA_VERSION;
    use warp::Filter as _;

    use super::*;
    use crate::bundled::BundledPlugin;
    use crate::jobsman::{JobsManager, MemoryBackend};
    use crate::registry::{ServicePlugin as _, ServiceRegistry};
    use crate::servers::ServersManager;

    /// Builds a Context over the given services, with an in-memory jobs manager and no peers.
    fn context_with(services: Vec<Service>) -> Context {
        let provider = Provider {
            name: "Test server".into(),
            uri: "https://grassroots.test".into(),
            description: "A server under test".into(),
            logo: None,
        };
        Context::new(
            CURRENT_SCHEMA_VERSION,
            provider,
            Arc::new(ServiceRegistry::with_services(services)),
            Arc::new(JobsManager::new(Box::new(MemoryBackend::new()))),
            Arc::new(ServersManager::default()),
        )
    }

    /// Builds a Context over the bundled echo and delay services.
    fn bundled_context() -> Context { context_with(BundledPlugin.get_services().unwrap()) }

    /// Spins up a fake peer that counts its hits and answers every POST with the given body.
    async fn spawn_peer(body: Value) -> (SocketAddr, Arc<AtomicUsize>) {
        let hits: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let counter: Arc<AtomicUsize> = Arc::clone(&hits);
        let route = warp::post().and(warp::body::json()).map(move |_request: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            warp::reply::json(&body)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, hits)
    }

    #[tokio::test]
    async fn single_service_sync_run() {
        let ctx = bundled_context();
        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "echo", "run": true, "param_set": { "params": [ { "name": "text", "current_value": "hi" } ] } } ] }),
        )
        .await;

        let results = response[SERVICE_RESULTS_KEY].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["status_value"], 5);
        assert_eq!(results[0]["results"][0]["text"], "hi");
        assert!(response[SERVER_UUID_KEY].is_string());
    }

    #[tokio::test]
    async fn parameter_bounds_abort_the_run() {
        let ctx = bundled_context();
        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "delay", "run": true, "param_set": { "params": [ { "name": "milliseconds", "current_value": 0 } ] } } ] }),
        )
        .await;

        let entry = &response[SERVICE_RESULTS_KEY][0];
        assert_eq!(entry["status_value"], OperationStatus::FailedToStart.value());
        let diagnostic = entry["errors"]["milliseconds"]["errors"][0].as_str().unwrap();
        assert!(diagnostic.contains("bounds"), "unexpected diagnostic: {diagnostic}");

        // The job was never run, so nothing is stored for it
        assert!(ctx.jobs.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_operations_yield_empty_results_with_a_diagnostic() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": "FROBNICATE" })).await;
        assert!(response[envelope::HEADER_KEY][envelope::ERROR_KEY].is_string());
        assert_eq!(response[SERVICE_RESULTS_KEY], json!([]));
    }

    #[tokio::test]
    async fn schema_version_is_reported() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": "GET_SCHEMA_VERSION" })).await;
        assert_eq!(response[SCHEMA_KEY]["major"], CURRENT_SCHEMA_VERSION.major);
        assert_eq!(response[SCHEMA_KEY]["minor"], CURRENT_SCHEMA_VERSION.minor);
    }

    #[tokio::test]
    async fn services_are_listed_in_name_order() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": "LIST_ALL_SERVICES" })).await;
        let services = response[SERVICES_KEY].as_array().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0]["service_name"], "delay");
        assert_eq!(services[1]["service_name"], "echo");
        assert_eq!(services[1]["provider"]["name"], "Test server");
    }

    #[tokio::test]
    async fn interested_services_answer_for_inline_resources() {
        let ctx = bundled_context();
        let response = handle(
            &ctx,
            json!({ "operations": { "operation": "LIST_INTERESTED_SERVICES", "resource": { "protocol": "inline", "value": "ACGT" } } }),
        )
        .await;

        let services = response[SERVICES_KEY].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["service_name"], "echo");
        // The matcher pre-populated the schema with the resource
        assert_eq!(services[0]["operation"]["parameter_set"]["params"][0]["current_value"], "ACGT");
    }

    #[tokio::test]
    async fn keyword_services_get_the_keyword_injected() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": { "operation": "RUN_KEYWORD_SERVICES", "keyword": "septoria" } })).await;

        let results = response[SERVICE_RESULTS_KEY].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["service"], "echo");
        assert_eq!(results[0]["results"][0]["text"], "septoria");
    }

    #[tokio::test]
    async fn async_jobs_complete_and_can_be_polled() {
        let ctx = bundled_context();
        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "delay", "run": true, "param_set": { "params": [ { "name": "milliseconds", "current_value": 20 } ] } } ] }),
        )
        .await;
        let entry = &response[SERVICE_RESULTS_KEY][0];
        assert_eq!(entry["status_value"], OperationStatus::Started.value());
        let uuid: String = entry["uuid"].as_str().unwrap().into();

        // Give the background task time to run its course, then poll
        tokio::time::sleep(Duration::from_millis(60)).await;
        let poll = json!({ "operations": { "operation": "GET_SERVICE_RESULTS", "services": [ uuid.clone() ] } });
        let polled = handle(&ctx, poll.clone()).await;
        assert_eq!(polled[SERVICE_RESULTS_KEY][0]["status_value"], OperationStatus::Succeeded.value());
        assert_eq!(polled[SERVICE_RESULTS_KEY][0]["results"][0]["slept_ms"], 20);

        // Polling a succeeded job twice yields identical payloads, and it stays stored
        let again = handle(&ctx, poll).await;
        assert_eq!(again[SERVICE_RESULTS_KEY], polled[SERVICE_RESULTS_KEY]);
        assert_eq!(ctx.jobs.list().unwrap().len(), 1);

        let status = handle(&ctx, json!({ "operations": "SERVER_STATUS" })).await;
        assert_eq!(status[SERVER_STATUS_KEY].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_jobs_leave_the_manager_on_first_poll() {
        let ctx = bundled_context();
        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "delay", "run": true, "param_set": { "params": [ { "name": "milliseconds", "current_value": 5000 } ] } } ] }),
        )
        .await;
        let uuid: String = response[SERVICE_RESULTS_KEY][0]["uuid"].as_str().unwrap().into();

        // Release the service: its background task observes the cancellation
        ctx.registry.get("delay").unwrap().release().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let poll = json!({ "operations": { "operation": "GET_SERVICE_RESULTS", "services": [ uuid.clone() ] } });
        let polled = handle(&ctx, poll.clone()).await;
        assert_eq!(polled[SERVICE_RESULTS_KEY][0]["status_value"], OperationStatus::Error.value());

        // The failure was observed once; the manager no longer knows the job
        let again = handle(&ctx, poll).await;
        assert_eq!(again[SERVICE_RESULTS_KEY][0]["error"], "not found");
    }

    #[tokio::test]
    async fn linked_services_chain_onto_successes() {
        // Two echo-alikes, the first declaring an arc onto the second
        let stub = json!({ "plugin": "bundled", "operations": [ { "name": "s1" }, { "name": "s2" } ] });
        let mut services = BundledPlugin.get_reference_services(&stub).unwrap();
        let arc = LinkedService::new("s2", vec![MappedParameter { input: "/text".into(), output: "text".into(), required: true, multiple: false }]);
        services[0].set_linked(vec![arc]);
        let ctx = context_with(services);

        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "s1", "run": true, "param_set": { "params": [ { "name": "text", "current_value": "k" } ] } } ] }),
        )
        .await;

        let entry = &response[SERVICE_RESULTS_KEY][0];
        assert_eq!(entry["status_value"], 5);
        let linked = entry["linked_services"].as_array().unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0]["service"], "s2");
        assert_eq!(linked[0]["run"], true);
        let params = linked[0]["param_set"]["params"].as_array().unwrap();
        assert!(params.iter().any(|param| param["name"] == "text" && param["current_value"] == "k"));
    }

    #[tokio::test]
    async fn paired_services_fan_out_and_mirror_remote_jobs() {
        let remote_uuid = Uuid::new_v4();
        let peer_body = json!({
            "header": { "schema": { "major": 0, "minor": 10 } },
            "service_results": [ { "service": "echo-remote", "uuid": remote_uuid.to_string(), "status_value": 2, "status": "STARTED" } ],
        });
        let (addr, hits) = spawn_peer(peer_body).await;
        let peer_uri: String = format!("http://{addr}/");

        let mut services = BundledPlugin.get_services().unwrap();
        services.retain(|service| service.name() == "echo");
        services[0].add_paired(PairedService::new(Uuid::new_v4(), "Peer", peer_uri.clone(), "echo-remote"));
        let ctx = context_with(services);

        let response = handle(
            &ctx,
            json!({ "services": [ { "name": "echo", "run": true, "param_set": { "params": [ { "name": "text", "current_value": "hi" } ] } } ] }),
        )
        .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let results = response[SERVICE_RESULTS_KEY].as_array().unwrap();
        assert_eq!(results.len(), 2);
        let mirror = results.iter().find(|entry| entry["job_type"] == "remote_service_job").expect("no remote mirror in the results");
        assert_eq!(mirror["remote_job_id"], remote_uuid.to_string());
        assert_eq!(mirror["remote_uri"], peer_uri);
        assert_eq!(mirror["status_value"], 2);

        // The mirror is stored, so a later poll can be proxied to the peer
        assert_eq!(ctx.jobs.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn seeded_providers_state_suppresses_the_fan_out() {
        let (addr, hits) = spawn_peer(json!({ "service_results": [] })).await;
        let peer_uri: String = format!("http://{addr}/");

        let mut services = BundledPlugin.get_services().unwrap();
        services.retain(|service| service.name() == "echo");
        services[0].add_paired(PairedService::new(Uuid::new_v4(), "Peer", peer_uri.clone(), "echo-remote"));
        let ctx = context_with(services);

        let response = handle(
            &ctx,
            json!({
                "services": [ { "name": "echo", "run": true, "param_set": { "params": [ { "name": "text", "current_value": "hi" } ] } } ],
                "servers": [ { "server_uri": peer_uri } ],
            }),
        )
        .await;

        // Local-only results, and the peer was never contacted
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(response[SERVICE_RESULTS_KEY].as_array().unwrap().len(), 1);
        assert_eq!(response[SERVICE_RESULTS_KEY][0]["service"], "echo");
    }

    #[tokio::test]
    async fn resources_are_served_from_the_root_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "field notes").unwrap();

        let mut ctx = bundled_context();
        ctx.resource_root = Some(dir.path().to_path_buf());

        let response = handle(
            &ctx,
            json!({ "operations": { "operation": "GET_RESOURCE", "resource": { "protocol": "file", "value": "notes.txt" } } }),
        )
        .await;
        assert_eq!(response[RESOURCE_KEY]["data"], "field notes");

        let escape = handle(
            &ctx,
            json!({ "operations": { "operation": "GET_RESOURCE", "resource": { "protocol": "file", "value": "../escape" } } }),
        )
        .await;
        assert!(escape[envelope::HEADER_KEY][envelope::ERROR_KEY].is_string());
    }

    #[tokio::test]
    async fn unknown_proxy_targets_are_rejected() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": "GET_SCHEMA_VERSION", "server_uri": Uuid::new_v4().to_string() })).await;
        assert!(response[envelope::HEADER_KEY][envelope::ERROR_KEY].as_str().unwrap().contains("No external server"));
    }

    #[tokio::test]
    async fn named_services_are_returned_exactly() {
        let ctx = bundled_context();
        let response = handle(&ctx, json!({ "operations": { "operation": "GET_NAMED_SERVICES", "service_name": "echo" } })).await;
        let services = response[SERVICES_KEY].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["service_name"], "echo");

        let missing = handle(&ctx, json!({ "operations": { "operation": "GET_NAMED_SERVICES", "service_name": "blast" } })).await;
        assert_eq!(missing[SERVICES_KEY][0]["error"], "unknown service");
    }
}

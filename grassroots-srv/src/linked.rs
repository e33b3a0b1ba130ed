//  LINKED.rs
//    by Lut99
//
//  Created:
//    26 Mar 2024, 11:08:51
//  Last edited:
//    03 Jul 2024, 17:00:28
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the linked-service engine: when a job succeeds and its
//!   owning service declares linked-service arcs, the declared fields
//!   are read out of the job's results and a follow-on run request for
//!   the downstream service is synthesised onto the job.
//

use grassroots_par::parameter::Parameter;
use grassroots_par::set::ParameterSet;
use grassroots_par::value::{ParameterType, ParameterValue};
use grassroots_svc::job::ServiceJob;
use grassroots_svc::linked::{LinkedService, MAPPED_PARAM_VALUE_SENTINEL};
use grassroots_svc::service::Service;
use log::{debug, warn};
use serde_json::{json, Value};
use specifications::envelope::{PARAM_SET_KEY, SERVICE_RUN_KEY};

use crate::spec::Context;


/***** CONSTANTS *****/
/// The key naming the downstream service in a generated follow-on request.
pub const LINKED_SERVICE_KEY: &str = "service";





/***** HELPER FUNCTIONS *****/
/// Collects the values one mapping points at, across all result entries of a job.
///
/// # Arguments
/// - `job`: The succeeded job whose results are read.
/// - `root`: The arc's JSON pointer prefix, if any.
/// - `input`: The mapping's JSON pointer, relative to the root.
///
/// # Returns
/// All non-null values found, in result order.
fn collect_values(job: &ServiceJob, root: Option<&str>, input: &str) -> Vec<Value> {
    let pointer: String = format!("{}{}", root.unwrap_or(""), input);
    job.results()
        .unwrap_or(&[])
        .iter()
        .filter_map(|result| result.pointer(&pointer))
        .filter(|value| !value.is_null())
        .cloned()
        .collect()
}

/// Coerces one JSON value through a downstream parameter's type and assigns it.
///
/// String values are re-parsed with the parameter's own parser when the shapes disagree, so
/// that e.g. a stringly-typed gene count can still feed an integer parameter.
///
/// # Arguments
/// - `param`: The downstream parameter to assign.
/// - `value`: The value to coerce.
///
/// # Returns
/// Whether the assignment took.
fn coerce_into(param: &mut Parameter, value: &Value) -> bool {
    let parsed: Option<ParameterValue> = match ParameterValue::from_json(param.kind(), value) {
        Ok(parsed) => parsed,
        Err(_) => match value.as_str() {
            Some(raw) => match ParameterValue::from_display_str(param.kind(), raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("Cannot coerce {value} into parameter '{}': {err}", param.name());
                    return false;
                },
            },
            None => {
                warn!("Cannot coerce {value} into parameter '{}' of type {}", param.name(), param.kind());
                return false;
            },
        },
    };
    match param.set_current(parsed) {
        Ok(_) => true,
        Err(err) => {
            warn!("Downstream parameter '{}' rejected mapped value: {err}", param.name());
            false
        },
    }
}

/// Emits one follow-on run request onto the job.
fn emit_request(job: &mut ServiceJob, service_name: &str, params: &ParameterSet) {
    job.add_linked_service(json!({
        LINKED_SERVICE_KEY: service_name,
        SERVICE_RUN_KEY: true,
        PARAM_SET_KEY: params.to_json(true),
    }));
}





/***** LIBRARY *****/
/// Processes every linked-service arc of the given service against one succeeded job.
///
/// Arcs with a custom generator are delegated to the owning service's handler; mapping-based
/// arcs read their inputs from the job's results and synthesise a run request for the
/// downstream service. Required mappings with missing inputs abort their arc (recorded under
/// the job's errors); multi-valued mappings fan out into one request per value, unless the
/// downstream parameter is itself list-typed.
///
/// # Arguments
/// - `ctx`: The server context (for resolving downstream services).
/// - `service`: The service owning the job and the arcs.
/// - `job`: The succeeded job to process.
pub fn process_job(ctx: &Context, service: &Service, job: &mut ServiceJob) {
    if service.linked().is_empty() || !job.status().is_success() {
        return;
    }

    for arc in service.linked() {
        // Custom generators get the whole arc
        if arc.generator.is_some() {
            match service.handler().process_linked_service(arc, job) {
                Some(Ok(request)) => job.add_linked_service(request),
                Some(Err(err)) => {
                    warn!("Generator for linked service '{}' failed: {err}", arc.service_name);
                    job.add_general_error(format!("Cannot generate linked request for '{}': {err}", arc.service_name));
                },
                None => {
                    warn!("Service '{}' does not know generator '{}'", service.name(), arc.generator.as_deref().unwrap_or(""));
                    job.add_general_error(format!("Unknown linked-service generator for '{}'", arc.service_name));
                },
            }
            continue;
        }

        process_mapped_arc(ctx, arc, job);
    }
}

/// Processes one mapping-based arc against one job.
fn process_mapped_arc(ctx: &Context, arc: &LinkedService, job: &mut ServiceJob) {
    // The downstream schema tells us the target types
    let downstream = match ctx.registry.get(&arc.service_name) {
        Some(downstream) => downstream,
        None => {
            warn!("Linked service '{}' is not loaded on this server", arc.service_name);
            job.add_general_error(format!("Linked service '{}' is unavailable", arc.service_name));
            return;
        },
    };
    let mut base: ParameterSet = match downstream.handler().parameters(None) {
        Ok(base) => base,
        Err(err) => {
            warn!("Linked service '{}' failed to build its schema: {err}", arc.service_name);
            job.add_general_error(format!("Linked service '{}' is unavailable: {err}", arc.service_name));
            return;
        },
    };

    // Gather all mapped inputs up front; a missing required one aborts the whole arc
    let mut fanout: Vec<(String, Vec<Value>)> = vec![];
    for mapping in &arc.mapped {
        let values: Vec<Value> = collect_values(job, arc.input_root.as_deref(), &mapping.input);
        if values.is_empty() {
            if mapping.required {
                debug!("Aborting linked arc to '{}': required input '{}' is missing", arc.service_name, mapping.input);
                let (name, kind) = match base.get(&mapping.output) {
                    Some(param) => (param.name().to_string(), Some(param.kind())),
                    None => (mapping.output.clone(), None),
                };
                match kind {
                    Some(kind) => job.add_parameter_error(name, kind, format!("Required input '{}' is missing from the results", mapping.input)),
                    None => job.add_general_error(format!("Required input '{}' for linked service '{}' is missing", mapping.input, arc.service_name)),
                }
                return;
            }
            continue;
        }

        if mapping.output == MAPPED_PARAM_VALUE_SENTINEL {
            // The input value itself names a boolean parameter to switch on
            for value in &values {
                let target: &str = match value.as_str() {
                    Some(target) => target,
                    None => {
                        warn!("$value mapping yielded non-string {value}; ignoring");
                        continue;
                    },
                };
                match base.get_mut(target) {
                    Some(param) if param.kind() == ParameterType::Boolean => {
                        if let Err(err) = param.set_current(Some(ParameterValue::Boolean(true))) {
                            warn!("Cannot switch on parameter '{target}': {err}");
                        }
                    },
                    Some(param) => warn!("Cannot switch on parameter '{target}': it is {} rather than boolean", param.kind()),
                    None => warn!("Cannot switch on parameter '{target}': no such parameter on '{}'", arc.service_name),
                }
            }
            continue;
        }

        let is_list_target: bool =
            base.get(&mapping.output).map(|param| matches!(param.kind(), ParameterType::StringArray | ParameterType::TimeArray | ParameterType::Json)).unwrap_or(false);
        if is_list_target {
            // List-typed downstream parameters swallow all values in one request
            let list: Value = Value::Array(values);
            if let Some(param) = base.get_mut(&mapping.output) {
                coerce_into(param, &list);
            }
        } else if values.len() == 1 || !mapping.multiple {
            if let Some(param) = base.get_mut(&mapping.output) {
                coerce_into(param, &values[0]);
            } else {
                warn!("Linked service '{}' has no parameter '{}'", arc.service_name, mapping.output);
            }
        } else {
            fanout.push((mapping.output.clone(), values));
        }
    }

    // One request per fanned-out value; without fanout, a single request
    match fanout.iter().map(|(_, values)| values.len()).max() {
        None | Some(0) => emit_request(job, &arc.service_name, &base),
        Some(n) => {
            for i in 0..n {
                let mut set: ParameterSet = base.clone();
                for (output, values) in &fanout {
                    let value: &Value = &values[i.min(values.len() - 1)];
                    if let Some(param) = set.get_mut(output) {
                        coerce_into(param, value);
                    }
                }
                emit_request(job, &arc.service_name, &set);
            }
        },
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grassroots_svc::linked::MappedParameter;
    use grassroots_svc::service::Service;
    use serde_json::json;
    use specifications::operations::OperationStatus;
    use specifications::provider::Provider;
    use specifications::version::CURRENT_SCHEMA_VERSION;

    use super::*;
    use crate::bundled::BundledPlugin;
    use crate::jobsman::{JobsManager, MemoryBackend};
    use crate::registry::{ServicePlugin as _, ServiceRegistry};
    use crate::servers::ServersManager;
    use crate::spec::Context;

    /// A source service with an arc onto a downstream echo-alike, plus the context to run in.
    fn fixture(arc: LinkedService) -> (Context, Service) {
        let stub = json!({ "plugin": "bundled", "operations": [ { "name": "source" }, { "name": "downstream" } ] });
        let mut services = BundledPlugin.get_reference_services(&stub).unwrap();
        let mut source: Service = services.remove(0);
        source.set_linked(vec![arc]);

        let provider = Provider { name: "Test".into(), uri: "https://grassroots.test".into(), description: "".into(), logo: None };
        let ctx = Context::new(
            CURRENT_SCHEMA_VERSION,
            provider,
            Arc::new(ServiceRegistry::with_services(services)),
            Arc::new(JobsManager::new(Box::new(MemoryBackend::new()))),
            Arc::new(ServersManager::default()),
        );
        (ctx, source)
    }

    fn succeeded_job(results: Vec<Value>) -> ServiceJob {
        let mut job = ServiceJob::new("source", "source", None);
        job.set_results(results);
        job.set_status(OperationStatus::Succeeded);
        job
    }

    #[test]
    fn missing_required_inputs_abort_the_arc() {
        let mut mapping = MappedParameter::new("/gene", "text");
        mapping.required = true;
        let (ctx, source) = fixture(LinkedService::new("downstream", vec![mapping]));

        let mut job = succeeded_job(vec![json!({ "unrelated": 1 })]);
        process_job(&ctx, &source, &mut job);

        assert!(job.linked_services().is_empty());
        assert!(job.errors().contains_key("text"));
    }

    #[test]
    fn multi_valued_mappings_fan_out() {
        let mut mapping = MappedParameter::new("/gene", "text");
        mapping.multiple = true;
        let (ctx, source) = fixture(LinkedService::new("downstream", vec![mapping]));

        let mut job = succeeded_job(vec![json!({ "gene": "traes_4AL" }), json!({ "gene": "traes_5BL" })]);
        process_job(&ctx, &source, &mut job);

        // One downstream request per value, since the target is a plain string
        assert_eq!(job.linked_services().len(), 2);
        let first = &job.linked_services()[0]["param_set"]["params"];
        assert!(first.as_array().unwrap().iter().any(|param| param["current_value"] == "traes_4AL"));
    }

    #[test]
    fn input_roots_prefix_every_read() {
        let mut mapping = MappedParameter::new("/gene", "text");
        mapping.required = true;
        let mut arc = LinkedService::new("downstream", vec![mapping]);
        arc.input_root = Some("/summary".into());
        let (ctx, source) = fixture(arc);

        let mut job = succeeded_job(vec![json!({ "summary": { "gene": "traes_4AL" } })]);
        process_job(&ctx, &source, &mut job);

        assert_eq!(job.linked_services().len(), 1);
    }

    #[tokio::test]
    async fn async_successes_chain_when_polled() {
        use std::time::Duration;

        // An asynchronous service that chains onto itself once its background task settles
        let mut services = BundledPlugin.get_services().unwrap();
        let mut mapping = MappedParameter::new("/slept_ms", "milliseconds");
        mapping.required = true;
        for service in services.iter_mut() {
            if service.name() == "delay" {
                service.set_linked(vec![LinkedService::new("delay", vec![mapping.clone()])]);
            }
        }

        let provider = Provider { name: "Test".into(), uri: "https://grassroots.test".into(), description: "".into(), logo: None };
        let ctx = Context::new(
            CURRENT_SCHEMA_VERSION,
            provider,
            Arc::new(ServiceRegistry::with_services(services)),
            Arc::new(JobsManager::new(Box::new(MemoryBackend::new()))),
            Arc::new(ServersManager::default()),
        );

        // Nothing chains while the job is still underway
        let response = crate::handler::handle(
            &ctx,
            json!({ "services": [ { "name": "delay", "run": true, "param_set": { "params": [ { "name": "milliseconds", "current_value": 20 } ] } } ] }),
        )
        .await;
        let entry = &response["service_results"][0];
        assert_eq!(entry["status_value"], 2);
        assert!(entry.get("linked_services").is_none());
        let uuid: String = entry["uuid"].as_str().unwrap().into();

        // The poll that observes the success fires the arc
        tokio::time::sleep(Duration::from_millis(60)).await;
        let poll = json!({ "operations": { "operation": "GET_SERVICE_RESULTS", "services": [ uuid ] } });
        let polled = crate::handler::handle(&ctx, poll.clone()).await;
        let entry = &polled["service_results"][0];
        assert_eq!(entry["status_value"], 5);
        let linked = entry["linked_services"].as_array().unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0]["service"], "delay");
        let params = linked[0]["param_set"]["params"].as_array().unwrap();
        assert!(params.iter().any(|param| param["name"] == "milliseconds" && param["current_value"] == 20));

        // A later poll sees the job already settled and must not re-emit the arc
        let again = crate::handler::handle(&ctx, poll).await;
        assert_eq!(again["service_results"], polled["service_results"]);
    }
}

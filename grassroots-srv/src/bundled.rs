//  BUNDLED.rs
//    by Lut99
//
//  Created:
//    27 Mar 2024, 09:31:17
//  Last edited:
//    04 Jul 2024, 11:31:50
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the bundled diagnostic services that every server
//!   ships: a synchronous `echo` service and an asynchronous-attached
//!   `delay` service. They give fresh deployments something to poke at
//!   and give the engine's own tests realistic services to run.
//

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grassroots_par::parameter::{Parameter, ParameterLevel};
use grassroots_par::set::ParameterSet;
use grassroots_par::value::{ParameterType, ParameterValue};
use grassroots_svc::errors::ServiceError;
use grassroots_svc::job::ServiceJob;
use grassroots_svc::jobset::ServiceJobSet;
use grassroots_svc::service::{Service, ServiceHandler, ServiceInfo, Synchronicity};
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use specifications::operations::OperationStatus;
use specifications::resource::{DataResource, PROTOCOL_INLINE, PROTOCOL_STRING};
use specifications::user::UserDetails;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::PluginError;
use crate::registry::ServicePlugin;


/***** CONSTANTS *****/
/// The name of the bundled plugin.
pub const PLUGIN_NAME: &str = "bundled";
/// The text parameter of the echo service.
pub const ECHO_TEXT_PARAM: &str = "text";
/// The duration parameter of the delay service.
pub const DELAY_MS_PARAM: &str = "milliseconds";





/***** HELPER FUNCTIONS *****/
/// Builds the echo service around the given name and description.
fn echo_service(name: impl Into<String>, description: impl Into<String>) -> Service {
    let name: String = name.into();
    Service::new(ServiceInfo::new(name.clone(), description), PLUGIN_NAME, Value::Null, Arc::new(EchoHandler { name }))
}





/***** LIBRARY *****/
/// The handler of the `echo` service: returns its text parameter as its result.
pub struct EchoHandler {
    /// The name this instance of the service was registered under.
    name: String,
}

#[async_trait]
impl ServiceHandler for EchoHandler {
    fn parameters(&self, _user: Option<&UserDetails>) -> Result<ParameterSet, ServiceError> {
        let mut set: ParameterSet = ParameterSet::new();
        set.add_parameter(
            Parameter::new(ParameterType::String, ECHO_TEXT_PARAM, "Text", "The text to echo back", ParameterLevel::Basic).with_keyword(),
        )
        .map_err(|err| ServiceError::Parameter { name: Some(ECHO_TEXT_PARAM.into()), err })?;
        Ok(set)
    }

    fn match_resource(&self, resource: &DataResource, user: Option<&UserDetails>) -> Result<Option<ParameterSet>, ServiceError> {
        // Anything carried in the request itself can be echoed
        if resource.protocol != PROTOCOL_INLINE && resource.protocol != PROTOCOL_STRING {
            return Ok(None);
        }
        let mut params: ParameterSet = self.parameters(user)?;
        params
            .set_current(ECHO_TEXT_PARAM, Some(ParameterValue::String(resource.value.clone())))
            .map_err(|err| ServiceError::Parameter { name: Some(ECHO_TEXT_PARAM.into()), err })?;
        Ok(Some(params))
    }

    async fn run(&self, params: &ParameterSet, _user: Option<&UserDetails>, _cancel: CancellationToken) -> Result<ServiceJobSet, ServiceError> {
        let text: String = match params.get(ECHO_TEXT_PARAM).and_then(|param| param.effective_value()) {
            Some(value) => value.to_string(),
            None => String::new(),
        };

        let mut jobset: ServiceJobSet = ServiceJobSet::with_job(self.name.clone(), self.name.clone(), None);
        for job in jobset.jobs_mut() {
            job.add_result(json!({ ECHO_TEXT_PARAM: text }));
            job.set_status(OperationStatus::Succeeded);
        }
        Ok(jobset)
    }
}



/// What one background delay task left behind for the poller.
enum DelayOutcome {
    /// The delay ran its course.
    Done(Vec<Value>),
    /// The service was released before the delay ran out.
    Cancelled,
}

/// The handler of the `delay` service: completes a job in the background after a configurable
/// duration. Asynchronous-attached, so the whole run is serialised through the service's sync
/// primitive.
#[derive(Default)]
pub struct DelayHandler {
    /// What the background tasks have finished, by job uuid.
    outcomes: Arc<Mutex<HashMap<Uuid, DelayOutcome>>>,
}

#[async_trait]
impl ServiceHandler for DelayHandler {
    fn parameters(&self, _user: Option<&UserDetails>) -> Result<ParameterSet, ServiceError> {
        let mut param: Parameter =
            Parameter::new(ParameterType::UnsignedInt, DELAY_MS_PARAM, "Delay", "How long to wait, in milliseconds", ParameterLevel::Basic);
        param
            .set_bounds(Some(ParameterValue::UnsignedInt(1)), Some(ParameterValue::UnsignedInt(60_000)))
            .and_then(|_| param.set_default(Some(ParameterValue::UnsignedInt(50))))
            .map_err(|err| ServiceError::Parameter { name: Some(DELAY_MS_PARAM.into()), err })?;

        let mut set: ParameterSet = ParameterSet::new();
        set.add_parameter(param).map_err(|err| ServiceError::Parameter { name: Some(DELAY_MS_PARAM.into()), err })?;
        Ok(set)
    }

    async fn run(&self, params: &ParameterSet, _user: Option<&UserDetails>, cancel: CancellationToken) -> Result<ServiceJobSet, ServiceError> {
        let millis: u64 = match params.get(DELAY_MS_PARAM).and_then(|param| param.effective_value()) {
            Some(ParameterValue::UnsignedInt(millis)) => *millis,
            _ => 50,
        };

        let mut jobset: ServiceJobSet = ServiceJobSet::with_job("delay", format!("delay {millis}ms"), None);
        for job in jobset.jobs_mut() {
            job.set_status(OperationStatus::Started);

            let uuid: Uuid = job.uuid();
            let outcomes: Arc<Mutex<HashMap<Uuid, DelayOutcome>>> = Arc::clone(&self.outcomes);
            let cancel: CancellationToken = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(millis)) => {
                        debug!("Delay job '{uuid}' ran its course");
                        outcomes.lock().insert(uuid, DelayOutcome::Done(vec![json!({ "slept_ms": millis })]));
                    },
                    _ = cancel.cancelled() => {
                        warn!("Delay job '{uuid}' cancelled before completion");
                        outcomes.lock().insert(uuid, DelayOutcome::Cancelled);
                    },
                }
            });
        }
        Ok(jobset)
    }

    async fn update_job(&self, job: &mut ServiceJob) -> Result<(), ServiceError> {
        match self.outcomes.lock().get(&job.uuid()) {
            Some(DelayOutcome::Done(results)) => {
                job.set_results(results.clone());
                job.set_status(OperationStatus::Succeeded);
            },
            Some(DelayOutcome::Cancelled) => {
                job.add_general_error("The service was released before the delay ran out");
                job.set_status(OperationStatus::Error);
            },
            None => {},
        }
        Ok(())
    }
}



/// The plugin that carries the bundled services.
pub struct BundledPlugin;

impl ServicePlugin for BundledPlugin {
    fn name(&self) -> &str { PLUGIN_NAME }

    fn get_services(&self) -> Result<Vec<Service>, PluginError> {
        let mut delay_info: ServiceInfo = ServiceInfo::new("delay", "Completes a job in the background after a configurable duration");
        delay_info.synchronicity = Synchronicity::AsynchronousAttached;

        Ok(vec![
            echo_service("echo", "Echoes its text parameter back as a result"),
            Service::new(delay_info, PLUGIN_NAME, Value::Null, Arc::new(DelayHandler::default())),
        ])
    }

    fn get_reference_services(&self, stub: &Value) -> Result<Vec<Service>, PluginError> {
        let operations: &Vec<Value> = stub
            .get("operations")
            .and_then(Value::as_array)
            .ok_or(PluginError::IllegalStub { plugin: PLUGIN_NAME.into(), field: "operations" })?;

        let mut services: Vec<Service> = Vec::with_capacity(operations.len());
        for operation in operations {
            let name: &str =
                operation.get("name").and_then(Value::as_str).ok_or(PluginError::IllegalStub { plugin: PLUGIN_NAME.into(), field: "name" })?;
            let description: &str = operation.get("description").and_then(Value::as_str).unwrap_or("A reference echo service");
            services.push(echo_service(name, description));
        }
        Ok(services)
    }
}

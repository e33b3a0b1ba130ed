//  SERVICE.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 15:02:19
//  Last edited:
//    03 Jul 2024, 11:22:46
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`Service`] itself: a named unit of work exposing a
//!   parameter schema and a run operation through its capability
//!   [`ServiceHandler`], plus the configuration, paired- and
//!   linked-service declarations and live job set that come with it.
//

use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use enum_debug::EnumDebug;
use grassroots_par::parameter::ParameterDecoder;
use grassroots_par::set::ParameterSet;
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Map, Value};
use specifications::provider::Provider;
use specifications::resource::DataResource;
use specifications::user::UserDetails;
use tokio_util::sync::CancellationToken;

use crate::errors::{ServiceError, SynchronicityParseError};
use crate::job::ServiceJob;
use crate::jobset::ServiceJobSet;
use crate::linked::LinkedService;
use crate::paired::PairedService;
use crate::sync::ServiceSync;


/***** CONSTANTS *****/
/// The key under which a descriptor's service name is stored.
pub const SERVICE_NAME_KEY: &str = "service_name";
/// The key under which a descriptor's description is stored.
pub const SERVICE_DESCRIPTION_KEY: &str = "description";
/// The key under which a descriptor's alias is stored.
pub const SERVICE_ALIAS_KEY: &str = "alias";
/// The key under which a descriptor's info uri is stored.
pub const SERVICE_ABOUT_URI_KEY: &str = "about_uri";
/// The key under which a descriptor's icon uri is stored.
pub const SERVICE_ICON_URI_KEY: &str = "icon_uri";
/// The key under which a descriptor's synchronicity is stored.
pub const SERVICE_SYNCHRONICITY_KEY: &str = "synchronicity";
/// The key under which a descriptor's provider is stored.
pub const SERVICE_PROVIDER_KEY: &str = "provider";
/// The key under which a descriptor's operation block is stored.
pub const SERVICE_OPERATION_KEY: &str = "operation";
/// The key under which an operation block's parameter set is stored.
pub const SERVICE_PARAMETER_SET_KEY: &str = "parameter_set";





/***** AUXILLARY *****/
/// How a service relates to the request that runs it.
#[derive(Clone, Copy, Debug, Default, EnumDebug, Eq, PartialEq)]
pub enum Synchronicity {
    /// The run callback completes the work before returning.
    #[default]
    Synchronous,
    /// The work continues in the background and may outlive the service instance.
    AsynchronousDetached,
    /// The work continues in the background within the service instance, which stays alive
    /// until its last job goes terminal.
    AsynchronousAttached,
}

impl Synchronicity {
    /// Whether services of this synchronicity are guarded by a [`ServiceSync`].
    #[inline]
    pub const fn is_lockable(&self) -> bool { matches!(self, Self::AsynchronousAttached) }
}

impl Display for Synchronicity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Synchronicity::*;
        match self {
            Synchronous => write!(f, "synchronous"),
            AsynchronousDetached => write!(f, "asynchronous_detached"),
            AsynchronousAttached => write!(f, "asynchronous_attached"),
        }
    }
}
impl FromStr for Synchronicity {
    type Err = SynchronicityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synchronous" => Ok(Self::Synchronous),
            "asynchronous_detached" => Ok(Self::AsynchronousDetached),
            "asynchronous_attached" => Ok(Self::AsynchronousAttached),
            raw => Err(SynchronicityParseError::UnknownSynchronicity { raw: raw.into() }),
        }
    }
}



/// The static description of one service.
#[derive(Clone, Debug)]
pub struct ServiceInfo {
    /// The unique name of the service.
    pub name: String,
    /// What the service does.
    pub description: String,
    /// An optional alternative name the service also answers to.
    pub alias: Option<String>,
    /// An optional uri with more information about the service.
    pub about_uri: Option<String>,
    /// An optional uri to an icon for the service.
    pub icon_uri: Option<String>,
    /// How the service relates to the request that runs it.
    pub synchronicity: Synchronicity,
    /// Whether the service is specific to one task (as opposed to a generic search surface).
    pub specific: bool,
}

impl ServiceInfo {
    /// Constructor for the ServiceInfo.
    ///
    /// # Arguments
    /// - `name`: The unique name of the service.
    /// - `description`: What the service does.
    ///
    /// # Returns
    /// A new, synchronous, non-specific ServiceInfo without uris.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), alias: None, about_uri: None, icon_uri: None, synchronicity: Synchronicity::default(), specific: false }
    }
}



/// The capability interface every service implements.
///
/// Only [`ServiceHandler::parameters`] and [`ServiceHandler::run`] are mandatory; everything
/// else has a sensible nothing-doing default so that simple services stay simple.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Returns the parameter schema of this service, defaults filled in.
    ///
    /// # Arguments
    /// - `user`: The credentials of the requesting user, if any.
    ///
    /// # Errors
    /// This function errors if the schema could not be built (e.g., options need a backing
    /// store that is unreachable).
    fn parameters(&self, user: Option<&UserDetails>) -> Result<ParameterSet, ServiceError>;

    /// Examines a data resource and, if this service can consume it, returns a parameter set
    /// pre-populated for it.
    ///
    /// # Arguments
    /// - `resource`: The resource to examine.
    /// - `user`: The credentials of the requesting user, if any.
    ///
    /// # Returns
    /// The pre-populated set, or [`None`] if the service is not interested.
    fn match_resource(&self, _resource: &DataResource, _user: Option<&UserDetails>) -> Result<Option<ParameterSet>, ServiceError> { Ok(None) }

    /// Runs this service with the given parameters.
    ///
    /// Synchronous services complete their jobs before returning; asynchronous ones return
    /// with jobs in [`OperationStatus::Pending`](specifications::operations::OperationStatus)
    /// or `Started` and finish them in the background.
    ///
    /// # Arguments
    /// - `params`: The validated parameter set to run with.
    /// - `user`: The credentials of the requesting user, if any.
    /// - `cancel`: A token flagged when the service is released; background work should
    ///   observe it and move its jobs to `Error` when flagged.
    ///
    /// # Returns
    /// The set of jobs this run created.
    ///
    /// # Errors
    /// This function errors if the run failed before any job could be created.
    async fn run(&self, params: &ParameterSet, user: Option<&UserDetails>, cancel: CancellationToken) -> Result<ServiceJobSet, ServiceError>;

    /// Brings a job of this service up to date (e.g., polls the backing queue).
    async fn update_job(&self, _job: &mut ServiceJob) -> Result<(), ServiceError> { Ok(()) }

    /// Fills in the results of a job that reached a success status without them.
    fn calculate_results(&self, _job: &mut ServiceJob) -> Result<(), ServiceError> { Ok(()) }

    /// Gives the service a chance to decorate a freshly created job (urls, metadata).
    fn customise_job(&self, _job: &mut ServiceJob) {}

    /// Serialises a job in a service-specific shape, if this service has one.
    ///
    /// # Returns
    /// [`None`] to use the standard shape.
    fn serialise_job(&self, _job: &ServiceJob) -> Option<Value> { None }

    /// Deserialises a job from a service-specific shape, if this service has one.
    ///
    /// # Returns
    /// [`None`] to use the standard decoder.
    fn deserialise_job(&self, _json: &Value) -> Option<Result<ServiceJob, ServiceError>> { None }

    /// Generates the follow-on request of a linked-service arc that declares a custom
    /// generator.
    ///
    /// # Arguments
    /// - `linked`: The arc being processed; its `generator` names the routine to use.
    /// - `job`: The succeeded job whose results feed the arc.
    ///
    /// # Returns
    /// [`None`] if the named generator is unknown to this service, or the generated run
    /// request (or its error).
    fn process_linked_service(&self, _linked: &LinkedService, _job: &ServiceJob) -> Option<Result<Value, ServiceError>> { None }

    /// Returns service-defined metadata for descriptors.
    fn metadata(&self) -> Option<Value> { None }

    /// Returns the service's indexing-data shape (see GET_SERVICE_INFO).
    fn indexing_data(&self) -> Option<Value> { None }

    /// Returns the service's custom parameter decoder, if it has one.
    fn parameter_decoder(&self) -> Option<&dyn ParameterDecoder> { None }

    /// Winds the service down. Called once, when the service is released.
    async fn close(&self) -> Result<(), ServiceError> { Ok(()) }
}





/***** LIBRARY *****/
/// A named unit of work exposing a parameter schema and a run operation.
///
/// The service owns its live job set; jobs keep only the service's name. The jobs manager, in
/// turn, holds jobs by (serialised) value, so nothing here is referenced from outside the
/// service's lifetime.
pub struct Service {
    /// The static description of this service.
    info: ServiceInfo,
    /// The name of the plugin that created this service.
    plugin: String,
    /// The service-specific configuration block.
    config: Value,
    /// The capability handler implementing the actual work.
    handler: Arc<dyn ServiceHandler>,
    /// The paired twins of this service on remote servers.
    paired: Vec<PairedService>,
    /// The linked-service arcs declared by this service.
    linked: Vec<LinkedService>,
    /// The live job set of this service.
    jobs: Mutex<ServiceJobSet>,
    /// The sync primitive, present iff the service is lockable.
    sync: Option<Arc<ServiceSync>>,
}

impl Service {
    /// Constructor for the Service.
    ///
    /// # Arguments
    /// - `info`: The static description of the service.
    /// - `plugin`: The name of the plugin creating it.
    /// - `config`: The service-specific configuration block ([`Value::Null`] if there is none).
    /// - `handler`: The capability handler implementing the actual work.
    ///
    /// # Returns
    /// A new Service with an empty job set; lockable services get a fresh [`ServiceSync`].
    pub fn new(info: ServiceInfo, plugin: impl Into<String>, config: Value, handler: Arc<dyn ServiceHandler>) -> Self {
        let jobs: Mutex<ServiceJobSet> = Mutex::new(ServiceJobSet::new(info.name.clone()));
        let sync: Option<Arc<ServiceSync>> = info.synchronicity.is_lockable().then(|| Arc::new(ServiceSync::new()));
        Self { info, plugin: plugin.into(), config, handler, paired: vec![], linked: vec![], jobs, sync }
    }

    /// The static description of this service.
    #[inline]
    pub fn info(&self) -> &ServiceInfo { &self.info }

    /// The unique name of this service.
    #[inline]
    pub fn name(&self) -> &str { &self.info.name }

    /// The name of the plugin that created this service.
    #[inline]
    pub fn plugin(&self) -> &str { &self.plugin }

    /// The service-specific configuration block.
    #[inline]
    pub fn config(&self) -> &Value { &self.config }

    /// The capability handler implementing the actual work.
    #[inline]
    pub fn handler(&self) -> &Arc<dyn ServiceHandler> { &self.handler }

    /// The paired twins of this service on remote servers.
    #[inline]
    pub fn paired(&self) -> &[PairedService] { &self.paired }

    /// Registers a paired twin of this service.
    #[inline]
    pub fn add_paired(&mut self, paired: PairedService) {
        debug!("Service '{}' paired with '{}' at '{}'", self.info.name, paired.service_name, paired.uri);
        self.paired.push(paired);
    }

    /// The linked-service arcs declared by this service.
    #[inline]
    pub fn linked(&self) -> &[LinkedService] { &self.linked }

    /// Replaces the linked-service arcs of this service.
    #[inline]
    pub fn set_linked(&mut self, linked: Vec<LinkedService>) { self.linked = linked; }

    /// Whether this service answers to the given name or alias.
    #[inline]
    pub fn answers_to(&self, name: &str) -> bool { self.info.name == name || self.info.alias.as_deref() == Some(name) }

    /// Whether this service is guarded by a [`ServiceSync`].
    #[inline]
    pub fn is_lockable(&self) -> bool { self.sync.is_some() }

    /// The sync primitive of this (lockable) service, if any.
    #[inline]
    pub fn sync(&self) -> Option<&Arc<ServiceSync>> { self.sync.as_ref() }

    /// The cancellation token background work of this service should observe.
    ///
    /// Non-lockable services get a fresh, never-flagged token.
    #[inline]
    pub fn cancellation_token(&self) -> CancellationToken { self.sync.as_ref().map(|sync| sync.cancellation_token()).unwrap_or_default() }

    /// Locks and returns the live job set of this service.
    ///
    /// This is the in-process lock only; lockable services additionally serialise whole runs
    /// through [`Service::sync`].
    #[inline]
    pub fn jobs(&self) -> MutexGuard<'_, ServiceJobSet> { self.jobs.lock() }

    /// Moves all jobs of the given set into this service's live set.
    #[inline]
    pub fn merge_jobs(&self, set: ServiceJobSet) { self.jobs.lock().merge(set); }

    /// Whether this service currently has live (pending or started) jobs.
    #[inline]
    pub fn is_live(&self) -> bool { self.jobs.lock().is_live() }

    /// Winds this service down: flags its background work to cancel and closes the handler.
    ///
    /// # Errors
    /// This function errors if the handler's close routine fails.
    pub async fn release(&self) -> Result<(), ServiceError> {
        if let Some(sync) = &self.sync {
            sync.cancel();
        }
        self.handler.close().await
    }

    /// Serialises this service into the descriptor shape used by LIST_ALL_SERVICES et al.
    ///
    /// # Arguments
    /// - `provider`: The provider to attribute the service to, if any.
    /// - `params`: The parameter schema to embed (obtained via the handler, with the
    ///   requesting user's credentials).
    ///
    /// # Returns
    /// The descriptor as a JSON object.
    pub fn descriptor(&self, provider: Option<&Provider>, params: &ParameterSet) -> Value {
        let mut obj: Map<String, Value> = Map::new();
        obj.insert(SERVICE_NAME_KEY.into(), Value::String(self.info.name.clone()));
        obj.insert(SERVICE_DESCRIPTION_KEY.into(), Value::String(self.info.description.clone()));
        if let Some(alias) = &self.info.alias {
            obj.insert(SERVICE_ALIAS_KEY.into(), Value::String(alias.clone()));
        }
        if let Some(about_uri) = &self.info.about_uri {
            obj.insert(SERVICE_ABOUT_URI_KEY.into(), Value::String(about_uri.clone()));
        }
        if let Some(icon_uri) = &self.info.icon_uri {
            obj.insert(SERVICE_ICON_URI_KEY.into(), Value::String(icon_uri.clone()));
        }
        obj.insert(SERVICE_SYNCHRONICITY_KEY.into(), Value::String(self.info.synchronicity.to_string()));
        if let Some(provider) = provider {
            obj.insert(SERVICE_PROVIDER_KEY.into(), provider.to_json());
        }
        if let Some(metadata) = self.handler.metadata() {
            obj.insert(crate::job::JOB_METADATA_KEY.into(), metadata);
        }
        obj.insert(SERVICE_OPERATION_KEY.into(), json!({ SERVICE_PARAMETER_SET_KEY: params.to_json(false) }));
        Value::Object(obj)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        f.debug_struct("Service")
            .field("info", &self.info)
            .field("plugin", &self.plugin)
            .field("paired", &self.paired)
            .field("linked", &self.linked)
            .finish_non_exhaustive()
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use grassroots_par::parameter::{Parameter, ParameterLevel};
    use grassroots_par::value::ParameterType;

    use super::*;

    struct NopHandler;
    #[async_trait]
    impl ServiceHandler for NopHandler {
        fn parameters(&self, _user: Option<&UserDetails>) -> Result<ParameterSet, ServiceError> {
            let mut set = ParameterSet::new();
            set.add_parameter(Parameter::new(ParameterType::String, "text", "Text", "", ParameterLevel::Basic))
                .map_err(|err| ServiceError::Parameter { name: Some("text".into()), err })?;
            Ok(set)
        }

        async fn run(&self, _params: &ParameterSet, _user: Option<&UserDetails>, _cancel: CancellationToken) -> Result<ServiceJobSet, ServiceError> {
            Ok(ServiceJobSet::new("nop"))
        }
    }

    #[test]
    fn lockability_follows_synchronicity() {
        let mut info = ServiceInfo::new("nop", "Does nothing");
        let service = Service::new(info.clone(), "test", Value::Null, Arc::new(NopHandler));
        assert!(!service.is_lockable());

        info.synchronicity = Synchronicity::AsynchronousAttached;
        let service = Service::new(info, "test", Value::Null, Arc::new(NopHandler));
        assert!(service.is_lockable());
    }

    #[test]
    fn answers_to_name_and_alias() {
        let mut info = ServiceInfo::new("blast", "Searches");
        info.alias = Some("blastn".into());
        let service = Service::new(info, "test", Value::Null, Arc::new(NopHandler));
        assert!(service.answers_to("blast"));
        assert!(service.answers_to("blastn"));
        assert!(!service.answers_to("blastp"));
    }

    #[test]
    fn descriptor_carries_schema_and_provider() {
        let service = Service::new(ServiceInfo::new("nop", "Does nothing"), "test", Value::Null, Arc::new(NopHandler));
        let provider = Provider { name: "EI".into(), uri: "https://grassroots.tools".into(), description: "".into(), logo: None };
        let params = service.handler().parameters(None).unwrap();

        let descriptor = service.descriptor(Some(&provider), &params);
        assert_eq!(descriptor[SERVICE_NAME_KEY], "nop");
        assert_eq!(descriptor[SERVICE_PROVIDER_KEY]["name"], "EI");
        assert_eq!(descriptor[SERVICE_OPERATION_KEY][SERVICE_PARAMETER_SET_KEY]["params"][0]["name"], "text");
    }
}

//  JOB.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 09:30:02
//  Last edited:
//    03 Jul 2024, 10:05:37
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ServiceJob`]: one execution instance of a service,
//!   uniquely identified by a uuid, moving through the
//!   [`OperationStatus`] state machine and carrying its results,
//!   errors and linked-service follow-ups.
//

use std::collections::BTreeMap;
use std::str::FromStr;

use grassroots_par::value::ParameterType;
use log::{debug, warn};
use serde_json::{Map, Value};
use specifications::operations::OperationStatus;
use uuid::Uuid;

use crate::errors::{JobError, ServiceError};
use crate::remote::RemoteDetails;
use crate::service::ServiceHandler;


/***** CONSTANTS *****/
/// The job type of a plain, locally created job.
pub const DEFAULT_JOB_TYPE: &str = "default_service_job";
/// The job type of a job that mirrors work on a paired server.
pub const REMOTE_JOB_TYPE: &str = "remote_service_job";

/// The reserved errors key under which runtime (non-parameter) errors are collected.
pub const GENERAL_ERRORS_KEY: &str = "general";

/// The key under which the owning service's name is stored.
pub const JOB_SERVICE_KEY: &str = "service";
/// The key under which the job type is stored.
pub const JOB_TYPE_KEY: &str = "job_type";
/// The key under which the job's uuid is stored.
pub const JOB_UUID_KEY: &str = "uuid";
/// The key under which the job's name is stored.
pub const JOB_NAME_KEY: &str = "name";
/// The key under which the job's description is stored.
pub const JOB_DESCRIPTION_KEY: &str = "description";
/// The key under which the job's url is stored.
pub const JOB_URL_KEY: &str = "url";
/// The key under which the job's status (text form) is stored.
pub const JOB_STATUS_KEY: &str = "status";
/// The key under which the job's status (integer form) is stored.
pub const JOB_STATUS_VALUE_KEY: &str = "status_value";
/// The legacy key under which some clients expect the text form.
pub const JOB_STATUS_TEXT_KEY: &str = "status_text";
/// The key under which the job's errors are stored.
pub const JOB_ERRORS_KEY: &str = "errors";
/// The key under which the job's metadata is stored.
pub const JOB_METADATA_KEY: &str = "metadata";
/// The key under which the job's results are stored.
pub const JOB_RESULTS_KEY: &str = "results";
/// The key flagging that results exist but were left out of this serialisation.
pub const JOB_RESULTS_OMITTED_KEY: &str = "results_omitted";
/// The key under which the job's generated linked-service requests are stored.
pub const JOB_LINKED_SERVICES_KEY: &str = "linked_services";
/// The key under which an error entry's parameter type is stored.
pub const ERROR_TYPE_KEY: &str = "grassroots_type";
/// The key under which an error entry's messages are stored.
pub const ERROR_LIST_KEY: &str = "errors";





/***** AUXILLARY *****/
/// The errors recorded against one parameter (or against the job as a whole, under
/// [`GENERAL_ERRORS_KEY`]).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobErrorEntry {
    /// The type of the offending parameter, absent for general errors.
    pub kind: Option<ParameterType>,
    /// The error messages themselves.
    pub errors: Vec<String>,
}

impl JobErrorEntry {
    /// Serialises this entry into its wire shape.
    pub fn to_json(&self) -> Value {
        let mut obj: Map<String, Value> = Map::new();
        if let Some(kind) = self.kind {
            obj.insert(ERROR_TYPE_KEY.into(), Value::String(kind.to_string()));
        }
        obj.insert(ERROR_LIST_KEY.into(), Value::Array(self.errors.iter().map(|msg| Value::String(msg.clone())).collect()));
        Value::Object(obj)
    }

    /// Deserialises an entry from its wire shape. Unknown shapes yield an empty entry rather
    /// than an error, since error blobs are advisory.
    pub fn from_json(value: &Value) -> Self {
        let kind: Option<ParameterType> = value.get(ERROR_TYPE_KEY).and_then(Value::as_str).and_then(|raw| ParameterType::from_str(raw).ok());
        let errors: Vec<String> = value
            .get(ERROR_LIST_KEY)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        Self { kind, errors }
    }
}





/***** LIBRARY *****/
/// One execution instance of a service.
///
/// A job is owned by exactly one service; it keeps that service's _name_ (rather than a
/// reference) so that it can be rehydrated across process boundaries. Its uuid is stable for
/// its whole lifetime, including serialisation round-trips.
#[derive(Clone, Debug)]
pub struct ServiceJob {
    /// The stable identity of this job.
    uuid: Uuid,
    /// The name of the owning service, for rehydration.
    service_name: String,
    /// The human-readable name of this job.
    name: String,
    /// An optional longer description.
    description: Option<String>,
    /// An optional url where progress or results can be inspected out-of-band.
    url: Option<String>,
    /// Where the job is in its lifecycle.
    status: OperationStatus,
    /// The results, absent until the job reaches a success status and they are calculated.
    results: Option<Vec<Value>>,
    /// Service-defined metadata.
    metadata: Option<Value>,
    /// The errors recorded against this job, keyed by parameter name or [`GENERAL_ERRORS_KEY`].
    errors: BTreeMap<String, JobErrorEntry>,
    /// The follow-on run requests generated by the linked-service engine.
    linked_services: Vec<Value>,
    /// The type tag of this job (e.g. [`DEFAULT_JOB_TYPE`]).
    job_type: String,
    /// The remote bookkeeping, present iff this job mirrors work on a paired server.
    remote: Option<RemoteDetails>,
    /// Reentrancy guard for [`ServiceJob::update`].
    updating: bool,
}

impl ServiceJob {
    /// Constructor for the ServiceJob.
    ///
    /// # Arguments
    /// - `service_name`: The name of the owning service.
    /// - `name`: The human-readable name of the job.
    /// - `description`: An optional longer description.
    ///
    /// # Returns
    /// A new, idle ServiceJob with a fresh uuid.
    pub fn new(service_name: impl Into<String>, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            service_name: service_name.into(),
            name: name.into(),
            description,
            url: None,
            status: OperationStatus::Idle,
            results: None,
            metadata: None,
            errors: BTreeMap::new(),
            linked_services: vec![],
            job_type: DEFAULT_JOB_TYPE.into(),
            remote: None,
            updating: false,
        }
    }

    /// Constructor for a ServiceJob that mirrors work on a paired server.
    ///
    /// # Arguments
    /// - `service_name`: The name of the _local_ service owning the mirror.
    /// - `name`: The human-readable name of the job.
    /// - `remote`: The bookkeeping of the remote job being mirrored.
    /// - `status`: The status the remote job was last seen in.
    ///
    /// # Returns
    /// A new ServiceJob of type [`REMOTE_JOB_TYPE`].
    pub fn new_remote(service_name: impl Into<String>, name: impl Into<String>, remote: RemoteDetails, status: OperationStatus) -> Self {
        let mut job: Self = Self::new(service_name, name, None);
        job.job_type = REMOTE_JOB_TYPE.into();
        job.status = status;
        job.remote = Some(remote);
        job
    }



    /// The stable identity of this job.
    #[inline]
    pub fn uuid(&self) -> Uuid { self.uuid }

    /// The name of the owning service.
    #[inline]
    pub fn service_name(&self) -> &str { &self.service_name }

    /// The human-readable name of this job.
    #[inline]
    pub fn name(&self) -> &str { &self.name }

    /// Where the job is in its lifecycle.
    #[inline]
    pub fn status(&self) -> OperationStatus { self.status }

    /// Moves the job to the given status.
    #[inline]
    pub fn set_status(&mut self, status: OperationStatus) {
        debug!("Job '{}' ({}) moves {} -> {}", self.name, self.uuid, self.status, status);
        self.status = status;
    }

    /// The type tag of this job.
    #[inline]
    pub fn job_type(&self) -> &str { &self.job_type }

    /// The remote bookkeeping, present iff this job mirrors work on a paired server.
    #[inline]
    pub fn remote(&self) -> Option<&RemoteDetails> { self.remote.as_ref() }

    /// Whether this job mirrors work on a paired server.
    #[inline]
    pub fn is_remote(&self) -> bool { self.remote.is_some() }

    /// The results of this job, if already present.
    #[inline]
    pub fn results(&self) -> Option<&[Value]> { self.results.as_deref() }

    /// Replaces the results of this job.
    #[inline]
    pub fn set_results(&mut self, results: Vec<Value>) { self.results = Some(results); }

    /// Appends one result entry, creating the results array if needed.
    #[inline]
    pub fn add_result(&mut self, result: Value) { self.results.get_or_insert_with(Vec::new).push(result); }

    /// The url where progress or results can be inspected out-of-band, if any.
    #[inline]
    pub fn url(&self) -> Option<&str> { self.url.as_deref() }

    /// Sets the out-of-band url.
    #[inline]
    pub fn set_url(&mut self, url: impl Into<String>) { self.url = Some(url.into()); }

    /// Service-defined metadata, if any.
    #[inline]
    pub fn metadata(&self) -> Option<&Value> { self.metadata.as_ref() }

    /// Replaces the service-defined metadata.
    #[inline]
    pub fn set_metadata(&mut self, metadata: Value) { self.metadata = Some(metadata); }

    /// The errors recorded against this job.
    #[inline]
    pub fn errors(&self) -> &BTreeMap<String, JobErrorEntry> { &self.errors }

    /// Whether any error has been recorded against this job.
    #[inline]
    pub fn has_errors(&self) -> bool { !self.errors.is_empty() }

    /// The follow-on run requests generated by the linked-service engine.
    #[inline]
    pub fn linked_services(&self) -> &[Value] { &self.linked_services }

    /// Appends a follow-on run request generated by the linked-service engine.
    #[inline]
    pub fn add_linked_service(&mut self, request: Value) { self.linked_services.push(request); }



    /// Records a runtime error against this job, under [`GENERAL_ERRORS_KEY`].
    ///
    /// # Arguments
    /// - `message`: The error message to record.
    pub fn add_general_error(&mut self, message: impl Into<String>) {
        self.errors.entry(GENERAL_ERRORS_KEY.into()).or_default().errors.push(message.into());
    }

    /// Records an error against one parameter of this job.
    ///
    /// # Arguments
    /// - `name`: The name of the offending parameter.
    /// - `kind`: The type of the offending parameter.
    /// - `message`: The error message to record.
    pub fn add_parameter_error(&mut self, name: impl Into<String>, kind: ParameterType, message: impl Into<String>) {
        let entry: &mut JobErrorEntry = self.errors.entry(name.into()).or_default();
        entry.kind = Some(kind);
        entry.errors.push(message.into());
    }



    /// Brings this job up to date by calling back into the owning service.
    ///
    /// The update callback runs when the status is non-terminal, or when results are missing
    /// on a success status; after it, the first observation of a success status with empty
    /// results triggers the service's result calculation. A failed calculation does _not_
    /// change the status; it is recorded under [`GENERAL_ERRORS_KEY`].
    ///
    /// The whole routine is guarded against reentrancy through linked-service chains: a nested
    /// call is a no-op.
    ///
    /// # Arguments
    /// - `handler`: The capability handler of the owning service.
    ///
    /// # Errors
    /// This function errors if the service's update callback itself fails.
    pub async fn update(&mut self, handler: &dyn ServiceHandler) -> Result<(), ServiceError> {
        if self.updating {
            debug!("Ignoring reentrant update of job '{}'", self.uuid);
            return Ok(());
        }
        self.updating = true;

        let result: Result<(), ServiceError> = async {
            if !self.status.is_terminal() || (self.status.is_success() && self.results.is_none()) {
                handler.update_job(self).await?;
            }
            if self.status.is_success() && self.results.is_none() {
                if let Err(err) = handler.calculate_results(self) {
                    warn!("Failed to calculate results for job '{}': {}", self.uuid, err);
                    self.add_general_error(err.to_string());
                }
            }
            Ok(())
        }
        .await;

        self.updating = false;
        result
    }



    /// Serialises this job into its wire shape.
    ///
    /// # Arguments
    /// - `omit_results`: If true and results are present, they are replaced by a
    ///   `results_omitted: true` flag (the shape the jobs manager persists).
    pub fn to_json(&self, omit_results: bool) -> Value {
        let mut obj: Map<String, Value> = Map::new();
        obj.insert(JOB_SERVICE_KEY.into(), Value::String(self.service_name.clone()));
        obj.insert(JOB_TYPE_KEY.into(), Value::String(self.job_type.clone()));
        obj.insert(JOB_UUID_KEY.into(), Value::String(self.uuid.to_string()));
        obj.insert(JOB_NAME_KEY.into(), Value::String(self.name.clone()));
        if let Some(description) = &self.description {
            obj.insert(JOB_DESCRIPTION_KEY.into(), Value::String(description.clone()));
        }
        if let Some(url) = &self.url {
            obj.insert(JOB_URL_KEY.into(), Value::String(url.clone()));
        }
        obj.insert(JOB_STATUS_VALUE_KEY.into(), Value::from(self.status.value()));
        obj.insert(JOB_STATUS_KEY.into(), Value::String(self.status.to_string()));
        if !self.errors.is_empty() {
            obj.insert(JOB_ERRORS_KEY.into(), Value::Object(self.errors.iter().map(|(key, entry)| (key.clone(), entry.to_json())).collect()));
        }
        if let Some(metadata) = &self.metadata {
            obj.insert(JOB_METADATA_KEY.into(), metadata.clone());
        }
        match &self.results {
            Some(results) if omit_results => {
                debug!("Omitting {} result(s) from serialisation of job '{}'", results.len(), self.uuid);
                obj.insert(JOB_RESULTS_OMITTED_KEY.into(), Value::Bool(true));
            },
            Some(results) => {
                obj.insert(JOB_RESULTS_KEY.into(), Value::Array(results.clone()));
            },
            None => {},
        }
        if !self.linked_services.is_empty() {
            obj.insert(JOB_LINKED_SERVICES_KEY.into(), Value::Array(self.linked_services.clone()));
        }
        if let Some(remote) = &self.remote {
            remote.write_json(&mut obj);
        }
        Value::Object(obj)
    }

    /// Deserialises a job from its wire shape (the standard decoder).
    ///
    /// # Arguments
    /// - `json`: The JSON object to parse.
    ///
    /// # Errors
    /// This function errors if a mandatory field (`service`, `job_type`, `uuid`,
    /// `status_value`) is missing or malformed.
    pub fn from_json(json: &Value) -> Result<Self, JobError> {
        let obj: &Map<String, Value> = match json.as_object() {
            Some(obj) => obj,
            None => {
                return Err(JobError::NotAnObject { got: json.to_string() });
            },
        };

        let service_name: &str = obj.get(JOB_SERVICE_KEY).and_then(Value::as_str).ok_or(JobError::MissingField { field: JOB_SERVICE_KEY })?;
        let job_type: &str = obj.get(JOB_TYPE_KEY).and_then(Value::as_str).ok_or(JobError::MissingField { field: JOB_TYPE_KEY })?;
        let uuid_raw: &str = obj.get(JOB_UUID_KEY).and_then(Value::as_str).ok_or(JobError::MissingField { field: JOB_UUID_KEY })?;
        let uuid: Uuid = Uuid::from_str(uuid_raw).map_err(|err| JobError::IllegalUuid { raw: uuid_raw.into(), err })?;

        // The integer form is authoritative; the text form is only a fallback for old writers.
        let status: OperationStatus = match obj.get(JOB_STATUS_VALUE_KEY).and_then(Value::as_i64) {
            Some(value) => OperationStatus::from_value(value).map_err(|err| JobError::IllegalStatus { err })?,
            None => match obj.get(JOB_STATUS_KEY).or_else(|| obj.get(JOB_STATUS_TEXT_KEY)).and_then(Value::as_str) {
                Some(text) => OperationStatus::from_str(text).map_err(|err| JobError::IllegalStatus { err })?,
                None => {
                    return Err(JobError::MissingField { field: JOB_STATUS_VALUE_KEY });
                },
            },
        };

        let remote: Option<RemoteDetails> = if job_type == REMOTE_JOB_TYPE { Some(RemoteDetails::from_json(obj)?) } else { None };

        Ok(Self {
            uuid,
            service_name: service_name.into(),
            name: obj.get(JOB_NAME_KEY).and_then(Value::as_str).unwrap_or("").into(),
            description: obj.get(JOB_DESCRIPTION_KEY).and_then(Value::as_str).map(String::from),
            url: obj.get(JOB_URL_KEY).and_then(Value::as_str).map(String::from),
            status,
            results: obj.get(JOB_RESULTS_KEY).and_then(Value::as_array).cloned(),
            metadata: obj.get(JOB_METADATA_KEY).cloned(),
            errors: obj
                .get(JOB_ERRORS_KEY)
                .and_then(Value::as_object)
                .map(|errors| errors.iter().map(|(key, entry)| (key.clone(), JobErrorEntry::from_json(entry))).collect())
                .unwrap_or_default(),
            linked_services: obj.get(JOB_LINKED_SERVICES_KEY).and_then(Value::as_array).cloned().unwrap_or_default(),
            job_type: job_type.into(),
            remote,
            updating: false,
        })
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn uuid_is_stable_across_roundtrips() {
        let mut job = ServiceJob::new("blast", "blast search", Some("A search against the wheat db".into()));
        job.set_status(OperationStatus::Succeeded);
        job.set_results(vec![json!({ "hit": "traes_4AL" })]);

        let first: Value = job.to_json(false);
        let parsed = ServiceJob::from_json(&first).unwrap();
        assert_eq!(parsed.uuid(), job.uuid());
        assert_eq!(parsed.to_json(false), first);
    }

    #[test]
    fn mandatory_fields_are_mandatory() {
        assert!(matches!(ServiceJob::from_json(&json!([])), Err(JobError::NotAnObject { .. })));
        assert!(matches!(
            ServiceJob::from_json(&json!({ "job_type": "default_service_job", "uuid": "x", "status_value": 0 })),
            Err(JobError::MissingField { field: JOB_SERVICE_KEY })
        ));
        assert!(matches!(
            ServiceJob::from_json(&json!({ "service": "blast", "job_type": "default_service_job", "uuid": "not-a-uuid", "status_value": 0 })),
            Err(JobError::IllegalUuid { .. })
        ));
    }

    #[test]
    fn status_text_is_a_fallback() {
        let job = ServiceJob::from_json(&json!({
            "service": "blast", "job_type": "default_service_job",
            "uuid": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "status": "PARTIALLY_SUCCEEDED",
        }))
        .unwrap();
        assert_eq!(job.status(), OperationStatus::PartiallySucceeded);
    }

    #[test]
    fn results_can_be_omitted() {
        let mut job = ServiceJob::new("blast", "blast search", None);
        job.set_status(OperationStatus::Succeeded);
        job.set_results(vec![json!("hit")]);

        let json: Value = job.to_json(true);
        assert_eq!(json[JOB_RESULTS_OMITTED_KEY], true);
        assert!(json.get(JOB_RESULTS_KEY).is_none());

        // A rehydrated job has no results yet, so an update cycle can recalculate them
        let parsed = ServiceJob::from_json(&json).unwrap();
        assert!(parsed.results().is_none());
        assert_eq!(parsed.status(), OperationStatus::Succeeded);
    }

    #[test]
    fn errors_are_keyed_by_parameter() {
        let mut job = ServiceJob::new("blast", "blast search", None);
        job.add_parameter_error("limit", ParameterType::SignedInt, "Value 100 lies outside its bounds [1, 10]");
        job.add_general_error("The backing index is offline");

        let json: Value = job.to_json(false);
        assert_eq!(json[JOB_ERRORS_KEY]["limit"][ERROR_TYPE_KEY], "signed_int");
        assert!(json[JOB_ERRORS_KEY]["limit"][ERROR_LIST_KEY][0].as_str().unwrap().contains("bounds"));
        assert_eq!(json[JOB_ERRORS_KEY][GENERAL_ERRORS_KEY][ERROR_LIST_KEY][0], "The backing index is offline");

        let parsed = ServiceJob::from_json(&json).unwrap();
        assert_eq!(parsed.errors().len(), 2);
        assert_eq!(parsed.to_json(false), json);
    }
}

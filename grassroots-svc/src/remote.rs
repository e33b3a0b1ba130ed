//  REMOTE.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 11:21:44
//  Last edited:
//    21 Jun 2024, 16:40:09
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`RemoteDetails`] that turn a plain
//!   [`ServiceJob`](crate::job::ServiceJob) into a remote one: the
//!   bookkeeping needed to proxy later polls to the paired server that
//!   actually runs the work.
//

use std::str::FromStr;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::JobError;


/***** CONSTANTS *****/
/// The key under which the remote server's uri is stored.
pub const REMOTE_URI_KEY: &str = "remote_uri";
/// The key under which the remote service's name is stored.
pub const REMOTE_SERVICE_KEY: &str = "remote_service_name";
/// The key under which the remote job's uuid is stored.
pub const REMOTE_JOB_ID_KEY: &str = "remote_job_id";





/***** LIBRARY *****/
/// The bookkeeping of a job that lives on a paired server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteDetails {
    /// The uri of the paired server running the work.
    pub uri: String,
    /// The name of the service on the paired server.
    pub service_name: String,
    /// The uuid of the job _on the paired server_ (distinct from the local mirror's uuid).
    pub job_id: Uuid,
}

impl RemoteDetails {
    /// Constructor for the RemoteDetails.
    ///
    /// # Arguments
    /// - `uri`: The uri of the paired server.
    /// - `service_name`: The name of the service on the paired server.
    /// - `job_id`: The uuid of the job on the paired server.
    ///
    /// # Returns
    /// A new RemoteDetails instance.
    #[inline]
    pub fn new(uri: impl Into<String>, service_name: impl Into<String>, job_id: Uuid) -> Self {
        Self { uri: uri.into(), service_name: service_name.into(), job_id }
    }

    /// Writes the remote fields into a job's JSON object.
    ///
    /// # Arguments
    /// - `obj`: The job object being serialised.
    pub fn write_json(&self, obj: &mut Map<String, Value>) {
        obj.insert(REMOTE_URI_KEY.into(), Value::String(self.uri.clone()));
        obj.insert(REMOTE_SERVICE_KEY.into(), Value::String(self.service_name.clone()));
        obj.insert(REMOTE_JOB_ID_KEY.into(), Value::String(self.job_id.to_string()));
    }

    /// Reads the remote fields back from a job's JSON object.
    ///
    /// # Arguments
    /// - `obj`: The job object being deserialised.
    ///
    /// # Errors
    /// This function errors if any of the three remote fields is missing or malformed.
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, JobError> {
        let uri: &str = obj.get(REMOTE_URI_KEY).and_then(Value::as_str).ok_or(JobError::IllegalRemote { field: REMOTE_URI_KEY })?;
        let service_name: &str = obj.get(REMOTE_SERVICE_KEY).and_then(Value::as_str).ok_or(JobError::IllegalRemote { field: REMOTE_SERVICE_KEY })?;
        let job_id_raw: &str = obj.get(REMOTE_JOB_ID_KEY).and_then(Value::as_str).ok_or(JobError::IllegalRemote { field: REMOTE_JOB_ID_KEY })?;
        let job_id: Uuid = Uuid::from_str(job_id_raw).map_err(|_| JobError::IllegalRemote { field: REMOTE_JOB_ID_KEY })?;
        Ok(Self::new(uri, service_name, job_id))
    }
}

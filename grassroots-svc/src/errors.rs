//  ERRORS.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 09:01:14
//  Last edited:
//    02 Jul 2024, 15:14:40
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `grassroots-svc` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};

use grassroots_par::errors::ParameterError;
use specifications::operations::OperationStatusParseError;


/***** LIBRARY *****/
/// Errors that relate to parsing Synchronicities.
#[derive(Debug)]
pub enum SynchronicityParseError {
    /// The given string named no synchronicity.
    UnknownSynchronicity { raw: String },
}
impl Display for SynchronicityParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use SynchronicityParseError::*;
        match self {
            UnknownSynchronicity { raw } => write!(f, "Unknown synchronicity '{raw}'"),
        }
    }
}
impl Error for SynchronicityParseError {}



/// Errors that relate to (de)serialising ServiceJobs.
#[derive(Debug)]
pub enum JobError {
    /// The job JSON was not an object.
    NotAnObject { got: String },
    /// The job JSON was missing a mandatory field.
    MissingField { field: &'static str },
    /// The job's uuid did not parse.
    IllegalUuid { raw: String, err: uuid::Error },
    /// The job's status value was not a known status.
    IllegalStatus { err: OperationStatusParseError },
    /// A remote job was missing one of its remote fields.
    IllegalRemote { field: &'static str },
}
impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use JobError::*;
        match self {
            NotAnObject { got } => write!(f, "Job JSON is not an object (got {got})"),
            MissingField { field } => write!(f, "Job JSON is missing mandatory field '{field}'"),
            IllegalUuid { raw, .. } => write!(f, "Cannot parse job uuid '{raw}'"),
            IllegalStatus { .. } => write!(f, "Cannot parse job status"),
            IllegalRemote { field } => write!(f, "Remote job JSON is missing field '{field}'"),
        }
    }
}
impl Error for JobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use JobError::*;
        match self {
            NotAnObject { .. } => None,
            MissingField { .. } => None,
            IllegalUuid { err, .. } => Some(err),
            IllegalStatus { err } => Some(err),
            IllegalRemote { .. } => None,
        }
    }
}



/// Errors that a service (or the machinery running it) may raise.
#[derive(Debug)]
pub enum ServiceError {
    /// A parameter was rejected while preparing or running a service.
    Parameter { name: Option<String>, err: ParameterError },
    /// The service's run callback failed as a whole (i.e., before any jobs could be created).
    RunFailed { service: String, reason: String },
    /// The service does not implement the requested capability.
    NotImplemented { service: String, what: &'static str },
    /// A job could not be (de)serialised.
    Job { err: JobError },
    /// A job's update callback failed.
    UpdateFailed { service: String, uuid: String, reason: String },
    /// A job's result calculation failed.
    CalculateResultsFailed { service: String, uuid: String, reason: String },
}
impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ServiceError::*;
        match self {
            Parameter { name: Some(name), .. } => write!(f, "Parameter '{name}' was rejected"),
            Parameter { name: None, .. } => write!(f, "A parameter was rejected"),
            RunFailed { service, reason } => write!(f, "Service '{service}' failed to run: {reason}"),
            NotImplemented { service, what } => write!(f, "Service '{service}' does not implement {what}"),
            Job { .. } => write!(f, "Cannot (de)serialise job"),
            UpdateFailed { service, uuid, reason } => write!(f, "Service '{service}' failed to update job '{uuid}': {reason}"),
            CalculateResultsFailed { service, uuid, reason } => write!(f, "Service '{service}' failed to calculate results for job '{uuid}': {reason}"),
        }
    }
}
impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ServiceError::*;
        match self {
            Parameter { err, .. } => Some(err),
            Job { err } => Some(err),
            _ => None,
        }
    }
}

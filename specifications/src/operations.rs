//  OPERATIONS.rs
//    by Lut99
//
//  Created:
//    14 Mar 2024, 11:03:18
//  Last edited:
//    02 Jul 2024, 09:31:47
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the high-level [`Operation`]s a Grassroots server can be
//!   asked to perform, and the [`OperationStatus`] state machine that
//!   every service job moves through.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use enum_debug::EnumDebug;
use serde_json::Value;
use strum::IntoEnumIterator as _;
use strum_macros::EnumIter;


/***** CONSTANTS *****/
/// The request key carrying an operation tag (string form).
pub const OPERATION_KEY: &str = "operation";
/// The request key carrying a legacy numeric operation id.
pub const OPERATION_ID_KEY: &str = "operation_id";





/***** ERRORS *****/
/// Errors that relate to parsing Operations.
#[derive(Debug)]
pub enum OperationParseError {
    /// The given string was not a known operation tag.
    UnknownOperation { raw: String },
    /// The given number was not a known legacy operation id.
    UnknownOperationId { raw: i64 },
}
impl Display for OperationParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use OperationParseError::*;
        match self {
            UnknownOperation { raw } => write!(f, "Unknown operation '{raw}'"),
            UnknownOperationId { raw } => write!(f, "Unknown operation id {raw}"),
        }
    }
}
impl Error for OperationParseError {}

/// Errors that relate to parsing OperationStatuses.
#[derive(Debug)]
pub enum OperationStatusParseError {
    /// The given string was not a known status.
    UnknownStatus { raw: String },
    /// The given number was not a known status value.
    UnknownStatusValue { raw: i64 },
}
impl Display for OperationStatusParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use OperationStatusParseError::*;
        match self {
            UnknownStatus { raw } => write!(f, "Unknown operation status '{raw}'"),
            UnknownStatusValue { raw } => write!(f, "Unknown operation status value {raw}"),
        }
    }
}
impl Error for OperationStatusParseError {}





/***** LIBRARY *****/
/// The high-level operations a server knows how to dispatch.
///
/// Operations appear on the wire either as their string tag (`"operation": "LIST_ALL_SERVICES"`)
/// or, for old clients, as a stable numeric id (`"operation_id": 0`).
#[derive(Clone, Copy, Debug, EnumDebug, EnumIter, Eq, Hash, PartialEq)]
pub enum Operation {
    /// Enumerate local and federated services.
    ListAllServices,
    /// Return the schema version this server speaks.
    GetSchemaVersion,
    /// Return the services whose resource matcher accepts a given data resource.
    ListInterestedServices,
    /// Return the descriptors of one or more named services.
    GetNamedServices,
    /// Return the results (or status) of previously submitted jobs.
    GetServiceResults,
    /// Return a named server-side resource.
    GetResource,
    /// Return a snapshot of all jobs known to the jobs manager.
    ServerStatus,
    /// As GetNamedServices, but in the indexing-data shape.
    GetServiceInfo,
    /// Run every keyword-aware service against a given keyword.
    RunKeywordServices,
}

impl Operation {
    /// Returns the stable numeric id of this Operation, as understood by legacy clients.
    #[inline]
    pub const fn id(&self) -> i64 {
        use Operation::*;
        match self {
            ListAllServices => 0,
            GetSchemaVersion => 1,
            ListInterestedServices => 2,
            GetNamedServices => 3,
            GetServiceResults => 4,
            GetResource => 5,
            ServerStatus => 6,
            GetServiceInfo => 7,
            RunKeywordServices => 8,
        }
    }

    /// Resolves a legacy numeric id back into an Operation.
    ///
    /// # Arguments
    /// - `id`: The numeric id to resolve.
    ///
    /// # Errors
    /// This function errors if the id does not name an Operation.
    pub fn from_id(id: i64) -> Result<Self, OperationParseError> {
        Self::iter().find(|op| op.id() == id).ok_or(OperationParseError::UnknownOperationId { raw: id })
    }

    /// Extracts the Operation from a request's `operations` field.
    ///
    /// The field may be the bare tag string, or an object carrying either [`OPERATION_KEY`]
    /// (tag or numeric) or the legacy [`OPERATION_ID_KEY`].
    ///
    /// # Arguments
    /// - `value`: The `operations` field of an incoming request.
    ///
    /// # Errors
    /// This function errors if the value carried neither a recognisable tag nor id.
    pub fn from_json(value: &Value) -> Result<Self, OperationParseError> {
        match value {
            Value::String(tag) => Self::from_str(tag),
            Value::Object(obj) => {
                if let Some(op) = obj.get(OPERATION_KEY) {
                    match op {
                        Value::String(tag) => return Self::from_str(tag),
                        Value::Number(num) if num.as_i64().is_some() => return Self::from_id(num.as_i64().unwrap()),
                        _ => {},
                    }
                }
                if let Some(id) = obj.get(OPERATION_ID_KEY).and_then(Value::as_i64) {
                    return Self::from_id(id);
                }
                Err(OperationParseError::UnknownOperation { raw: Value::Object(obj.clone()).to_string() })
            },
            other => Err(OperationParseError::UnknownOperation { raw: other.to_string() }),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Operation::*;
        match self {
            ListAllServices => write!(f, "LIST_ALL_SERVICES"),
            GetSchemaVersion => write!(f, "GET_SCHEMA_VERSION"),
            ListInterestedServices => write!(f, "LIST_INTERESTED_SERVICES"),
            GetNamedServices => write!(f, "GET_NAMED_SERVICES"),
            GetServiceResults => write!(f, "GET_SERVICE_RESULTS"),
            GetResource => write!(f, "GET_RESOURCE"),
            ServerStatus => write!(f, "SERVER_STATUS"),
            GetServiceInfo => write!(f, "GET_SERVICE_INFO"),
            RunKeywordServices => write!(f, "RUN_KEYWORD_SERVICES"),
        }
    }
}
impl FromStr for Operation {
    type Err = OperationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIST_ALL_SERVICES" => Ok(Self::ListAllServices),
            "GET_SCHEMA_VERSION" => Ok(Self::GetSchemaVersion),
            "LIST_INTERESTED_SERVICES" => Ok(Self::ListInterestedServices),
            "GET_NAMED_SERVICES" => Ok(Self::GetNamedServices),
            "GET_SERVICE_RESULTS" => Ok(Self::GetServiceResults),
            "GET_RESOURCE" => Ok(Self::GetResource),
            "SERVER_STATUS" => Ok(Self::ServerStatus),
            "GET_SERVICE_INFO" => Ok(Self::GetServiceInfo),
            "RUN_KEYWORD_SERVICES" => Ok(Self::RunKeywordServices),
            raw => Err(OperationParseError::UnknownOperation { raw: raw.into() }),
        }
    }
}



/// The status of one service job.
///
/// The numeric values are part of the wire contract and must never be renumbered.
#[derive(Clone, Copy, Debug, EnumDebug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OperationStatus {
    /// The job failed while running.
    Failed,
    /// The job never managed to start.
    FailedToStart,
    /// The job raised an error.
    Error,
    /// The job exists but has not been scheduled.
    Idle,
    /// The job is waiting to run.
    Pending,
    /// The job is running.
    Started,
    /// The job finished, but with a mix of outcomes among its sub-tasks.
    Finished,
    /// The job finished and some, but not all, of its sub-tasks succeeded.
    PartiallySucceeded,
    /// The job finished and succeeded.
    Succeeded,
    /// The job's resources have been reclaimed.
    CleanedUp,
}

impl OperationStatus {
    /// Returns the stable integer value of this status.
    #[inline]
    pub const fn value(&self) -> i64 {
        use OperationStatus::*;
        match self {
            Failed => -3,
            FailedToStart => -2,
            Error => -1,
            Idle => 0,
            Pending => 1,
            Started => 2,
            Finished => 3,
            PartiallySucceeded => 4,
            Succeeded => 5,
            CleanedUp => 6,
        }
    }

    /// Resolves a stable integer value back into an OperationStatus.
    ///
    /// # Arguments
    /// - `value`: The integer to resolve.
    ///
    /// # Errors
    /// This function errors if the value does not name a status.
    pub fn from_value(value: i64) -> Result<Self, OperationStatusParseError> {
        Self::iter().find(|status| status.value() == value).ok_or(OperationStatusParseError::UnknownStatusValue { raw: value })
    }

    /// Whether this status is one of the terminal failure statuses.
    #[inline]
    pub const fn is_failure(&self) -> bool { matches!(self, Self::Failed | Self::FailedToStart | Self::Error) }

    /// Whether this status is one of the terminal success statuses.
    #[inline]
    pub const fn is_success(&self) -> bool { matches!(self, Self::Succeeded | Self::PartiallySucceeded) }

    /// Whether a job with this status will never change status again by itself.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::FailedToStart | Self::Error | Self::Finished | Self::PartiallySucceeded | Self::Succeeded | Self::CleanedUp)
    }

    /// Whether a job with this status is still live (occupying its service).
    #[inline]
    pub const fn is_live(&self) -> bool { matches!(self, Self::Pending | Self::Started) }

    /// Folds the status of one more sub-task into an aggregate status.
    ///
    /// Any incoming failure drags the aggregate down to the worst failure seen; an incoming
    /// not-yet-finished status next to an already-successful aggregate means the whole can at
    /// best partially succeed; only unanimous successes stay [`OperationStatus::Succeeded`].
    ///
    /// # Arguments
    /// - `incoming`: The status of the sub-task to fold in.
    ///
    /// # Returns
    /// The new aggregate status.
    pub fn merge(self, incoming: Self) -> Self {
        use OperationStatus::*;
        if incoming.is_failure() {
            if self.is_failure() && self.value() < incoming.value() { self } else { incoming }
        } else if matches!(incoming, Idle | Pending | Started) && self.is_success() {
            PartiallySucceeded
        } else if self == Succeeded && incoming == Succeeded {
            Succeeded
        } else {
            Finished
        }
    }
}

impl Display for OperationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use OperationStatus::*;
        match self {
            Failed => write!(f, "FAILED"),
            FailedToStart => write!(f, "FAILED_TO_START"),
            Error => write!(f, "ERROR"),
            Idle => write!(f, "IDLE"),
            Pending => write!(f, "PENDING"),
            Started => write!(f, "STARTED"),
            Finished => write!(f, "FINISHED"),
            PartiallySucceeded => write!(f, "PARTIALLY_SUCCEEDED"),
            Succeeded => write!(f, "SUCCEEDED"),
            CleanedUp => write!(f, "CLEANED_UP"),
        }
    }
}
impl FromStr for OperationStatus {
    type Err = OperationStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FAILED" => Ok(Self::Failed),
            "FAILED_TO_START" => Ok(Self::FailedToStart),
            "ERROR" => Ok(Self::Error),
            "IDLE" => Ok(Self::Idle),
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "FINISHED" => Ok(Self::Finished),
            "PARTIALLY_SUCCEEDED" => Ok(Self::PartiallySucceeded),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "CLEANED_UP" => Ok(Self::CleanedUp),
            raw => Err(OperationStatusParseError::UnknownStatus { raw: raw.into() }),
        }
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn operation_from_json_accepts_tags_and_ids() {
        assert_eq!(Operation::from_json(&json!("LIST_ALL_SERVICES")).unwrap(), Operation::ListAllServices);
        assert_eq!(Operation::from_json(&json!({ "operation": "GET_SCHEMA_VERSION" })).unwrap(), Operation::GetSchemaVersion);
        assert_eq!(Operation::from_json(&json!({ "operation_id": 6 })).unwrap(), Operation::ServerStatus);
        assert_eq!(Operation::from_json(&json!({ "operation": 4 })).unwrap(), Operation::GetServiceResults);
        assert!(Operation::from_json(&json!({ "operation": "FROBNICATE" })).is_err());
        assert!(Operation::from_json(&json!(null)).is_err());
    }

    #[test]
    fn operation_ids_are_stable() {
        for (op, id) in [
            (Operation::ListAllServices, 0),
            (Operation::GetSchemaVersion, 1),
            (Operation::ListInterestedServices, 2),
            (Operation::GetNamedServices, 3),
            (Operation::GetServiceResults, 4),
            (Operation::GetResource, 5),
            (Operation::ServerStatus, 6),
            (Operation::GetServiceInfo, 7),
            (Operation::RunKeywordServices, 8),
        ] {
            assert_eq!(op.id(), id);
            assert_eq!(Operation::from_id(id).unwrap(), op);
        }
    }

    #[test]
    fn status_values_are_stable() {
        assert_eq!(OperationStatus::Failed.value(), -3);
        assert_eq!(OperationStatus::Idle.value(), 0);
        assert_eq!(OperationStatus::Succeeded.value(), 5);
        assert_eq!(OperationStatus::CleanedUp.value(), 6);
        assert_eq!(OperationStatus::from_value(-2).unwrap(), OperationStatus::FailedToStart);
        assert!(OperationStatus::from_value(42).is_err());
    }

    #[test]
    fn status_text_matches_identifier() {
        assert_eq!(OperationStatus::PartiallySucceeded.to_string(), "PARTIALLY_SUCCEEDED");
        assert_eq!(OperationStatus::from_str("STARTED").unwrap(), OperationStatus::Started);
    }

    #[test]
    fn status_merge_follows_the_rules() {
        use OperationStatus::*;

        // Failures always win, worst first
        assert_eq!(Succeeded.merge(Error), Error);
        assert_eq!(Failed.merge(Error), Failed);
        assert_eq!(Error.merge(Failed), Failed);

        // A straggler next to a success makes it partial
        assert_eq!(Succeeded.merge(Idle), PartiallySucceeded);
        assert_eq!(PartiallySucceeded.merge(Pending), PartiallySucceeded);

        // Unanimous success stays success
        assert_eq!(Succeeded.merge(Succeeded), Succeeded);

        // Everything else is a mere finish
        assert_eq!(PartiallySucceeded.merge(Succeeded), Finished);
        assert_eq!(Started.merge(Succeeded), Finished);
    }
}

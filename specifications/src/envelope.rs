//  ENVELOPE.rs
//    by Lut99
//
//  Created:
//    15 Mar 2024, 10:21:17
//  Last edited:
//    02 Jul 2024, 11:04:29
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the request- and response envelopes that travel between
//!   clients and servers (and between paired servers, which speak the
//!   exact same contract to each other).
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::user::UserDetails;
use crate::version::SchemaVersion;


/***** CONSTANTS *****/
/// The envelope key carrying the header object.
pub const HEADER_KEY: &str = "header";
/// The header key carrying the schema version.
pub const SCHEMA_KEY: &str = "schema";
/// The header key carrying a protocol-level error.
pub const ERROR_KEY: &str = "error";
/// The envelope key carrying the high-level operation.
pub const OPERATIONS_KEY: &str = "operations";
/// The envelope key carrying per-service run requests (and, in responses, service descriptors).
pub const SERVICES_KEY: &str = "services";
/// The response key carrying job results.
pub const SERVICE_RESULTS_KEY: &str = "service_results";
/// The response key carrying a fetched server-side resource.
pub const RESOURCE_KEY: &str = "resource";
/// The response key carrying the jobs-manager snapshot.
pub const SERVER_STATUS_KEY: &str = "server_status";
/// The envelope key seeding the providers-state table.
pub const SERVERS_KEY: &str = "servers";
/// The request key naming an external server to proxy to.
pub const SERVER_URI_KEY: &str = "server_uri";
/// The response key identifying the server that produced the response.
pub const SERVER_UUID_KEY: &str = "server_uuid";
/// The per-service-entry key naming the service.
pub const SERVICE_NAME_KEY: &str = "name";
/// The per-service-entry key requesting an actual run.
pub const SERVICE_RUN_KEY: &str = "run";
/// The per-service-entry key carrying the parameter set.
pub const PARAM_SET_KEY: &str = "param_set";
/// The envelope key carrying the request configuration (credentials et al).
pub const CONFIG_KEY: &str = "config";
/// The config key carrying the user credentials.
pub const CREDENTIALS_KEY: &str = "credentials";
/// The operations-object key carrying a data resource.
pub const OPERATION_RESOURCE_KEY: &str = "resource";
/// The operations-object key carrying a keyword query.
pub const OPERATION_KEYWORD_KEY: &str = "keyword";





/***** ERRORS *****/
/// Errors that relate to parsing request envelopes.
#[derive(Debug)]
pub enum EnvelopeError {
    /// The request was not a JSON object at all.
    NotAnObject { got: String },
    /// The request carried neither an operation nor a services array.
    NothingToDo,
    /// A `services` entry could not be parsed.
    IllegalServiceEntry { entry: String, err: serde_json::Error },
}
impl Display for EnvelopeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use EnvelopeError::*;
        match self {
            NotAnObject { got } => write!(f, "Request envelope is not a JSON object (got {got})"),
            NothingToDo => write!(f, "Request envelope carries neither an '{OPERATIONS_KEY}' field nor a '{SERVICES_KEY}' array"),
            IllegalServiceEntry { entry, .. } => write!(f, "Cannot parse services entry {entry}"),
        }
    }
}
impl Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use EnvelopeError::*;
        match self {
            NotAnObject { .. } => None,
            NothingToDo => None,
            IllegalServiceEntry { err, .. } => Some(err),
        }
    }
}





/***** AUXILLARY *****/
/// One entry of a request's `services` array: a request to run (or merely configure) one service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServiceRunRequest {
    /// The name of the service to address.
    #[serde(alias = "service", alias = "service_name")]
    pub name: String,
    /// Whether the service should actually be run.
    #[serde(default)]
    pub run: bool,
    /// The parameter values to run with, in concise parameter-set shape.
    ///
    /// Left as an abstract [`Value`]; the parameter model interprets it further down the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_set: Option<Value>,
}

/// The header of a request or response envelope.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EnvelopeHeader {
    /// The schema version the sender speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaVersion>,
}





/***** LIBRARY *****/
/// A parsed request envelope.
///
/// All fields are optional on the wire; [`RequestEnvelope::from_json`] only insists that there
/// is _something_ to do (an operation or a services array).
#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    /// The header, if any.
    pub header: EnvelopeHeader,
    /// The user credentials from the `config` block, if any.
    pub user: Option<UserDetails>,
    /// The raw `operations` field (tag string or object), if any.
    pub operations: Option<Value>,
    /// The parsed `services` array, if any.
    pub services: Vec<ServiceRunRequest>,
    /// The raw `servers` field seeding the providers-state table, if any.
    pub servers: Option<Value>,
    /// The uuid of an external server this request should be proxied to, if any.
    pub server_uri: Option<String>,
}

impl RequestEnvelope {
    /// Parses a raw JSON request into an envelope.
    ///
    /// # Arguments
    /// - `request`: The incoming JSON request.
    ///
    /// # Errors
    /// This function errors if the request is not an object, carries an unparseable services
    /// entry, or has neither an operation nor services.
    pub fn from_json(request: &Value) -> Result<Self, EnvelopeError> {
        let obj: &Map<String, Value> = match request.as_object() {
            Some(obj) => obj,
            None => {
                return Err(EnvelopeError::NotAnObject { got: request.to_string() });
            },
        };

        let header: EnvelopeHeader = obj.get(HEADER_KEY).and_then(|h| serde_json::from_value(h.clone()).ok()).unwrap_or_default();
        let user: Option<UserDetails> =
            obj.get(CONFIG_KEY).and_then(|c| c.get(CREDENTIALS_KEY)).map(|credentials| UserDetails::new(credentials.clone()));

        let mut services: Vec<ServiceRunRequest> = vec![];
        if let Some(entries) = obj.get(SERVICES_KEY).and_then(Value::as_array) {
            for entry in entries {
                match serde_json::from_value(entry.clone()) {
                    Ok(service) => services.push(service),
                    Err(err) => {
                        return Err(EnvelopeError::IllegalServiceEntry { entry: entry.to_string(), err });
                    },
                }
            }
        }

        let operations: Option<Value> = obj.get(OPERATIONS_KEY).cloned();
        if operations.is_none() && services.is_empty() {
            return Err(EnvelopeError::NothingToDo);
        }
        debug!("Parsed request envelope with {} services entry(s)", services.len());

        Ok(Self {
            header,
            user,
            operations,
            services,
            servers: obj.get(SERVERS_KEY).cloned(),
            server_uri: obj.get(SERVER_URI_KEY).and_then(Value::as_str).map(String::from),
        })
    }
}



/// Builds an initialised response envelope around a single key/value payload.
///
/// # Arguments
/// - `schema`: The schema version to stamp the header with.
/// - `key`: The payload key (e.g. [`SERVICE_RESULTS_KEY`]).
/// - `value`: The payload itself.
///
/// # Returns
/// The response envelope as a JSON object.
pub fn build_response(schema: &SchemaVersion, key: &str, value: Value) -> Value {
    json!({
        HEADER_KEY: { SCHEMA_KEY: schema },
        key: value,
    })
}

/// Builds a response envelope describing a protocol-level error.
///
/// No services are invoked for such requests; the error lives in the header so that clients do
/// not mistake it for an (empty) result set.
///
/// # Arguments
/// - `schema`: The schema version to stamp the header with.
/// - `message`: A description of what was wrong with the request.
///
/// # Returns
/// The response envelope as a JSON object.
pub fn build_error_response(schema: &SchemaVersion, message: impl Display) -> Value {
    json!({
        HEADER_KEY: { SCHEMA_KEY: schema, ERROR_KEY: message.to_string() },
    })
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_a_run_request() {
        let request = json!({
            "header": { "schema": { "major": 0, "minor": 10 } },
            "config": { "credentials": { "username": "billy" } },
            "services": [ { "name": "echo", "run": true, "param_set": { "params": [] } } ],
        });

        let envelope = RequestEnvelope::from_json(&request).unwrap();
        assert_eq!(envelope.header.schema, Some(SchemaVersion::new(0, 10)));
        assert_eq!(envelope.user.as_ref().and_then(|u| u.username()), Some("billy"));
        assert_eq!(envelope.services.len(), 1);
        assert_eq!(envelope.services[0].name, "echo");
        assert!(envelope.services[0].run);
    }

    #[test]
    fn envelope_requires_something_to_do() {
        assert!(matches!(RequestEnvelope::from_json(&json!({ "header": {} })), Err(EnvelopeError::NothingToDo)));
        assert!(matches!(RequestEnvelope::from_json(&json!([])), Err(EnvelopeError::NotAnObject { .. })));
        assert!(RequestEnvelope::from_json(&json!({ "operations": "GET_SCHEMA_VERSION" })).is_ok());
    }

    #[test]
    fn responses_have_initialised_headers() {
        let schema = SchemaVersion::new(0, 10);
        let response = build_response(&schema, SERVICE_RESULTS_KEY, json!([]));
        assert_eq!(response[HEADER_KEY][SCHEMA_KEY]["major"], 0);
        assert_eq!(response[SERVICE_RESULTS_KEY], json!([]));

        let error = build_error_response(&schema, "no such thing");
        assert_eq!(error[HEADER_KEY][ERROR_KEY], "no such thing");
    }
}

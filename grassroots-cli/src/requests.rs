//  REQUESTS.rs
//    by Lut99
//
//  Created:
//    08 Jul 2024, 10:02:55
//  Last edited:
//    09 Jul 2024, 15:11:38
//  Auto updated?
//    Yes
//
//  Description:
//!   Builds the request envelopes for every subcommand, sends them to
//!   the server and renders the responses. The envelopes built here
//!   are exactly the ones the server-side dispatcher consumes; the
//!   client has no other channel.
//

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde_json::{json, Value};
use specifications::envelope::{
    self, ERROR_KEY, HEADER_KEY, SCHEMA_KEY, SERVICE_RESULTS_KEY,
};
use specifications::operations::{Operation, OperationStatus};
use specifications::version::SchemaVersion;

use crate::errors::ClientError;
use crate::spec::ParamPair;


/***** CONSTANTS *****/
/// How often a `--wait` poll re-asks the server.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How many polls a `--wait` run is willing to spend per job.
pub const POLL_BUDGET: usize = 300;





/***** HELPER FUNCTIONS *****/
/// Wraps a payload in the request envelope, attaching credentials when given.
fn envelope(schema: SchemaVersion, mut payload: Value, credentials: Option<&Value>) -> Value {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(HEADER_KEY.into(), json!({ SCHEMA_KEY: schema }));
        if let Some(credentials) = credentials {
            obj.insert(envelope::CONFIG_KEY.into(), json!({ envelope::CREDENTIALS_KEY: credentials }));
        }
    }
    payload
}





/***** LIBRARY *****/
/// A connection to one Grassroots server.
pub struct Client {
    /// The uri the server accepts envelopes on.
    uri: String,
    /// The schema version we stamp our requests with.
    schema: SchemaVersion,
    /// The credentials to attach to every request, if any.
    credentials: Option<Value>,
    /// The underlying HTTP client.
    client: reqwest::Client,
}

impl Client {
    /// Constructor for the Client.
    ///
    /// # Arguments
    /// - `uri`: The uri the server accepts envelopes on.
    /// - `schema`: The schema version to stamp requests with.
    ///
    /// # Returns
    /// A new Client without credentials.
    pub fn new(uri: impl Into<String>, schema: SchemaVersion) -> Self {
        Self { uri: uri.into(), schema, credentials: None, client: reqwest::Client::new() }
    }

    /// Loads the credentials to attach to every request from the given JSON file.
    ///
    /// # Arguments
    /// - `path`: The path of the credentials file.
    ///
    /// # Errors
    /// This function errors if the file cannot be read or parsed.
    pub fn load_credentials(&mut self, path: &Path) -> Result<(), ClientError> {
        let raw: String = std::fs::read_to_string(path).map_err(|err| ClientError::CredentialsReadError { path: path.into(), err })?;
        let credentials: Value = serde_json::from_str(&raw).map_err(|err| ClientError::CredentialsParseError { path: path.into(), err })?;
        self.credentials = Some(credentials);
        Ok(())
    }

    /// Sends one envelope and hands back the server's response.
    ///
    /// # Arguments
    /// - `payload`: The envelope body (the header and credentials are attached here).
    ///
    /// # Errors
    /// This function errors if the server is unreachable, does not speak JSON, or answers
    /// with a protocol-level error in its header.
    pub async fn send(&self, payload: Value) -> Result<Value, ClientError> {
        let request: Value = envelope(self.schema, payload, self.credentials.as_ref());
        debug!("Sending request to '{}': {}", self.uri, request);

        let response = self.client.post(&self.uri).json(&request).send().await.map_err(|err| ClientError::RequestError { uri: self.uri.clone(), err })?;
        let body: Value = response.json().await.map_err(|err| ClientError::ResponseParseError { uri: self.uri.clone(), err })?;

        if let Some(message) = body.get(HEADER_KEY).and_then(|header| header.get(ERROR_KEY)).and_then(Value::as_str) {
            return Err(ClientError::ServerError { uri: self.uri.clone(), message: message.into() });
        }
        Ok(body)
    }



    /// Asks the server for all of its (and its peers') services.
    pub async fn list_services(&self) -> Result<Value, ClientError> {
        self.send(json!({ envelope::OPERATIONS_KEY: Operation::ListAllServices.to_string() })).await
    }

    /// Asks the server which schema version it speaks.
    pub async fn schema_version(&self) -> Result<Value, ClientError> {
        self.send(json!({ envelope::OPERATIONS_KEY: Operation::GetSchemaVersion.to_string() })).await
    }

    /// Asks the server which services can consume the given resource.
    ///
    /// # Arguments
    /// - `protocol`: The protocol part of the resource.
    /// - `value`: The locator part of the resource.
    pub async fn interested_services(&self, protocol: &str, value: &str) -> Result<Value, ClientError> {
        self.send(json!({
            envelope::OPERATIONS_KEY: {
                "operation": Operation::ListInterestedServices.to_string(),
                envelope::OPERATION_RESOURCE_KEY: { "protocol": protocol, "value": value },
            },
        }))
        .await
    }

    /// Asks the server for the descriptors of the named services.
    ///
    /// # Arguments
    /// - `names`: The names of the services to describe.
    /// - `indexing`: If true, asks for the indexing-data shape (GET_SERVICE_INFO) instead.
    pub async fn named_services(&self, names: &[String], indexing: bool) -> Result<Value, ClientError> {
        let operation: Operation = if indexing { Operation::GetServiceInfo } else { Operation::GetNamedServices };
        self.send(json!({
            envelope::OPERATIONS_KEY: { "operation": operation.to_string(), envelope::SERVICES_KEY: names },
        }))
        .await
    }

    /// Runs one service with the given parameters.
    ///
    /// # Arguments
    /// - `name`: The name of the service to run.
    /// - `params`: The `name=value` parameter pairs to run with.
    /// - `pinned`: Server uris to mark as already-visited in the providers state, which
    ///   suppresses the server's federated fan-out to them.
    pub async fn run_service(&self, name: &str, params: &[ParamPair], pinned: &[String]) -> Result<Value, ClientError> {
        let fragments: Vec<Value> = params.iter().map(|pair| json!({ "name": pair.name, "current_value": pair.value })).collect();
        let mut payload: Value = json!({
            envelope::SERVICES_KEY: [ {
                envelope::SERVICE_NAME_KEY: name,
                envelope::SERVICE_RUN_KEY: true,
                envelope::PARAM_SET_KEY: { "params": fragments },
            } ],
        });
        if !pinned.is_empty() {
            let seed: Vec<Value> = pinned.iter().map(|uri| json!({ "server_uri": uri })).collect();
            if let Some(obj) = payload.as_object_mut() {
                obj.insert(envelope::SERVERS_KEY.into(), Value::Array(seed));
            }
        }
        self.send(payload).await
    }

    /// Runs every keyword-aware service against the given keyword.
    pub async fn run_keyword(&self, keyword: &str) -> Result<Value, ClientError> {
        self.send(json!({
            envelope::OPERATIONS_KEY: { "operation": Operation::RunKeywordServices.to_string(), envelope::OPERATION_KEYWORD_KEY: keyword },
        }))
        .await
    }

    /// Polls the given jobs once.
    ///
    /// # Arguments
    /// - `uuids`: The uuids of the jobs to poll.
    pub async fn poll(&self, uuids: &[String]) -> Result<Value, ClientError> {
        self.send(json!({
            envelope::OPERATIONS_KEY: { "operation": Operation::GetServiceResults.to_string(), envelope::SERVICES_KEY: uuids },
        }))
        .await
    }

    /// Polls the given jobs until every one of them has left the live statuses.
    ///
    /// # Arguments
    /// - `uuids`: The uuids of the jobs to wait out.
    ///
    /// # Errors
    /// This function errors if the polling budget runs out before the jobs settle.
    pub async fn poll_until_done(&self, uuids: &[String]) -> Result<Value, ClientError> {
        for round in 0..POLL_BUDGET {
            let response: Value = self.poll(uuids).await?;
            let live: Option<&Value> = response
                .get(SERVICE_RESULTS_KEY)
                .and_then(Value::as_array)
                .and_then(|entries| entries.iter().find(|entry| entry_is_live(entry)));
            match live {
                Some(entry) => {
                    info!("Job '{}' still underway after poll {}", entry.get("uuid").and_then(Value::as_str).unwrap_or("?"), round + 1);
                    tokio::time::sleep(POLL_INTERVAL).await;
                },
                None => return Ok(response),
            }
        }
        Err(ClientError::PollTimeout { uuid: uuids.join(", ") })
    }

    /// Fetches a named server-side resource.
    ///
    /// # Arguments
    /// - `name`: The name (path below the server's resource root) of the resource.
    pub async fn resource(&self, name: &str) -> Result<Value, ClientError> {
        self.send(json!({
            envelope::OPERATIONS_KEY: {
                "operation": Operation::GetResource.to_string(),
                envelope::OPERATION_RESOURCE_KEY: { "protocol": "file", "value": name },
            },
        }))
        .await
    }

    /// Asks the server for a snapshot of all jobs it knows.
    pub async fn server_status(&self) -> Result<Value, ClientError> {
        self.send(json!({ envelope::OPERATIONS_KEY: Operation::ServerStatus.to_string() })).await
    }
}



/// Whether one service-results entry reports a live (pending or started) job.
pub fn entry_is_live(entry: &Value) -> bool {
    entry
        .get("status_value")
        .and_then(Value::as_i64)
        .and_then(|value| OperationStatus::from_value(value).ok())
        .map(|status| status.is_live())
        .unwrap_or(false)
}

/// Renders one response for the terminal.
pub fn render(response: &Value) -> String { serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string()) }





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use specifications::version::CURRENT_SCHEMA_VERSION;

    use super::*;

    #[test]
    fn envelopes_carry_header_and_credentials() {
        let body = envelope(CURRENT_SCHEMA_VERSION, json!({ "operations": "SERVER_STATUS" }), Some(&json!({ "username": "billy" })));
        assert_eq!(body[HEADER_KEY][SCHEMA_KEY]["major"], CURRENT_SCHEMA_VERSION.major);
        assert_eq!(body["config"]["credentials"]["username"], "billy");
        assert_eq!(body["operations"], "SERVER_STATUS");
    }

    #[test]
    fn liveness_is_read_from_status_values() {
        assert!(entry_is_live(&json!({ "status_value": 2 })));
        assert!(!entry_is_live(&json!({ "status_value": 5 })));
        assert!(!entry_is_live(&json!({ "no_status": true })));
    }

    #[test]
    fn run_param_fragments_keep_their_types() {
        let pair = ParamPair::from_str("limit=5").unwrap();
        let fragment = json!({ "name": pair.name, "current_value": pair.value });
        assert_eq!(fragment["current_value"], 5);
    }
}

//  PROVIDERS.rs
//    by Lut99
//
//  Created:
//    15 Mar 2024, 09:12:30
//  Last edited:
//    02 Jul 2024, 10:15:55
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ProvidersStateTable`], the per-request set of
//!   `(server uri, service name)` pairs that have already been
//!   dispatched. It is the sole cycle-breaker in the federation:
//!   without it, mutually paired servers would recurse indefinitely.
//

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};

use serde_json::{json, Value};


/***** CONSTANTS *****/
/// The envelope key under which the table travels between servers.
pub const SERVERS_KEY: &str = "servers";
/// The per-entry key naming the server.
pub const SERVER_URI_KEY: &str = "server_uri";
/// The per-entry key listing the dispatched services on that server.
pub const SERVICES_KEY: &str = "services";





/***** ERRORS *****/
/// Errors that relate to deserialising a ProvidersStateTable.
#[derive(Debug)]
pub enum ProvidersStateError {
    /// The `servers` field was not an array.
    NotAnArray { got: String },
    /// An entry in the array was missing its server uri.
    MissingServerUri { entry: String },
}
impl Display for ProvidersStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProvidersStateError::*;
        match self {
            NotAnArray { got } => write!(f, "Providers state is not a JSON array (got {got})"),
            MissingServerUri { entry } => write!(f, "Providers state entry {entry} has no '{SERVER_URI_KEY}' field"),
        }
    }
}
impl Error for ProvidersStateError {}





/***** LIBRARY *****/
/// The set of `(server uri, service name)` pairs seen in the current request.
///
/// An entry for a server without any service names marks the _whole_ server as visited; this is
/// what a client sends to pin a request to the local server only.
///
/// The table is scoped to a single request and is never shared across requests.
#[derive(Clone, Debug, Default)]
pub struct ProvidersStateTable {
    /// Per server uri, the services already dispatched there; `None` blankets the whole server.
    entries: BTreeMap<String, Option<BTreeSet<String>>>,
}

impl ProvidersStateTable {
    /// Constructor for an empty ProvidersStateTable.
    #[inline]
    pub fn new() -> Self { Self::default() }

    /// Checks whether the given `(server uri, service name)` pair has already been dispatched.
    ///
    /// # Arguments
    /// - `uri`: The uri of the server in question.
    /// - `service`: The name of the service on that server.
    ///
    /// # Returns
    /// True if the pair (or the whole server) is marked as visited.
    pub fn contains(&self, uri: &str, service: &str) -> bool {
        match self.entries.get(uri) {
            Some(None) => true,
            Some(Some(services)) => services.contains(service),
            None => false,
        }
    }

    /// Checks whether the given server is marked as visited in its entirety.
    #[inline]
    pub fn contains_server(&self, uri: &str) -> bool { matches!(self.entries.get(uri), Some(None)) }

    /// Marks the given `(server uri, service name)` pair as dispatched.
    ///
    /// # Arguments
    /// - `uri`: The uri of the server in question.
    /// - `service`: The name of the service on that server.
    ///
    /// # Returns
    /// True if the pair was newly inserted, or false if it was already marked.
    pub fn insert(&mut self, uri: impl Into<String>, service: impl Into<String>) -> bool {
        let uri: String = uri.into();
        let service: String = service.into();
        match self.entries.entry(uri).or_insert_with(|| Some(BTreeSet::new())) {
            None => false,
            Some(services) => services.insert(service),
        }
    }

    /// Marks the given server as visited in its entirety.
    #[inline]
    pub fn insert_server(&mut self, uri: impl Into<String>) { self.entries.insert(uri.into(), None); }

    /// Folds another table into this one.
    pub fn merge(&mut self, other: &Self) {
        for (uri, services) in &other.entries {
            match services {
                None => self.insert_server(uri.clone()),
                Some(services) => {
                    for service in services {
                        self.insert(uri.clone(), service.clone());
                    }
                },
            }
        }
    }

    /// The number of servers with at least one mark in this table.
    #[inline]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the table has no marks at all.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Serialises this table into the `servers` array shape.
    ///
    /// # Returns
    /// A JSON array with one `{server_uri, services?}` object per server.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(uri, services)| match services {
                    None => json!({ SERVER_URI_KEY: uri }),
                    Some(services) => json!({ SERVER_URI_KEY: uri, SERVICES_KEY: services.iter().collect::<Vec<_>>() }),
                })
                .collect(),
        )
    }

    /// Deserialises a table from the `servers` array of an incoming request.
    ///
    /// # Arguments
    /// - `value`: The `servers` field to parse.
    ///
    /// # Errors
    /// This function errors if the value is not an array of `{server_uri, services?}` objects.
    pub fn from_json(value: &Value) -> Result<Self, ProvidersStateError> {
        let entries: &Vec<Value> = match value.as_array() {
            Some(entries) => entries,
            None => {
                return Err(ProvidersStateError::NotAnArray { got: value.to_string() });
            },
        };

        let mut table: Self = Self::new();
        for entry in entries {
            let uri: &str = match entry.get(SERVER_URI_KEY).and_then(Value::as_str) {
                Some(uri) => uri,
                None => {
                    return Err(ProvidersStateError::MissingServerUri { entry: entry.to_string() });
                },
            };

            match entry.get(SERVICES_KEY).and_then(Value::as_array) {
                Some(services) => {
                    for service in services.iter().filter_map(Value::as_str) {
                        table.insert(uri, service);
                    }
                },
                None => table.insert_server(uri),
            }
        }
        Ok(table)
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn providersstate_no_double_dispatch() {
        let mut table = ProvidersStateTable::new();
        assert!(table.insert("https://peer.example", "blast"));
        assert!(!table.insert("https://peer.example", "blast"));
        assert!(table.contains("https://peer.example", "blast"));
        assert!(!table.contains("https://peer.example", "samtools"));
    }

    #[test]
    fn providersstate_server_blanket() {
        let mut table = ProvidersStateTable::new();
        table.insert_server("https://peer.example");
        assert!(table.contains("https://peer.example", "anything"));
        assert!(table.contains_server("https://peer.example"));
        assert!(!table.insert("https://peer.example", "anything"));
    }

    #[test]
    fn providersstate_json_roundtrip() {
        let mut table = ProvidersStateTable::new();
        table.insert("https://peer.example", "blast");
        table.insert_server("https://other.example");

        let json: Value = table.to_json();
        assert_eq!(json, json!([
            { "server_uri": "https://other.example" },
            { "server_uri": "https://peer.example", "services": ["blast"] },
        ]));

        let parsed = ProvidersStateTable::from_json(&json).unwrap();
        assert!(parsed.contains("https://peer.example", "blast"));
        assert!(parsed.contains_server("https://other.example"));
    }

    #[test]
    fn providersstate_rejects_garbage() {
        assert!(ProvidersStateTable::from_json(&json!("nope")).is_err());
        assert!(ProvidersStateTable::from_json(&json!([{ "services": [] }])).is_err());
    }
}

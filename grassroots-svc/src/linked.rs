//  LINKED.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 13:17:55
//  Last edited:
//    02 Jul 2024, 15:52:34
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`LinkedService`] declaration: a directed arc from
//!   one service's results to another service's inputs, expressed as
//!   a list of [`MappedParameter`]s (or a custom generator on the
//!   owning service).
//

use serde::{Deserialize, Serialize};
use serde_json::Value;


/***** CONSTANTS *****/
/// The sentinel output name meaning "the input value names a boolean parameter to switch on".
pub const MAPPED_PARAM_VALUE_SENTINEL: &str = "$value";





/***** AUXILLARY *****/
/// One input-to-parameter mapping of a linked-service arc.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MappedParameter {
    /// Where to read in the source job's result (a JSON pointer, relative to the arc's root).
    pub input: String,
    /// The name of the downstream parameter to write, or [`MAPPED_PARAM_VALUE_SENTINEL`].
    pub output: String,
    /// Whether the arc must be aborted if the input is missing.
    #[serde(default)]
    pub required: bool,
    /// Whether the input may yield multiple values.
    #[serde(default)]
    pub multiple: bool,
}

impl MappedParameter {
    /// Constructor for the MappedParameter.
    ///
    /// # Arguments
    /// - `input`: Where to read in the source job's result.
    /// - `output`: The name of the downstream parameter to write.
    ///
    /// # Returns
    /// A new, optional, single-valued MappedParameter.
    #[inline]
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self { input: input.into(), output: output.into(), required: false, multiple: false }
    }
}





/***** LIBRARY *****/
/// A directed arc from one service's results to another service's inputs.
///
/// When a job of the owning service succeeds, the linked-service engine reads the declared
/// inputs out of the job's results and synthesises a run request for the downstream service,
/// which is appended to the job's `linked_services` output.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LinkedService {
    /// The name of the downstream service to chain to.
    #[serde(rename = "service")]
    pub service_name: String,
    /// A JSON pointer prefix applied to every result entry before reading the mapped inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_root: Option<String>,
    /// The input-to-parameter mappings of this arc.
    #[serde(default, rename = "mapped_params", skip_serializing_if = "Vec::is_empty")]
    pub mapped: Vec<MappedParameter>,
    /// The name of a custom generator on the owning service, overriding the mappings.
    #[serde(default, rename = "generate_function", skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Arc-specific configuration, passed to the custom generator verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl LinkedService {
    /// Constructor for a mapping-based LinkedService.
    ///
    /// # Arguments
    /// - `service_name`: The name of the downstream service.
    /// - `mapped`: The input-to-parameter mappings.
    ///
    /// # Returns
    /// A new LinkedService without a custom generator.
    #[inline]
    pub fn new(service_name: impl Into<String>, mapped: Vec<MappedParameter>) -> Self {
        Self { service_name: service_name.into(), input_root: None, mapped, generator: None, config: Value::Null }
    }

    /// Parses the `linked_services` array of a service's configuration.
    ///
    /// # Arguments
    /// - `value`: The array to parse.
    ///
    /// # Errors
    /// This function errors if an entry does not have the declared shape.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>, serde_json::Error> { serde_json::from_value(value.clone()) }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn linkedservice_parses_its_config_shape() {
        let arcs = LinkedService::parse_list(&json!([
            {
                "service": "blast",
                "input_root": "/summary",
                "mapped_params": [ { "input": "/gene", "output": "keyword", "required": true } ],
            },
            { "service": "mapview", "generate_function": "make_map_request", "config": { "zoom": 3 } },
        ]))
        .unwrap();

        assert_eq!(arcs.len(), 2);
        assert_eq!(arcs[0].service_name, "blast");
        assert_eq!(arcs[0].mapped[0].output, "keyword");
        assert!(arcs[0].mapped[0].required);
        assert!(!arcs[0].mapped[0].multiple);
        assert_eq!(arcs[1].generator.as_deref(), Some("make_map_request"));
    }
}

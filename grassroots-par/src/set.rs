//  SET.rs
//    by Lut99
//
//  Created:
//    18 Mar 2024, 13:05:50
//  Last edited:
//    02 Jul 2024, 14:44:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ParameterSet`]: the ordered sequence of parameters
//!   a service exposes, partitioned into named [`ParameterGroup`]s.
//!   Names are unique within a set.
//

use log::debug;
use serde_json::{json, Map, Value};

use crate::errors::ParameterError;
use crate::parameter::{Parameter, ParameterDecoder, PARAM_CURRENT_VALUE_KEY, PARAM_NAME_KEY, PARAM_TYPE_KEY};
use crate::value::{ParameterType, ParameterValue};


/***** CONSTANTS *****/
/// The key under which a set's parameters are stored.
pub const SET_PARAMS_KEY: &str = "params";
/// The key under which a set's groups are stored.
pub const SET_GROUPS_KEY: &str = "groups";
/// The key under which a group's name is stored.
pub const GROUP_NAME_KEY: &str = "name";





/***** AUXILLARY *****/
/// A named partition of a parameter set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParameterGroup {
    /// The name of the group.
    pub name: String,
}

impl ParameterGroup {
    /// Constructor for the ParameterGroup.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}





/***** LIBRARY *****/
/// The ordered sequence of parameters a service exposes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    /// The parameters, in the order the service declared them.
    parameters: Vec<Parameter>,
    /// The groups the parameters are partitioned into.
    groups: Vec<ParameterGroup>,
}

impl ParameterSet {
    /// Constructor for an empty ParameterSet.
    #[inline]
    pub fn new() -> Self { Self::default() }

    /// Appends a group to this set, if it is not already declared.
    ///
    /// # Arguments
    /// - `name`: The name of the group.
    pub fn add_group(&mut self, name: impl Into<String>) {
        let name: String = name.into();
        if !self.groups.iter().any(|group| group.name == name) {
            self.groups.push(ParameterGroup::new(name));
        }
    }

    /// Appends a parameter to this set.
    ///
    /// If the parameter names a group that is not yet declared, the group is declared
    /// implicitly.
    ///
    /// # Arguments
    /// - `param`: The parameter to append.
    ///
    /// # Errors
    /// This function errors if a parameter with the same name already lives in the set.
    pub fn add_parameter(&mut self, param: Parameter) -> Result<(), ParameterError> {
        if self.parameters.iter().any(|existing| existing.name() == param.name()) {
            return Err(ParameterError::DuplicateParameter { name: param.name().into() });
        }
        if let Some(group) = param.group() {
            self.add_group(group.to_string());
        }
        self.parameters.push(param);
        Ok(())
    }

    /// Returns the parameter with the given name, if any.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Parameter> { self.parameters.iter().find(|param| param.name() == name) }

    /// Returns the parameter with the given name mutably, if any.
    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> { self.parameters.iter_mut().find(|param| param.name() == name) }

    /// Sets the current value of the named parameter.
    ///
    /// # Arguments
    /// - `name`: The name of the parameter to set.
    /// - `value`: The new value, or [`None`] to unset.
    ///
    /// # Errors
    /// This function errors if no such parameter exists or the value violates the parameter's
    /// invariants.
    pub fn set_current(&mut self, name: &str, value: Option<ParameterValue>) -> Result<(), ParameterError> {
        match self.get_mut(name) {
            Some(param) => param.set_current(value),
            None => Err(ParameterError::UnknownParameter { name: name.into() }),
        }
    }

    /// Iterates over the parameters in declaration order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> { self.parameters.iter() }

    /// Iterates mutably over the parameters in declaration order.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> { self.parameters.iter_mut() }

    /// Iterates over the parameters marked as keyword sinks.
    #[inline]
    pub fn keyword_parameters(&self) -> impl Iterator<Item = &Parameter> { self.parameters.iter().filter(|param| param.is_keyword()) }

    /// Whether any parameter in this set is a keyword sink.
    #[inline]
    pub fn has_keyword_parameter(&self) -> bool { self.parameters.iter().any(Parameter::is_keyword) }

    /// The groups declared in this set.
    #[inline]
    pub fn groups(&self) -> &[ParameterGroup] { &self.groups }

    /// The number of parameters in this set.
    #[inline]
    pub fn len(&self) -> usize { self.parameters.len() }

    /// Whether this set has no parameters.
    #[inline]
    pub fn is_empty(&self) -> bool { self.parameters.is_empty() }



    /// Serialises this set into its wire shape.
    ///
    /// # Arguments
    /// - `concise`: If true, parameters are emitted in their concise shape (see
    ///   [`Parameter::to_json`]).
    pub fn to_json(&self, concise: bool) -> Value {
        let mut obj: Map<String, Value> = Map::new();
        obj.insert(SET_PARAMS_KEY.into(), Value::Array(self.parameters.iter().map(|param| param.to_json(concise)).collect()));
        if !concise && !self.groups.is_empty() {
            obj.insert(SET_GROUPS_KEY.into(), Value::Array(self.groups.iter().map(|group| json!({ GROUP_NAME_KEY: group.name })).collect()));
        }
        Value::Object(obj)
    }

    /// Deserialises a set from its wire shape.
    ///
    /// # Arguments
    /// - `json`: The JSON object to parse. A missing `params` field is treated as an empty
    ///   list, since run requests may legally configure nothing.
    /// - `decoder`: An optional service-supplied parameter decoder, consulted per parameter.
    ///
    /// # Errors
    /// This function errors if the value is not an object, a parameter fragment does not
    /// parse, or two fragments share a name.
    pub fn from_json(json: &Value, decoder: Option<&dyn ParameterDecoder>) -> Result<Self, ParameterError> {
        if !json.is_object() {
            return Err(ParameterError::IllegalSetJson { got: json.to_string() });
        }

        let mut set: Self = Self::new();
        if let Some(groups) = json.get(SET_GROUPS_KEY).and_then(Value::as_array) {
            for group in groups {
                match group.get(GROUP_NAME_KEY).and_then(Value::as_str) {
                    Some(name) => set.add_group(name),
                    None => {
                        // Tolerate the bare-string form as well
                        if let Some(name) = group.as_str() {
                            set.add_group(name);
                        }
                    },
                }
            }
        }
        if let Some(params) = json.get(SET_PARAMS_KEY).and_then(Value::as_array) {
            for param in params {
                set.add_parameter(Parameter::from_json(param, decoder)?)?;
            }
        }
        Ok(set)
    }

    /// Applies the concise parameter fragments of a run request to this (schema) set.
    ///
    /// Unknown names yield an error, so that callers can report the offending parameter back
    /// per name.
    ///
    /// # Arguments
    /// - `json`: The `param_set` fragment of a run request.
    /// - `decoder`: An optional service-supplied parameter decoder.
    ///
    /// # Errors
    /// This function errors on the first fragment that does not parse, names an unknown
    /// parameter, or carries a value that violates that parameter's invariants. The error is
    /// paired with the name of the parameter it concerns, when known.
    pub fn apply_request(&mut self, json: &Value, decoder: Option<&dyn ParameterDecoder>) -> Result<(), (Option<String>, ParameterError)> {
        if !json.is_object() {
            return Err((None, ParameterError::IllegalSetJson { got: json.to_string() }));
        }

        if let Some(params) = json.get(SET_PARAMS_KEY).and_then(Value::as_array) {
            debug!("Applying {} parameter fragment(s) to a set of {}", params.len(), self.parameters.len());
            for fragment in params {
                let name: String = match fragment.get(PARAM_NAME_KEY).and_then(Value::as_str) {
                    Some(name) => name.into(),
                    None => {
                        return Err((None, ParameterError::MissingField { field: PARAM_NAME_KEY }));
                    },
                };

                // Fragments with a full type tag (or a custom decoder in play) go through the
                // standard decoder; bare `{name, current_value}` ones are interpreted against
                // the schema parameter's own type.
                let value: Option<ParameterValue> = if fragment.get(PARAM_TYPE_KEY).is_some() || decoder.is_some() {
                    Parameter::from_json(fragment, decoder).map_err(|err| (Some(name.clone()), err))?.current().cloned()
                } else {
                    let kind: ParameterType = match self.get(&name) {
                        Some(param) => param.kind(),
                        None => {
                            return Err((Some(name.clone()), ParameterError::UnknownParameter { name }));
                        },
                    };
                    match fragment.get(PARAM_CURRENT_VALUE_KEY) {
                        Some(raw) => ParameterValue::from_json(kind, raw).map_err(|err| (Some(name.clone()), err))?,
                        None => continue,
                    }
                };

                match self.get_mut(&name) {
                    Some(param) => {
                        param.set_current(value).map_err(|err| (Some(name.clone()), err))?;
                    },
                    None => {
                        return Err((Some(name.clone()), ParameterError::UnknownParameter { name }));
                    },
                }
            }
        }
        Ok(())
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::parameter::ParameterLevel;
    use crate::value::ParameterType;

    fn search_set() -> ParameterSet {
        let mut set = ParameterSet::new();
        set.add_parameter(
            Parameter::new(ParameterType::String, "query", "Query", "The search query", ParameterLevel::Basic).with_keyword().with_group("search"),
        )
        .unwrap();
        let mut limit = Parameter::new(ParameterType::SignedInt, "limit", "Limit", "Maximum number of hits", ParameterLevel::Intermediate);
        limit.set_bounds(Some(ParameterValue::SignedInt(1)), Some(ParameterValue::SignedInt(10))).unwrap();
        limit.set_default(Some(ParameterValue::SignedInt(5))).unwrap();
        set.add_parameter(limit.with_group("search")).unwrap();
        set
    }

    #[test]
    fn names_are_unique() {
        let mut set = search_set();
        let dup = Parameter::new(ParameterType::String, "query", "Query", "", ParameterLevel::Basic);
        assert!(matches!(set.add_parameter(dup), Err(ParameterError::DuplicateParameter { .. })));
    }

    #[test]
    fn groups_are_declared_implicitly() {
        let set = search_set();
        assert_eq!(set.groups().len(), 1);
        assert_eq!(set.groups()[0].name, "search");
    }

    #[test]
    fn keyword_parameters_are_found() {
        let set = search_set();
        assert!(set.has_keyword_parameter());
        assert_eq!(set.keyword_parameters().map(Parameter::name).collect::<Vec<_>>(), vec!["query"]);
    }

    #[test]
    fn full_and_concise_roundtrips() {
        let mut set = search_set();
        set.set_current("query", Some(ParameterValue::String("septoria".into()))).unwrap();

        for concise in [false, true] {
            let json: Value = set.to_json(concise);
            let parsed = ParameterSet::from_json(&json, None).unwrap();
            assert_eq!(parsed.to_json(concise), json);
        }
    }

    #[test]
    fn apply_request_sets_and_rejects() {
        let mut set = search_set();
        set.apply_request(&json!({ "params": [{ "name": "limit", "grassroots_type_info": "signed_int", "current_value": 7 }] }), None).unwrap();
        assert_eq!(set.get("limit").unwrap().current(), Some(&ParameterValue::SignedInt(7)));

        // Bare fragments are interpreted against the schema's declared type
        set.apply_request(&json!({ "params": [{ "name": "limit", "current_value": 3 }] }), None).unwrap();
        assert_eq!(set.get("limit").unwrap().current(), Some(&ParameterValue::SignedInt(3)));

        // Out of bounds
        let err = set.apply_request(&json!({ "params": [{ "name": "limit", "grassroots_type_info": "signed_int", "current_value": 100 }] }), None);
        assert!(matches!(err, Err((Some(name), ParameterError::ValueOutOfBounds { .. })) if name == "limit"));

        // Unknown parameter
        let err = set.apply_request(&json!({ "params": [{ "name": "nope", "grassroots_type_info": "string", "current_value": "x" }] }), None);
        assert!(matches!(err, Err((Some(name), ParameterError::UnknownParameter { .. })) if name == "nope"));
    }
}

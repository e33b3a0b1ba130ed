//  OPTIONS.rs
//    by Lut99
//
//  Created:
//    18 Mar 2024, 10:12:58
//  Last edited:
//    21 Jun 2024, 16:19:47
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ParameterOption`], one entry of a parameter's
//!   enumerated option list. Options are unique by value within one
//!   parameter.
//

use serde_json::{json, Value};

use crate::errors::ParameterError;
use crate::value::{ParameterType, ParameterValue};


/***** CONSTANTS *****/
/// The key under which an option's value is stored.
pub const OPTION_VALUE_KEY: &str = "value";
/// The key under which an option's description is stored.
pub const OPTION_DESCRIPTION_KEY: &str = "description";





/***** LIBRARY *****/
/// One entry of a parameter's enumerated option list.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterOption {
    /// The value a client may choose.
    pub value: ParameterValue,
    /// An optional human-readable description of what choosing it means.
    pub description: Option<String>,
}

impl ParameterOption {
    /// Constructor for the ParameterOption.
    ///
    /// # Arguments
    /// - `value`: The value a client may choose.
    /// - `description`: An optional description of the value.
    ///
    /// # Returns
    /// A new ParameterOption instance.
    #[inline]
    pub fn new(value: ParameterValue, description: Option<String>) -> Self { Self { value, description } }

    /// Serialises this option into its wire shape.
    pub fn to_json(&self) -> Value {
        match &self.description {
            Some(description) => json!({ OPTION_VALUE_KEY: self.value.to_json(), OPTION_DESCRIPTION_KEY: description }),
            None => json!({ OPTION_VALUE_KEY: self.value.to_json() }),
        }
    }

    /// Deserialises an option of the given declared type from its wire shape.
    ///
    /// # Arguments
    /// - `kind`: The declared type of the owning parameter.
    /// - `value`: The JSON object to parse.
    ///
    /// # Errors
    /// This function errors if the object has no (non-null) value of the declared type.
    pub fn from_json(kind: ParameterType, value: &Value) -> Result<Self, ParameterError> {
        let raw: &Value = value.get(OPTION_VALUE_KEY).ok_or(ParameterError::MissingField { field: OPTION_VALUE_KEY })?;
        let parsed: ParameterValue = ParameterValue::from_json(kind, raw)?.ok_or(ParameterError::MissingField { field: OPTION_VALUE_KEY })?;
        Ok(Self { value: parsed, description: value.get(OPTION_DESCRIPTION_KEY).and_then(Value::as_str).map(String::from) })
    }
}

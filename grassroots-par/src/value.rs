//  VALUE.rs
//    by Lut99
//
//  Created:
//    18 Mar 2024, 09:40:33
//  Last edited:
//    02 Jul 2024, 13:58:20
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ParameterType`] discriminator and the typed
//!   [`ParameterValue`] that a parameter can hold. Values know how to
//!   (de)serialise themselves and how to parse themselves from user
//!   strings, so that everything above them can stay type-agnostic.
//

use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use enum_debug::EnumDebug;
use serde_json::{json, Value};
use specifications::resource::DataResource;

use crate::errors::ParameterError;


/***** HELPER FUNCTIONS *****/
/// Parses one timestamp, accepting both RFC 3339 and the bare `YYYY-MM-DDThh:mm:ss` form that
/// older clients send (interpreted as UTC).
///
/// # Arguments
/// - `raw`: The string to parse.
///
/// # Errors
/// This function errors if the string is neither form.
fn parse_time(raw: &str) -> Result<DateTime<Utc>, ParameterError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => Ok(time.with_timezone(&Utc)),
        Err(err) => match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            Ok(naive) => Ok(naive.and_utc()),
            Err(_) => Err(ParameterError::IllegalTime { raw: raw.into(), err }),
        },
    }
}





/***** LIBRARY *****/
/// The wire-level discriminator of a parameter's type.
#[derive(Clone, Copy, Debug, EnumDebug, Eq, Hash, PartialEq)]
pub enum ParameterType {
    /// A true/false flag.
    Boolean,
    /// A signed integer.
    SignedInt,
    /// An unsigned integer.
    UnsignedInt,
    /// A real number.
    Real,
    /// A free-form string.
    String,
    /// A single character.
    Char,
    /// A data resource handle.
    Resource,
    /// An arbitrary JSON fragment.
    Json,
    /// A single timestamp.
    Time,
    /// A list of timestamps.
    TimeArray,
    /// A list of strings.
    StringArray,
}

impl ParameterType {
    /// Whether values of this type have a total order (and can thus carry bounds).
    #[inline]
    pub const fn is_ordered(&self) -> bool { matches!(self, Self::SignedInt | Self::UnsignedInt | Self::Real | Self::Time) }

    /// Whether values of this type are discrete (and can thus be constrained to an option list).
    #[inline]
    pub const fn is_discrete(&self) -> bool { matches!(self, Self::Boolean | Self::SignedInt | Self::UnsignedInt | Self::String | Self::Char) }
}

impl Display for ParameterType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ParameterType::*;
        match self {
            Boolean => write!(f, "boolean"),
            SignedInt => write!(f, "signed_int"),
            UnsignedInt => write!(f, "unsigned_int"),
            Real => write!(f, "real"),
            String => write!(f, "string"),
            Char => write!(f, "char"),
            Resource => write!(f, "resource"),
            Json => write!(f, "json"),
            Time => write!(f, "time"),
            TimeArray => write!(f, "time_array"),
            StringArray => write!(f, "string_array"),
        }
    }
}
impl FromStr for ParameterType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(Self::Boolean),
            "signed_int" => Ok(Self::SignedInt),
            "unsigned_int" => Ok(Self::UnsignedInt),
            "real" => Ok(Self::Real),
            "string" => Ok(Self::String),
            "char" => Ok(Self::Char),
            "resource" => Ok(Self::Resource),
            "json" => Ok(Self::Json),
            "time" => Ok(Self::Time),
            "time_array" => Ok(Self::TimeArray),
            "string_array" => Ok(Self::StringArray),
            raw => Err(ParameterError::UnknownType { raw: raw.into() }),
        }
    }
}



/// One typed value held by a parameter (as its current value, default, bound or option).
#[derive(Clone, Debug, EnumDebug, PartialEq)]
pub enum ParameterValue {
    /// A true/false flag.
    Boolean(bool),
    /// A signed integer.
    SignedInt(i64),
    /// An unsigned integer.
    UnsignedInt(u64),
    /// A real number.
    Real(f64),
    /// A free-form string.
    String(String),
    /// A single character.
    Char(char),
    /// A data resource handle.
    Resource(DataResource),
    /// An arbitrary JSON fragment.
    Json(Value),
    /// A single timestamp.
    Time(DateTime<Utc>),
    /// A list of timestamps.
    TimeArray(Vec<DateTime<Utc>>),
    /// A list of strings.
    StringArray(Vec<String>),
}

impl ParameterValue {
    /// Returns the type discriminator of this value.
    #[inline]
    pub const fn kind(&self) -> ParameterType {
        use ParameterValue::*;
        match self {
            Boolean(_) => ParameterType::Boolean,
            SignedInt(_) => ParameterType::SignedInt,
            UnsignedInt(_) => ParameterType::UnsignedInt,
            Real(_) => ParameterType::Real,
            String(_) => ParameterType::String,
            Char(_) => ParameterType::Char,
            Resource(_) => ParameterType::Resource,
            Json(_) => ParameterType::Json,
            Time(_) => ParameterType::Time,
            TimeArray(_) => ParameterType::TimeArray,
            StringArray(_) => ParameterType::StringArray,
        }
    }

    /// Serialises this value into its wire shape.
    pub fn to_json(&self) -> Value {
        use ParameterValue::*;
        match self {
            Boolean(value) => json!(value),
            SignedInt(value) => json!(value),
            UnsignedInt(value) => json!(value),
            Real(value) => json!(value),
            String(value) => json!(value),
            Char(value) => json!(value.to_string()),
            Resource(value) => serde_json::to_value(value).unwrap_or(Value::Null),
            Json(value) => value.clone(),
            Time(value) => json!(value.to_rfc3339()),
            TimeArray(values) => Value::Array(values.iter().map(|time| json!(time.to_rfc3339())).collect()),
            StringArray(values) => json!(values),
        }
    }

    /// Deserialises a value of the given declared type from its wire shape.
    ///
    /// # Arguments
    /// - `kind`: The declared type of the owning parameter.
    /// - `value`: The JSON value to parse.
    ///
    /// # Returns
    /// The parsed value, or [`None`] if the wire value was `null` (i.e., unset).
    ///
    /// # Errors
    /// This function errors if the wire value has the wrong shape for the declared type.
    pub fn from_json(kind: ParameterType, value: &Value) -> Result<Option<Self>, ParameterError> {
        if value.is_null() {
            return Ok(None);
        }

        let illegal = || ParameterError::IllegalValue { kind, raw: value.to_string() };
        match kind {
            ParameterType::Boolean => value.as_bool().map(Self::Boolean).ok_or_else(illegal).map(Some),
            ParameterType::SignedInt => value.as_i64().map(Self::SignedInt).ok_or_else(illegal).map(Some),
            ParameterType::UnsignedInt => value.as_u64().map(Self::UnsignedInt).ok_or_else(illegal).map(Some),
            ParameterType::Real => value.as_f64().map(Self::Real).ok_or_else(illegal).map(Some),
            ParameterType::String => value.as_str().map(|s| Self::String(s.into())).ok_or_else(illegal).map(Some),
            ParameterType::Char => {
                let raw: &str = value.as_str().ok_or_else(illegal)?;
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(Self::Char(c))),
                    _ => Err(ParameterError::IllegalChar { raw: raw.into() }),
                }
            },
            ParameterType::Resource => match serde_json::from_value::<DataResource>(value.clone()) {
                Ok(resource) => Ok(Some(Self::Resource(resource))),
                // Also accept the compact 'protocol:value' string form
                Err(_) => match value.as_str() {
                    Some(raw) => {
                        Ok(Some(Self::Resource(DataResource::from_str(raw).map_err(|err| ParameterError::IllegalResource { raw: raw.into(), err })?)))
                    },
                    None => Err(illegal()),
                },
            },
            ParameterType::Json => Ok(Some(Self::Json(value.clone()))),
            ParameterType::Time => Ok(Some(Self::Time(parse_time(value.as_str().ok_or_else(illegal)?)?))),
            ParameterType::TimeArray => {
                let entries: &Vec<Value> = value.as_array().ok_or_else(illegal)?;
                let mut times: Vec<DateTime<Utc>> = Vec::with_capacity(entries.len());
                for entry in entries {
                    times.push(parse_time(entry.as_str().ok_or_else(illegal)?)?);
                }
                Ok(Some(Self::TimeArray(times)))
            },
            ParameterType::StringArray => {
                let entries: &Vec<Value> = value.as_array().ok_or_else(illegal)?;
                let mut strings: Vec<String> = Vec::with_capacity(entries.len());
                for entry in entries {
                    strings.push(entry.as_str().ok_or_else(illegal)?.into());
                }
                Ok(Some(Self::StringArray(strings)))
            },
        }
    }

    /// Parses a value of the given declared type from a user-supplied string.
    ///
    /// # Arguments
    /// - `kind`: The declared type of the owning parameter.
    /// - `raw`: The string to parse.
    ///
    /// # Returns
    /// The parsed value, or [`None`] if the string was empty (i.e., unset) and the type is not
    /// a string type itself.
    ///
    /// # Errors
    /// This function errors if the string does not parse as the declared type.
    pub fn from_display_str(kind: ParameterType, raw: &str) -> Result<Option<Self>, ParameterError> {
        if raw.is_empty() && !matches!(kind, ParameterType::String | ParameterType::Json) {
            return Ok(None);
        }

        match kind {
            ParameterType::Boolean => match raw {
                "true" | "1" => Ok(Some(Self::Boolean(true))),
                "false" | "0" => Ok(Some(Self::Boolean(false))),
                _ => Err(ParameterError::IllegalBool { raw: raw.into() }),
            },
            ParameterType::SignedInt => match i64::from_str(raw) {
                Ok(value) => Ok(Some(Self::SignedInt(value))),
                Err(err) => Err(ParameterError::IllegalInt { raw: raw.into(), err }),
            },
            ParameterType::UnsignedInt => match u64::from_str(raw) {
                Ok(value) => Ok(Some(Self::UnsignedInt(value))),
                Err(err) => Err(ParameterError::IllegalUInt { raw: raw.into(), err }),
            },
            ParameterType::Real => match f64::from_str(raw) {
                Ok(value) => Ok(Some(Self::Real(value))),
                Err(err) => Err(ParameterError::IllegalReal { raw: raw.into(), err }),
            },
            ParameterType::String => Ok(Some(Self::String(raw.into()))),
            ParameterType::Char => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(Self::Char(c))),
                    _ => Err(ParameterError::IllegalChar { raw: raw.into() }),
                }
            },
            ParameterType::Resource => match DataResource::from_str(raw) {
                Ok(resource) => Ok(Some(Self::Resource(resource))),
                Err(err) => Err(ParameterError::IllegalResource { raw: raw.into(), err }),
            },
            ParameterType::Json => match serde_json::from_str(raw) {
                Ok(value) => Ok(Some(Self::Json(value))),
                Err(_) => Ok(Some(Self::Json(Value::String(raw.into())))),
            },
            ParameterType::Time => Ok(Some(Self::Time(parse_time(raw)?))),
            ParameterType::TimeArray => {
                let mut times: Vec<DateTime<Utc>> = vec![];
                for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
                    times.push(parse_time(part)?);
                }
                Ok(Some(Self::TimeArray(times)))
            },
            ParameterType::StringArray => Ok(Some(Self::StringArray(raw.split(',').map(|part| part.trim().to_string()).collect()))),
        }
    }

    /// Compares this value to another of the same ordered type.
    ///
    /// # Arguments
    /// - `other`: The value to compare against.
    ///
    /// # Returns
    /// The ordering, or [`None`] if the two values differ in type or the type has no order.
    pub fn partial_cmp_same(&self, other: &Self) -> Option<Ordering> {
        use ParameterValue::*;
        match (self, other) {
            (SignedInt(lhs), SignedInt(rhs)) => Some(lhs.cmp(rhs)),
            (UnsignedInt(lhs), UnsignedInt(rhs)) => Some(lhs.cmp(rhs)),
            (Real(lhs), Real(rhs)) => lhs.partial_cmp(rhs),
            (Time(lhs), Time(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }
}

impl Display for ParameterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ParameterValue::*;
        match self {
            Boolean(value) => write!(f, "{value}"),
            SignedInt(value) => write!(f, "{value}"),
            UnsignedInt(value) => write!(f, "{value}"),
            Real(value) => write!(f, "{value}"),
            String(value) => write!(f, "{value}"),
            Char(value) => write!(f, "{value}"),
            Resource(value) => write!(f, "{value}"),
            Json(value) => write!(f, "{value}"),
            Time(value) => write!(f, "{}", value.to_rfc3339()),
            TimeArray(values) => write!(f, "{}", values.iter().map(|time| time.to_rfc3339()).collect::<Vec<_>>().join(",")),
            StringArray(values) => write!(f, "{}", values.join(",")),
        }
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_roundtrip_through_json() {
        let values: Vec<ParameterValue> = vec![
            ParameterValue::Boolean(true),
            ParameterValue::SignedInt(-42),
            ParameterValue::UnsignedInt(42),
            ParameterValue::Real(1.5),
            ParameterValue::String("hello".into()),
            ParameterValue::Char('x'),
            ParameterValue::Resource(DataResource::new("irods", "/tempZone/x")),
            ParameterValue::Json(json!({ "nested": [1, 2, 3] })),
            ParameterValue::StringArray(vec!["a".into(), "b".into()]),
        ];

        for value in values {
            let json: Value = value.to_json();
            let parsed: ParameterValue = ParameterValue::from_json(value.kind(), &json).unwrap().unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn null_means_unset() {
        assert_eq!(ParameterValue::from_json(ParameterType::SignedInt, &Value::Null).unwrap(), None);
        assert_eq!(ParameterValue::from_display_str(ParameterType::Real, "").unwrap(), None);
    }

    #[test]
    fn time_accepts_both_wire_forms() {
        let with_zone = ParameterValue::from_json(ParameterType::Time, &json!("2024-03-18T09:40:33+00:00")).unwrap().unwrap();
        let bare = ParameterValue::from_json(ParameterType::Time, &json!("2024-03-18T09:40:33")).unwrap().unwrap();
        assert_eq!(with_zone, bare);
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        assert!(ParameterValue::from_json(ParameterType::SignedInt, &json!("7")).is_err());
        assert!(ParameterValue::from_json(ParameterType::Char, &json!("too long")).is_err());
        assert!(ParameterValue::from_display_str(ParameterType::Boolean, "maybe").is_err());
    }

    #[test]
    fn ordered_comparison() {
        assert_eq!(ParameterValue::SignedInt(1).partial_cmp_same(&ParameterValue::SignedInt(2)), Some(Ordering::Less));
        assert_eq!(ParameterValue::String("a".into()).partial_cmp_same(&ParameterValue::String("b".into())), None);
    }
}

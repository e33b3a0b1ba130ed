//  PARAMETER.rs
//    by Lut99
//
//  Created:
//    18 Mar 2024, 10:41:19
//  Last edited:
//    02 Jul 2024, 14:21:05
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`Parameter`] itself: a named, typed, validated and
//!   JSON-round-trippable service input, with optional inclusive
//!   bounds for ordered types and an optional enumerated option list.
//

use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use enum_debug::EnumDebug;
use serde_json::{Map, Value};

use crate::errors::ParameterError;
use crate::options::ParameterOption;
use crate::value::{ParameterType, ParameterValue};


/***** CONSTANTS *****/
/// The key under which a parameter's stable name is stored.
pub const PARAM_NAME_KEY: &str = "name";
/// The key under which a parameter's display name is stored.
pub const PARAM_DISPLAY_NAME_KEY: &str = "display_name";
/// The key under which a parameter's description is stored.
pub const PARAM_DESCRIPTION_KEY: &str = "description";
/// The key under which a parameter's level is stored.
pub const PARAM_LEVEL_KEY: &str = "level";
/// The key under which a parameter's type discriminator is stored.
pub const PARAM_TYPE_KEY: &str = "grassroots_type_info";
/// The key under which a parameter's current value is stored.
pub const PARAM_CURRENT_VALUE_KEY: &str = "current_value";
/// The key under which a parameter's default value is stored.
pub const PARAM_DEFAULT_VALUE_KEY: &str = "default_value";
/// The key under which a parameter's lower bound is stored.
pub const PARAM_MIN_KEY: &str = "min";
/// The key under which a parameter's upper bound is stored.
pub const PARAM_MAX_KEY: &str = "max";
/// The key under which a parameter's option list is stored.
pub const PARAM_OPTIONS_KEY: &str = "options";
/// The key under which a parameter's keyword flag is stored.
pub const PARAM_KEYWORD_KEY: &str = "keyword";
/// The key under which a parameter's owning group is stored.
pub const PARAM_GROUP_KEY: &str = "param_set_key";





/***** AUXILLARY *****/
/// How prominently a client should surface a parameter.
#[derive(Clone, Copy, Debug, Default, EnumDebug, Eq, PartialEq)]
pub enum ParameterLevel {
    /// Shown to everyone.
    #[default]
    Basic,
    /// Shown to users who asked for more.
    Intermediate,
    /// Shown to experts only.
    Advanced,
}
impl Display for ParameterLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ParameterLevel::*;
        match self {
            Basic => write!(f, "basic"),
            Intermediate => write!(f, "intermediate"),
            Advanced => write!(f, "advanced"),
        }
    }
}
impl FromStr for ParameterLevel {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            // Tolerate the historical alias
            "simple" => Ok(Self::Basic),
            raw => Err(ParameterError::UnknownType { raw: raw.into() }),
        }
    }
}



/// A hook with which a service can take over decoding of its own parameter fragments.
///
/// The standard decoder consults this first; only if it returns [`None`] does the standard
/// shape apply.
pub trait ParameterDecoder {
    /// Attempts to decode the given parameter JSON fragment.
    ///
    /// # Arguments
    /// - `json`: The fragment to decode.
    ///
    /// # Returns
    /// [`None`] if this decoder does not recognise the fragment, or the decoded parameter
    /// (or its error) if it does.
    fn decode(&self, json: &Value) -> Option<Result<Parameter, ParameterError>>;
}





/***** LIBRARY *****/
/// A named, typed, validated service input.
///
/// Invariants upheld by the setters:
/// - the current and default values are either unset or of the declared type;
/// - if bounds exist, the current and default values lie within them;
/// - options are unique by value, and for discrete types a declared option list constrains the
///   current value to one of the options.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// The stable identifier of this parameter.
    name: String,
    /// The name a client shows for it.
    display_name: String,
    /// What the parameter does.
    description: String,
    /// How prominently a client should surface it.
    level: ParameterLevel,
    /// The declared type of its values.
    kind: ParameterType,
    /// The current value, if set.
    current: Option<ParameterValue>,
    /// The default value, if set.
    default: Option<ParameterValue>,
    /// The inclusive lower bound, if set.
    min: Option<ParameterValue>,
    /// The inclusive upper bound, if set.
    max: Option<ParameterValue>,
    /// The enumerated option list, possibly empty.
    options: Vec<ParameterOption>,
    /// Whether this parameter is a keyword sink (see RUN_KEYWORD_SERVICES).
    keyword: bool,
    /// The name of the group this parameter belongs to, if any.
    group: Option<String>,
}

impl Parameter {
    /// Constructor for the Parameter.
    ///
    /// # Arguments
    /// - `kind`: The declared type of the parameter's values.
    /// - `name`: The stable identifier.
    /// - `display_name`: The name a client shows.
    /// - `description`: What the parameter does.
    /// - `level`: How prominently a client should surface it.
    ///
    /// # Returns
    /// A new Parameter without values, bounds or options.
    pub fn new(
        kind: ParameterType,
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        level: ParameterLevel,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            level,
            kind,
            current: None,
            default: None,
            min: None,
            max: None,
            options: vec![],
            keyword: false,
            group: None,
        }
    }

    /// Builder-style helper that sets the default value.
    ///
    /// # Panics
    /// Panics if the value violates the parameter's invariants; meant for statically known
    /// schema definitions, not user input.
    pub fn with_default(mut self, value: ParameterValue) -> Self {
        if let Err(err) = self.set_default(Some(value)) {
            panic!("Illegal default for parameter '{}': {}", self.name, err);
        }
        self
    }

    /// Builder-style helper that marks this parameter as a keyword sink.
    #[inline]
    pub fn with_keyword(mut self) -> Self {
        self.keyword = true;
        self
    }

    /// Builder-style helper that assigns this parameter to a group.
    #[inline]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }



    /// The stable identifier of this parameter.
    #[inline]
    pub fn name(&self) -> &str { &self.name }

    /// The name a client shows for this parameter.
    #[inline]
    pub fn display_name(&self) -> &str { &self.display_name }

    /// What this parameter does.
    #[inline]
    pub fn description(&self) -> &str { &self.description }

    /// How prominently a client should surface this parameter.
    #[inline]
    pub fn level(&self) -> ParameterLevel { self.level }

    /// The declared type of this parameter's values.
    #[inline]
    pub fn kind(&self) -> ParameterType { self.kind }

    /// The current value, if set.
    #[inline]
    pub fn current(&self) -> Option<&ParameterValue> { self.current.as_ref() }

    /// The default value, if set.
    #[inline]
    pub fn default(&self) -> Option<&ParameterValue> { self.default.as_ref() }

    /// Whether this parameter carries bounds.
    #[inline]
    pub fn is_bounded(&self) -> bool { self.min.is_some() || self.max.is_some() }

    /// The inclusive bounds of this parameter, if any.
    #[inline]
    pub fn bounds(&self) -> (Option<&ParameterValue>, Option<&ParameterValue>) { (self.min.as_ref(), self.max.as_ref()) }

    /// The enumerated option list of this parameter.
    #[inline]
    pub fn options(&self) -> &[ParameterOption] { &self.options }

    /// Whether this parameter is a keyword sink.
    #[inline]
    pub fn is_keyword(&self) -> bool { self.keyword }

    /// The group this parameter belongs to, if any.
    #[inline]
    pub fn group(&self) -> Option<&str> { self.group.as_deref() }

    /// The value a run should use: the current value if set, else the default.
    #[inline]
    pub fn effective_value(&self) -> Option<&ParameterValue> { self.current.as_ref().or(self.default.as_ref()) }



    /// Replaces the current value, enforcing the parameter's invariants.
    ///
    /// # Arguments
    /// - `value`: The new value, or [`None`] to unset.
    ///
    /// # Errors
    /// This function errors if the value is of the wrong type, lies outside the bounds, or
    /// (for discrete types with options declared) matches none of the options.
    pub fn set_current(&mut self, value: Option<ParameterValue>) -> Result<(), ParameterError> {
        if let Some(value) = &value {
            self.check(value)?;
        }
        self.current = value;
        Ok(())
    }

    /// Replaces the default value, enforcing the parameter's invariants.
    ///
    /// # Arguments
    /// - `value`: The new default, or [`None`] to unset.
    ///
    /// # Errors
    /// This function errors under the same conditions as [`Parameter::set_current`].
    pub fn set_default(&mut self, value: Option<ParameterValue>) -> Result<(), ParameterError> {
        if let Some(value) = &value {
            self.check(value)?;
        }
        self.default = value;
        Ok(())
    }

    /// Parses and sets the current value from a user-supplied string.
    ///
    /// # Arguments
    /// - `raw`: The string to parse with the parameter's type parser. Empty strings unset the
    ///   value for non-string types.
    ///
    /// # Errors
    /// This function errors if the string does not parse, or the parsed value violates the
    /// parameter's invariants.
    pub fn set_current_from_str(&mut self, raw: &str) -> Result<(), ParameterError> {
        let value: Option<ParameterValue> = ParameterValue::from_display_str(self.kind, raw)?;
        self.set_current(value)
    }

    /// Sets the inclusive bounds of this (ordered) parameter.
    ///
    /// # Arguments
    /// - `min`: The inclusive lower bound, if any.
    /// - `max`: The inclusive upper bound, if any.
    ///
    /// # Errors
    /// This function errors if the type has no order, the bounds are of the wrong type or in
    /// the wrong order, or an already-set current/default value falls outside them.
    pub fn set_bounds(&mut self, min: Option<ParameterValue>, max: Option<ParameterValue>) -> Result<(), ParameterError> {
        if !self.kind.is_ordered() {
            return Err(ParameterError::NotOrdered { name: self.name.clone(), kind: self.kind });
        }
        for bound in [&min, &max].into_iter().flatten() {
            if bound.kind() != self.kind {
                return Err(ParameterError::TypeMismatch { name: self.name.clone(), expected: self.kind, got: bound.kind() });
            }
        }
        if let (Some(min), Some(max)) = (&min, &max) {
            if min.partial_cmp_same(max) == Some(Ordering::Greater) {
                return Err(ParameterError::IllegalBounds { name: self.name.clone(), min: min.to_string(), max: max.to_string() });
            }
        }

        let old: (Option<ParameterValue>, Option<ParameterValue>) = (self.min.take(), self.max.take());
        self.min = min;
        self.max = max;

        // Existing values must still fit
        for value in [self.current.clone(), self.default.clone()].into_iter().flatten() {
            if let Err(err) = self.check(&value) {
                (self.min, self.max) = old;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Appends an option to this parameter's enumerated option list.
    ///
    /// # Arguments
    /// - `value`: The value a client may choose.
    /// - `description`: An optional description of the value.
    ///
    /// # Errors
    /// This function errors if the value is of the wrong type or an option with the same value
    /// already exists.
    pub fn add_option(&mut self, value: ParameterValue, description: Option<String>) -> Result<(), ParameterError> {
        if value.kind() != self.kind {
            return Err(ParameterError::TypeMismatch { name: self.name.clone(), expected: self.kind, got: value.kind() });
        }
        if self.options.iter().any(|option| option.value == value) {
            return Err(ParameterError::DuplicateOptionValue { name: self.name.clone(), value: value.to_string() });
        }
        self.options.push(ParameterOption::new(value, description));
        Ok(())
    }



    /// Validates one value against this parameter's type, bounds and options.
    fn check(&self, value: &ParameterValue) -> Result<(), ParameterError> {
        if value.kind() != self.kind {
            return Err(ParameterError::TypeMismatch { name: self.name.clone(), expected: self.kind, got: value.kind() });
        }

        if self.kind.is_ordered() {
            let below = self.min.as_ref().map(|min| value.partial_cmp_same(min) == Some(Ordering::Less)).unwrap_or(false);
            let above = self.max.as_ref().map(|max| value.partial_cmp_same(max) == Some(Ordering::Greater)).unwrap_or(false);
            if below || above {
                return Err(ParameterError::ValueOutOfBounds {
                    name: self.name.clone(),
                    value: value.to_string(),
                    min: self.min.as_ref().map(ParameterValue::to_string).unwrap_or_else(|| "-inf".into()),
                    max: self.max.as_ref().map(ParameterValue::to_string).unwrap_or_else(|| "inf".into()),
                });
            }
        }

        if self.kind.is_discrete() && !self.options.is_empty() && !self.options.iter().any(|option| &option.value == value) {
            return Err(ParameterError::UnknownOptionValue { name: self.name.clone(), value: value.to_string() });
        }

        Ok(())
    }



    /// Serialises this parameter into its wire shape.
    ///
    /// # Arguments
    /// - `concise`: If true, emits only the name, type and current value (the shape used in
    ///   run requests); otherwise, emits the full schema shape.
    pub fn to_json(&self, concise: bool) -> Value {
        let mut obj: Map<String, Value> = Map::new();
        obj.insert(PARAM_NAME_KEY.into(), Value::String(self.name.clone()));
        obj.insert(PARAM_TYPE_KEY.into(), Value::String(self.kind.to_string()));
        obj.insert(PARAM_CURRENT_VALUE_KEY.into(), self.current.as_ref().map(ParameterValue::to_json).unwrap_or(Value::Null));
        if concise {
            return Value::Object(obj);
        }

        obj.insert(PARAM_DISPLAY_NAME_KEY.into(), Value::String(self.display_name.clone()));
        obj.insert(PARAM_DESCRIPTION_KEY.into(), Value::String(self.description.clone()));
        obj.insert(PARAM_LEVEL_KEY.into(), Value::String(self.level.to_string()));
        if let Some(default) = &self.default {
            obj.insert(PARAM_DEFAULT_VALUE_KEY.into(), default.to_json());
        }
        if let Some(min) = &self.min {
            obj.insert(PARAM_MIN_KEY.into(), min.to_json());
        }
        if let Some(max) = &self.max {
            obj.insert(PARAM_MAX_KEY.into(), max.to_json());
        }
        if !self.options.is_empty() {
            obj.insert(PARAM_OPTIONS_KEY.into(), Value::Array(self.options.iter().map(ParameterOption::to_json).collect()));
        }
        if self.keyword {
            obj.insert(PARAM_KEYWORD_KEY.into(), Value::Bool(true));
        }
        if let Some(group) = &self.group {
            obj.insert(PARAM_GROUP_KEY.into(), Value::String(group.clone()));
        }
        Value::Object(obj)
    }

    /// Deserialises a parameter from its wire shape.
    ///
    /// # Arguments
    /// - `json`: The JSON object to parse.
    /// - `decoder`: An optional service-supplied decoder that is consulted first.
    ///
    /// # Errors
    /// This function errors if neither the decoder nor the standard shape can make sense of
    /// the fragment, or a value violates the reconstructed parameter's invariants.
    pub fn from_json(json: &Value, decoder: Option<&dyn ParameterDecoder>) -> Result<Self, ParameterError> {
        // The owning service gets the first say
        if let Some(decoder) = decoder {
            if let Some(result) = decoder.decode(json) {
                return result.map_err(|err| ParameterError::DecoderFailed { err: Box::new(err) });
            }
        }

        let name: &str = json.get(PARAM_NAME_KEY).and_then(Value::as_str).ok_or(ParameterError::MissingField { field: PARAM_NAME_KEY })?;
        let kind: ParameterType =
            ParameterType::from_str(json.get(PARAM_TYPE_KEY).and_then(Value::as_str).ok_or(ParameterError::MissingField { field: PARAM_TYPE_KEY })?)?;
        let display_name: &str = json.get(PARAM_DISPLAY_NAME_KEY).and_then(Value::as_str).unwrap_or(name);
        let description: &str = json.get(PARAM_DESCRIPTION_KEY).and_then(Value::as_str).unwrap_or("");
        let level: ParameterLevel = match json.get(PARAM_LEVEL_KEY).and_then(Value::as_str) {
            Some(raw) => ParameterLevel::from_str(raw)?,
            None => ParameterLevel::default(),
        };

        let mut param: Self = Self::new(kind, name, display_name, description, level);
        if let (Some(min), Some(max)) = (json.get(PARAM_MIN_KEY), json.get(PARAM_MAX_KEY)) {
            param.set_bounds(ParameterValue::from_json(kind, min)?, ParameterValue::from_json(kind, max)?)?;
        } else if let Some(min) = json.get(PARAM_MIN_KEY) {
            param.set_bounds(ParameterValue::from_json(kind, min)?, None)?;
        } else if let Some(max) = json.get(PARAM_MAX_KEY) {
            param.set_bounds(None, ParameterValue::from_json(kind, max)?)?;
        }
        if let Some(options) = json.get(PARAM_OPTIONS_KEY).and_then(Value::as_array) {
            for option in options {
                let option: ParameterOption = ParameterOption::from_json(kind, option)?;
                param.add_option(option.value, option.description)?;
            }
        }
        if let Some(default) = json.get(PARAM_DEFAULT_VALUE_KEY) {
            param.set_default(ParameterValue::from_json(kind, default)?)?;
        }
        if let Some(current) = json.get(PARAM_CURRENT_VALUE_KEY) {
            param.set_current(ParameterValue::from_json(kind, current)?)?;
        }
        param.keyword = json.get(PARAM_KEYWORD_KEY).and_then(Value::as_bool).unwrap_or(false);
        param.group = json.get(PARAM_GROUP_KEY).and_then(Value::as_str).map(String::from);

        Ok(param)
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn limit_param() -> Parameter {
        let mut param = Parameter::new(ParameterType::SignedInt, "limit", "Limit", "Maximum number of hits to return", ParameterLevel::Basic);
        param.set_bounds(Some(ParameterValue::SignedInt(1)), Some(ParameterValue::SignedInt(10))).unwrap();
        param.set_default(Some(ParameterValue::SignedInt(5))).unwrap();
        param
    }

    #[test]
    fn bounds_are_enforced() {
        let mut param = limit_param();
        assert!(param.set_current(Some(ParameterValue::SignedInt(10))).is_ok());
        assert!(matches!(param.set_current(Some(ParameterValue::SignedInt(100))), Err(ParameterError::ValueOutOfBounds { .. })));
        // The rejected value must not stick
        assert_eq!(param.current(), Some(&ParameterValue::SignedInt(10)));
    }

    #[test]
    fn types_are_enforced() {
        let mut param = limit_param();
        assert!(matches!(param.set_current(Some(ParameterValue::String("ten".into()))), Err(ParameterError::TypeMismatch { .. })));
        assert!(matches!(param.set_bounds(Some(ParameterValue::Real(0.5)), None), Err(ParameterError::TypeMismatch { .. })));
    }

    #[test]
    fn options_are_unique_and_constraining() {
        let mut param = Parameter::new(ParameterType::String, "format", "Format", "Output format", ParameterLevel::Basic);
        param.add_option(ParameterValue::String("json".into()), None).unwrap();
        param.add_option(ParameterValue::String("tsv".into()), Some("Tab separated".into())).unwrap();
        assert!(matches!(param.add_option(ParameterValue::String("json".into()), None), Err(ParameterError::DuplicateOptionValue { .. })));

        assert!(param.set_current(Some(ParameterValue::String("tsv".into()))).is_ok());
        assert!(matches!(param.set_current(Some(ParameterValue::String("xml".into()))), Err(ParameterError::UnknownOptionValue { .. })));
    }

    #[test]
    fn unordered_types_refuse_bounds() {
        let mut param = Parameter::new(ParameterType::Boolean, "flag", "Flag", "", ParameterLevel::Basic);
        assert!(matches!(param.set_bounds(Some(ParameterValue::Boolean(false)), None), Err(ParameterError::NotOrdered { .. })));
    }

    #[test]
    fn full_json_roundtrip() {
        let mut param = limit_param();
        param.set_current(Some(ParameterValue::SignedInt(7))).unwrap();
        let param = param.with_group("search");

        let json: Value = param.to_json(false);
        assert_eq!(json[PARAM_TYPE_KEY], "signed_int");
        assert_eq!(json[PARAM_CURRENT_VALUE_KEY], 7);
        assert_eq!(json[PARAM_MIN_KEY], 1);

        let parsed = Parameter::from_json(&json, None).unwrap();
        assert_eq!(parsed, param);
        // And once more, to pin down stability
        assert_eq!(parsed.to_json(false), json);
    }

    #[test]
    fn concise_json_roundtrip() {
        let mut param = limit_param();
        param.set_current(Some(ParameterValue::SignedInt(3))).unwrap();

        let json: Value = param.to_json(true);
        assert_eq!(json, json!({ "name": "limit", "grassroots_type_info": "signed_int", "current_value": 3 }));

        let parsed = Parameter::from_json(&json, None).unwrap();
        assert_eq!(parsed.current(), Some(&ParameterValue::SignedInt(3)));
        assert_eq!(parsed.to_json(true), json);
    }

    #[test]
    fn custom_decoder_is_consulted_first() {
        struct FixedDecoder;
        impl ParameterDecoder for FixedDecoder {
            fn decode(&self, json: &Value) -> Option<Result<Parameter, ParameterError>> {
                json.get("magic").map(|_| Ok(Parameter::new(ParameterType::String, "magic", "Magic", "", ParameterLevel::Advanced)))
            }
        }

        let decoded = Parameter::from_json(&json!({ "magic": true }), Some(&FixedDecoder)).unwrap();
        assert_eq!(decoded.name(), "magic");

        // Non-magic fragments fall through to the standard shape
        let standard = Parameter::from_json(&json!({ "name": "x", "grassroots_type_info": "string" }), Some(&FixedDecoder)).unwrap();
        assert_eq!(standard.name(), "x");
    }
}

//  SPEC.rs
//    by Lut99
//
//  Created:
//    08 Jul 2024, 09:31:42
//  Last edited:
//    09 Jul 2024, 14:06:10
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines (public) interfaces and structs for the `grassroots-cli`
//!   crate: argument-level helper types shared by the subcommands.
//

use std::str::FromStr;

use serde_json::Value;

use crate::errors::ClientError;


/***** LIBRARY *****/
/// One `name=value` parameter argument of the `run` subcommand.
///
/// The value is parsed as JSON when possible (`limit=5` becomes the number five), and falls
/// back to a plain string otherwise (`query=septoria tritici`).
#[derive(Clone, Debug)]
pub struct ParamPair {
    /// The name of the parameter to set.
    pub name: String,
    /// The value to set it to.
    pub value: Value,
}

impl FromStr for ParamPair {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let eq: usize = match s.find('=') {
            Some(pos) => pos,
            None => {
                return Err(ClientError::IllegalParamPair { raw: s.into() });
            },
        };

        let raw: &str = &s[eq + 1..];
        let value: Value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.into()));
        Ok(Self { name: s[..eq].into(), value })
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parampair_parses_json_and_strings() {
        let pair = ParamPair::from_str("limit=5").unwrap();
        assert_eq!(pair.name, "limit");
        assert_eq!(pair.value, Value::from(5));

        let pair = ParamPair::from_str("query=septoria tritici").unwrap();
        assert_eq!(pair.value, Value::String("septoria tritici".into()));

        let pair = ParamPair::from_str("flag=true").unwrap();
        assert_eq!(pair.value, Value::Bool(true));

        assert!(ParamPair::from_str("no-equals-here").is_err());
    }
}

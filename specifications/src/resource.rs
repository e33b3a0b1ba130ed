//  RESOURCE.rs
//    by Lut99
//
//  Created:
//    14 Mar 2024, 11:41:27
//  Last edited:
//    21 Jun 2024, 16:02:14
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`DataResource`], a URI-like handle naming an input
//!   that a service can consume (e.g. `irods:...`, `inline:...`,
//!   `file:...`). Services advertise interest in a resource through
//!   their resource matcher.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};


/***** CONSTANTS *****/
/// Protocol for files local to the server.
pub const PROTOCOL_FILE: &str = "file";
/// Protocol for plain HTTP resources.
pub const PROTOCOL_HTTP: &str = "http";
/// Protocol for TLS HTTP resources.
pub const PROTOCOL_HTTPS: &str = "https";
/// Protocol for data carried inline in the request itself.
pub const PROTOCOL_INLINE: &str = "inline";
/// Protocol for iRODS data objects.
pub const PROTOCOL_IRODS: &str = "irods";
/// Protocol for bare query strings (used by keyword searches).
pub const PROTOCOL_STRING: &str = "string";





/***** ERRORS *****/
/// Errors that relate to parsing DataResources from strings.
#[derive(Debug)]
pub enum DataResourceParseError {
    /// Missing the colon separator (':') between the protocol and the value.
    MissingColon { raw: String },
    /// The protocol part was empty.
    EmptyProtocol { raw: String },
}
impl Display for DataResourceParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use DataResourceParseError::*;
        match self {
            MissingColon { raw } => write!(f, "Missing ':' separator in data resource '{raw}'"),
            EmptyProtocol { raw } => write!(f, "Data resource '{raw}' has an empty protocol"),
        }
    }
}
impl Error for DataResourceParseError {}





/***** LIBRARY *****/
/// A URI-like handle naming an input to a service.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataResource {
    /// The protocol through which the data is reachable, e.g. [`PROTOCOL_IRODS`].
    pub protocol: String,
    /// The protocol-specific locator of the data.
    pub value: String,
    /// An optional human-readable title for the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DataResource {
    /// Constructor for the DataResource.
    ///
    /// # Arguments
    /// - `protocol`: The protocol through which the data is reachable.
    /// - `value`: The protocol-specific locator.
    ///
    /// # Returns
    /// A new DataResource without a title.
    #[inline]
    pub fn new(protocol: impl Into<String>, value: impl Into<String>) -> Self {
        Self { protocol: protocol.into(), value: value.into(), title: None }
    }
}

impl Display for DataResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}:{}", self.protocol, self.value) }
}
impl FromStr for DataResource {
    type Err = DataResourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let colon: usize = match s.find(':') {
            Some(pos) => pos,
            None => {
                return Err(DataResourceParseError::MissingColon { raw: s.into() });
            },
        };
        if colon == 0 {
            return Err(DataResourceParseError::EmptyProtocol { raw: s.into() });
        }

        // Be lenient towards 'proto://value' forms
        let value: &str = s[colon + 1..].strip_prefix("//").unwrap_or(&s[colon + 1..]);
        Ok(Self::new(&s[..colon], value))
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataresource_parse() {
        assert_eq!(DataResource::from_str("irods:/tempZone/wheat/sample.fastq").unwrap(), DataResource::new(PROTOCOL_IRODS, "/tempZone/wheat/sample.fastq"));
        assert_eq!(DataResource::from_str("https://grassroots.tools/data").unwrap(), DataResource::new(PROTOCOL_HTTPS, "grassroots.tools/data"));
        assert!(DataResource::from_str("no-protocol-here").is_err());
        assert!(DataResource::from_str(":empty").is_err());
    }

    #[test]
    fn dataresource_json_roundtrip() {
        let resource = DataResource { protocol: PROTOCOL_INLINE.into(), value: "ACGT".into(), title: Some("A very small genome".into()) };
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(serde_json::from_value::<DataResource>(json).unwrap(), resource);
    }
}

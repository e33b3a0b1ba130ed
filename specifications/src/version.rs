//  VERSION.rs
//    by Lut99
//
//  Created:
//    14 Mar 2024, 10:11:54
//  Last edited:
//    21 Jun 2024, 15:51:08
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`SchemaVersion`], the `{major, minor}` pair that
//!   identifies the JSON envelope contract a Grassroots server speaks.
//!   Every response carries it in the header, and clients use it to
//!   negotiate field shapes.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};


/***** CONSTANTS *****/
/// The schema version this build of the core speaks.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion { major: 0, minor: 10 };





/***** ERRORS *****/
/// Errors that relate to parsing SchemaVersions from strings.
#[derive(Debug)]
pub enum SchemaVersionParseError {
    /// Missing the dot separator ('.') between the major and minor part.
    MissingDot { raw: String },
    /// The major part was not a number.
    IllegalMajor { raw: String, err: std::num::ParseIntError },
    /// The minor part was not a number.
    IllegalMinor { raw: String, err: std::num::ParseIntError },
}
impl Display for SchemaVersionParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use SchemaVersionParseError::*;
        match self {
            MissingDot { raw } => write!(f, "Missing '.' separator in schema version '{raw}'"),
            IllegalMajor { raw, .. } => write!(f, "Illegal major version number '{raw}'"),
            IllegalMinor { raw, .. } => write!(f, "Illegal minor version number '{raw}'"),
        }
    }
}
impl Error for SchemaVersionParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use SchemaVersionParseError::*;
        match self {
            MissingDot { .. } => None,
            IllegalMajor { err, .. } => Some(err),
            IllegalMinor { err, .. } => Some(err),
        }
    }
}





/***** LIBRARY *****/
/// The version of the JSON envelope contract that a server speaks.
///
/// Note that this is deliberately _not_ the crate version; the schema evolves much slower than
/// the code does, and peers with differing crate versions but equal schema versions can still
/// be paired.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
pub struct SchemaVersion {
    /// The major version. Bumped on incompatible envelope changes.
    pub major: u32,
    /// The minor version. Bumped on backwards-compatible additions.
    pub minor: u32,
}

impl SchemaVersion {
    /// Constructor for the SchemaVersion.
    ///
    /// # Arguments
    /// - `major`: The major version number.
    /// - `minor`: The minor version number.
    ///
    /// # Returns
    /// A new SchemaVersion instance.
    #[inline]
    pub const fn new(major: u32, minor: u32) -> Self { Self { major, minor } }

    /// Checks whether this version can interpret envelopes written by the given one.
    ///
    /// # Arguments
    /// - `other`: The SchemaVersion found in some incoming envelope.
    ///
    /// # Returns
    /// True if the major versions agree (minor differences are backwards-compatible).
    #[inline]
    pub const fn is_compatible_with(&self, other: &Self) -> bool { self.major == other.major }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}.{}", self.major, self.minor) }
}
impl FromStr for SchemaVersion {
    type Err = SchemaVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dot: usize = match s.find('.') {
            Some(pos) => pos,
            None => {
                return Err(SchemaVersionParseError::MissingDot { raw: s.into() });
            },
        };

        let major: u32 = match u32::from_str(&s[..dot]) {
            Ok(major) => major,
            Err(err) => {
                return Err(SchemaVersionParseError::IllegalMajor { raw: s[..dot].into(), err });
            },
        };
        let minor: u32 = match u32::from_str(&s[dot + 1..]) {
            Ok(minor) => minor,
            Err(err) => {
                return Err(SchemaVersionParseError::IllegalMinor { raw: s[dot + 1..].into(), err });
            },
        };

        Ok(Self { major, minor })
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemaversion_parse() {
        assert_eq!(SchemaVersion::from_str("0.10").unwrap(), SchemaVersion::new(0, 10));
        assert_eq!(SchemaVersion::from_str("2.0").unwrap(), SchemaVersion::new(2, 0));
        assert!(matches!(SchemaVersion::from_str("42"), Err(SchemaVersionParseError::MissingDot { .. })));
        assert!(matches!(SchemaVersion::from_str("a.0"), Err(SchemaVersionParseError::IllegalMajor { .. })));
    }

    #[test]
    fn schemaversion_json_roundtrip() {
        let version: SchemaVersion = CURRENT_SCHEMA_VERSION;
        let json = serde_json::to_value(version).unwrap();
        assert_eq!(json, serde_json::json!({ "major": 0, "minor": 10 }));
        assert_eq!(serde_json::from_value::<SchemaVersion>(json).unwrap(), version);
    }
}

//  ERRORS.rs
//    by Lut99
//
//  Created:
//    08 Jul 2024, 09:20:16
//  Last edited:
//    09 Jul 2024, 14:04:21
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `grassroots-cli` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;


/***** LIBRARY *****/
/// Errors that relate to talking to a Grassroots server.
#[derive(Debug)]
pub enum ClientError {
    /// Failed to reach the server at all.
    RequestError { uri: String, err: reqwest::Error },
    /// The server did not answer with JSON.
    ResponseParseError { uri: String, err: reqwest::Error },
    /// The server answered with a protocol-level error.
    ServerError { uri: String, message: String },

    /// Failed to read the credentials file.
    CredentialsReadError { path: PathBuf, err: std::io::Error },
    /// Failed to parse the credentials file.
    CredentialsParseError { path: PathBuf, err: serde_json::Error },

    /// A `name=value` parameter argument was missing its '='.
    IllegalParamPair { raw: String },
    /// A job never left a live status within the polling budget.
    PollTimeout { uuid: String },
}
impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ClientError::*;
        match self {
            RequestError { uri, .. } => write!(f, "Failed to reach Grassroots server at '{uri}'"),
            ResponseParseError { uri, .. } => write!(f, "Server at '{uri}' did not answer with JSON"),
            ServerError { uri, message } => write!(f, "Server at '{uri}' rejected the request: {message}"),

            CredentialsReadError { path, .. } => write!(f, "Failed to read credentials file '{}'", path.display()),
            CredentialsParseError { path, .. } => write!(f, "Failed to parse credentials file '{}' as JSON", path.display()),

            IllegalParamPair { raw } => write!(f, "Parameter argument '{raw}' is not of the form 'name=value'"),
            PollTimeout { uuid } => write!(f, "Job '{uuid}' did not complete within the polling budget"),
        }
    }
}
impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ClientError::*;
        match self {
            RequestError { err, .. } => Some(err),
            ResponseParseError { err, .. } => Some(err),
            ServerError { .. } => None,

            CredentialsReadError { err, .. } => Some(err),
            CredentialsParseError { err, .. } => Some(err),

            IllegalParamPair { .. } => None,
            PollTimeout { .. } => None,
        }
    }
}

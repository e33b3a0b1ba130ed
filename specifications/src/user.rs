//  USER.rs
//    by Lut99
//
//  Created:
//    15 Mar 2024, 09:44:02
//  Last edited:
//    21 Jun 2024, 16:06:40
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`UserDetails`] pass-through. The core does not
//!   interpret credentials; it merely carries them from the request's
//!   `config` block to the services (and on to paired servers) that
//!   know what to do with them.
//

use serde::{Deserialize, Serialize};
use serde_json::Value;


/***** LIBRARY *****/
/// Opaque user credentials, forwarded verbatim to services and peers.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UserDetails {
    /// The raw credentials block from the request.
    pub credentials: Value,
}

impl UserDetails {
    /// Constructor for the UserDetails.
    ///
    /// # Arguments
    /// - `credentials`: The raw `credentials` block of an incoming request.
    ///
    /// # Returns
    /// A new UserDetails wrapping the block.
    #[inline]
    pub fn new(credentials: Value) -> Self { Self { credentials } }

    /// Convenience accessor for the conventional `username` field, if present.
    #[inline]
    pub fn username(&self) -> Option<&str> { self.credentials.get("username").and_then(Value::as_str) }
}

//  PROVIDER.rs
//    by Lut99
//
//  Created:
//    14 Mar 2024, 10:29:40
//  Last edited:
//    21 Jun 2024, 15:53:26
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`Provider`], the identity block of one Grassroots
//!   server. Paired-service responses carry the peer's Provider so that
//!   clients can attribute federated results to the server that
//!   produced them.
//

use serde::{Deserialize, Serialize};
use serde_json::Value;


/***** CONSTANTS *****/
/// The schema.org type tag that every serialised Provider is stamped with.
pub const PROVIDER_TYPE: &str = "so:Organization";

/// The key under which the type tag is stored.
pub const PROVIDER_TYPE_KEY: &str = "@type";





/***** LIBRARY *****/
/// The identity of one Grassroots server, typed as a schema.org Organization.
///
/// There is exactly one Provider per server; it is loaded from the `provider` block of the
/// server configuration and attached to everything the server sends out.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Provider {
    /// The human-readable name of the organisation running this server.
    pub name: String,
    /// The public URI at which this server can be reached.
    pub uri: String,
    /// A description of the organisation.
    pub description: String,
    /// An optional URI to the organisation's logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl Provider {
    /// Serialises this Provider, stamping it with its schema.org type.
    ///
    /// # Returns
    /// A JSON object with the Provider's fields plus an `@type` entry of [`PROVIDER_TYPE`].
    pub fn to_json(&self) -> Value {
        let mut json: Value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(obj) = json.as_object_mut() {
            obj.insert(PROVIDER_TYPE_KEY.into(), Value::String(PROVIDER_TYPE.into()));
        }
        json
    }

    /// Deserialises a Provider from the given JSON value.
    ///
    /// The `@type` stamp is accepted but not required.
    ///
    /// # Arguments
    /// - `value`: The JSON value to parse.
    ///
    /// # Returns
    /// The parsed Provider, or the deserialisation error if the value did not have the required shape.
    #[inline]
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> { serde_json::from_value(value.clone()) }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_stamped() {
        let provider = Provider {
            name: "Earlham Institute".into(),
            uri: "https://grassroots.tools".into(),
            description: "Field pathogenomics and wheat improvement services".into(),
            logo: None,
        };

        let json: Value = provider.to_json();
        assert_eq!(json[PROVIDER_TYPE_KEY], PROVIDER_TYPE);
        assert_eq!(json["name"], "Earlham Institute");
        assert!(json.get("logo").is_none());

        assert_eq!(Provider::from_json(&json).unwrap(), provider);
    }
}

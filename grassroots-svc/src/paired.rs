//  PAIRED.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 13:55:08
//  Last edited:
//    21 Jun 2024, 16:49:30
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`PairedService`]: the binding of a local service to
//!   its twin on a paired remote server, including the cached remote
//!   parameter set so clients can be shown the merged schema without a
//!   round-trip.
//

use grassroots_par::set::ParameterSet;
use specifications::provider::Provider;
use uuid::Uuid;


/***** LIBRARY *****/
/// The binding of a local service to its twin on a paired remote server.
#[derive(Clone, Debug)]
pub struct PairedService {
    /// The uuid of the external server hosting the twin.
    pub server_uuid: Uuid,
    /// The human-readable name of that server.
    pub server_name: String,
    /// The uri at which that server accepts requests.
    pub uri: String,
    /// The name of the twin service _on the remote server_.
    pub service_name: String,
    /// The remote parameter set as cached at pairing time, if any.
    pub params: Option<ParameterSet>,
    /// The remote server's provider, for attributing its results.
    pub provider: Option<Provider>,
}

impl PairedService {
    /// Constructor for the PairedService.
    ///
    /// # Arguments
    /// - `server_uuid`: The uuid of the external server hosting the twin.
    /// - `server_name`: The human-readable name of that server.
    /// - `uri`: The uri at which that server accepts requests.
    /// - `service_name`: The name of the twin service on the remote server.
    ///
    /// # Returns
    /// A new PairedService without a cached parameter set or provider.
    pub fn new(server_uuid: Uuid, server_name: impl Into<String>, uri: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self { server_uuid, server_name: server_name.into(), uri: uri.into(), service_name: service_name.into(), params: None, provider: None }
    }
}

//  SERVERS.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 09:21:10
//  Last edited:
//    03 Jul 2024, 13:21:40
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ExternalServer`] and the [`ServersManager`] that
//!   keeps them: the peers this server federates with, in the order
//!   they appear in the configuration (which is the order they are
//!   dispatched in).
//

use std::collections::BTreeMap;
use std::sync::Arc;

use grassroots_cfg::server::ExternalServerConfig;
use log::debug;
use specifications::provider::Provider;
use uuid::Uuid;


/***** LIBRARY *****/
/// One external Grassroots server this server federates with.
#[derive(Clone, Debug)]
pub struct ExternalServer {
    /// The stable uuid of the external server.
    pub uuid: Uuid,
    /// The human-readable name of the external server.
    pub name: String,
    /// The uri at which the external server accepts requests.
    pub uri: String,
    /// Which local services are paired with which services on the external server
    /// (local name -> remote name).
    pub paired_services: BTreeMap<String, String>,
    /// The external server's provider, if known.
    pub provider: Option<Provider>,
}

impl From<ExternalServerConfig> for ExternalServer {
    fn from(config: ExternalServerConfig) -> Self {
        Self {
            uuid: config.uuid.unwrap_or_else(Uuid::new_v4),
            name: config.name,
            uri: config.uri,
            paired_services: config.paired_services,
            provider: config.provider,
        }
    }
}



/// The set of external servers this server federates with.
#[derive(Clone, Debug, Default)]
pub struct ServersManager {
    /// The servers, in configuration (= dispatch) order.
    servers: Vec<Arc<ExternalServer>>,
}

impl ServersManager {
    /// Constructor for the ServersManager.
    ///
    /// # Arguments
    /// - `configs`: The `servers` entries of the loaded configuration.
    ///
    /// # Returns
    /// A new ServersManager with one [`ExternalServer`] per entry.
    pub fn new(configs: Vec<ExternalServerConfig>) -> Self {
        let servers: Vec<Arc<ExternalServer>> = configs.into_iter().map(|config| Arc::new(ExternalServer::from(config))).collect();
        for server in &servers {
            debug!("Registered external server '{}' ({}) at '{}'", server.name, server.uuid, server.uri);
        }
        Self { servers }
    }

    /// Returns the external server with the given uuid, if any.
    #[inline]
    pub fn get(&self, uuid: Uuid) -> Option<&Arc<ExternalServer>> { self.servers.iter().find(|server| server.uuid == uuid) }

    /// Iterates over the external servers in dispatch order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExternalServer>> { self.servers.iter() }

    /// The number of external servers known.
    #[inline]
    pub fn len(&self) -> usize { self.servers.len() }

    /// Whether no external servers are known.
    #[inline]
    pub fn is_empty(&self) -> bool { self.servers.is_empty() }
}

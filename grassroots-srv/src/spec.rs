//  SPEC.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 14:11:26
//  Last edited:
//    03 Jul 2024, 15:09:33
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines (public) interfaces and structs for the `grassroots-srv`
//!   crate; most importantly the [`Context`] that is threaded through
//!   every handler in place of global singletons.
//

use std::path::PathBuf;
use std::sync::Arc;

use specifications::provider::Provider;
use specifications::version::SchemaVersion;
use uuid::Uuid;

use crate::jobsman::JobsManager;
use crate::registry::ServiceRegistry;
use crate::servers::ServersManager;


/***** LIBRARY *****/
/// The state of one Grassroots server, threaded through every handler.
#[derive(Clone)]
pub struct Context {
    /// The uuid identifying this server instance in responses.
    pub uuid: Uuid,
    /// The schema version this server speaks.
    pub schema: SchemaVersion,
    /// The identity of this server.
    pub provider: Provider,
    /// The services this server can dispatch to.
    pub registry: Arc<ServiceRegistry>,
    /// The durable uuid -> job map.
    pub jobs: Arc<JobsManager>,
    /// The external servers this server federates with.
    pub servers: Arc<ServersManager>,
    /// The directory below which GET_RESOURCE may read, if configured.
    pub resource_root: Option<PathBuf>,
    /// The shared HTTP client for all outbound federation calls.
    pub client: reqwest::Client,
}

impl Context {
    /// Constructor for the Context.
    ///
    /// # Arguments
    /// - `schema`: The schema version this server speaks.
    /// - `provider`: The identity of this server.
    /// - `registry`: The loaded service registry.
    /// - `jobs`: The jobs manager.
    /// - `servers`: The external servers.
    ///
    /// # Returns
    /// A new Context with a fresh server uuid and HTTP client, and no resource root.
    pub fn new(
        schema: SchemaVersion,
        provider: Provider,
        registry: Arc<ServiceRegistry>,
        jobs: Arc<JobsManager>,
        servers: Arc<ServersManager>,
    ) -> Self {
        Self { uuid: Uuid::new_v4(), schema, provider, registry, jobs, servers, resource_root: None, client: reqwest::Client::new() }
    }
}

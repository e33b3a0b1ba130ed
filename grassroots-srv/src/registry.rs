//  REGISTRY.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 10:02:33
//  Last edited:
//    03 Jul 2024, 14:40:28
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ServiceRegistry`]: the set of services this server
//!   can dispatch to, built from plugin-backed services and from
//!   reference stubs (JSON files that parameterise a generic plugin).
//!   Also defines the arena-style [`PluginRegistry`] that owns the
//!   plugins themselves.
//

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use grassroots_cfg::server::GrassrootsConfig;
use grassroots_svc::linked::LinkedService;
use grassroots_svc::paired::PairedService;
use grassroots_svc::service::Service;
use log::{debug, info, warn};
use serde_json::Value;
use specifications::user::UserDetails;

use crate::errors::{PluginError, RegistryError};
use crate::matcher::{ServiceMatch, ServiceMatcher};
use crate::servers::ServersManager;


/***** CONSTANTS *****/
/// The stub key naming the backing plugin of a reference file.
pub const STUB_PLUGIN_KEY: &str = "plugin";
/// The config key declaring a service's linked-service arcs.
pub const LINKED_SERVICES_KEY: &str = "linked_services";





/***** LIBRARY *****/
/// The interface every service plugin implements.
///
/// In the native deployment these would be shared objects; here, plugins are ordinary values
/// registered at startup, and the [`PluginRegistry`] stands in for the module loader.
pub trait ServicePlugin: Send + Sync {
    /// The unique name of this plugin.
    fn name(&self) -> &str;

    /// Constructs the plugin's own services.
    ///
    /// # Errors
    /// This function errors if the plugin cannot build its services (e.g., a backing tool is
    /// missing); the registry then excludes it and carries on.
    fn get_services(&self) -> Result<Vec<Service>, PluginError>;

    /// Constructs one service per `operations` entry of the given reference stub.
    ///
    /// # Arguments
    /// - `stub`: The parsed reference stub file.
    ///
    /// # Errors
    /// The default implementation errors with
    /// [`PluginError::ReferencesNotSupported`]; plugins that can be parameterised override it.
    fn get_reference_services(&self, _stub: &Value) -> Result<Vec<Service>, PluginError> {
        Err(PluginError::ReferencesNotSupported { plugin: self.name().into() })
    }
}



/// One loaded plugin, with the number of handles given out on it.
struct PluginEntry {
    /// The plugin itself.
    plugin: Arc<dyn ServicePlugin>,
    /// How many services currently hold a handle on the plugin.
    handles: AtomicUsize,
}

/// The arena that owns all loaded plugins.
///
/// Services hold handles rather than the plugins themselves; a plugin whose handle count
/// reaches zero is eligible for unloading.
#[derive(Default)]
pub struct PluginRegistry {
    /// The loaded plugins, by name.
    plugins: BTreeMap<String, PluginEntry>,
}

impl PluginRegistry {
    /// Constructor for an empty PluginRegistry.
    #[inline]
    pub fn new() -> Self { Self::default() }

    /// Registers a plugin.
    ///
    /// # Arguments
    /// - `plugin`: The plugin to register. A plugin with the same name is replaced.
    pub fn register(&mut self, plugin: Arc<dyn ServicePlugin>) {
        debug!("Registered plugin '{}'", plugin.name());
        self.plugins.insert(plugin.name().into(), PluginEntry { plugin, handles: AtomicUsize::new(0) });
    }

    /// Acquires a handle on the named plugin.
    ///
    /// # Arguments
    /// - `name`: The name of the plugin to acquire.
    ///
    /// # Returns
    /// The plugin, or [`None`] if no plugin with that name is loaded.
    pub fn acquire(&self, name: &str) -> Option<Arc<dyn ServicePlugin>> {
        self.plugins.get(name).map(|entry| {
            entry.handles.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&entry.plugin)
        })
    }

    /// Releases a handle on the named plugin.
    ///
    /// # Arguments
    /// - `name`: The name of the plugin to release.
    ///
    /// # Returns
    /// True if this was the last handle and the plugin is now eligible for unloading.
    pub fn release(&self, name: &str) -> bool {
        match self.plugins.get(name) {
            Some(entry) => entry.handles.fetch_sub(1, Ordering::SeqCst) == 1,
            None => false,
        }
    }

    /// The number of handles currently out on the named plugin.
    #[inline]
    pub fn handle_count(&self, name: &str) -> usize { self.plugins.get(name).map(|entry| entry.handles.load(Ordering::SeqCst)).unwrap_or(0) }

    /// Iterates over the loaded plugins in name order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServicePlugin>> { self.plugins.values().map(|entry| &entry.plugin) }
}



/// One hit of a registry lookup.
#[derive(Clone, Debug)]
pub struct ServiceHit {
    /// The matched service.
    pub service: Arc<Service>,
    /// What the matcher had to say about it.
    pub matched: ServiceMatch,
}

/// The set of services this server can dispatch to.
pub struct ServiceRegistry {
    /// The services, sorted by name (case-insensitive).
    services: Vec<Arc<Service>>,
}

impl ServiceRegistry {
    /// Loads the registry: plugin services plus reference services, minus disabled ones.
    ///
    /// # Arguments
    /// - `plugins`: The plugin arena to construct services from.
    /// - `references_dir`: The directory of reference stub files, if the deployment has one.
    /// - `config_dir`: The directory of per-service config files, if the deployment has one.
    /// - `config`: The loaded server configuration (for disabled services and stub lookups).
    /// - `servers`: The external servers, whose pairing maps attach [`PairedService`]s to the
    ///   loaded services.
    ///
    /// # Returns
    /// A new ServiceRegistry with a stable, case-insensitive name order.
    ///
    /// # Errors
    /// This function errors if the references directory itself cannot be read or a stub is
    /// malformed. A plugin that fails to construct its services is logged and skipped.
    pub fn load(
        plugins: &PluginRegistry,
        references_dir: Option<&Path>,
        config_dir: Option<&Path>,
        config: &GrassrootsConfig,
        servers: &ServersManager,
    ) -> Result<Self, RegistryError> {
        let mut services: Vec<Service> = vec![];

        // Native plugin services first
        for plugin in plugins.iter() {
            match plugin.get_services() {
                Ok(built) => {
                    debug!("Plugin '{}' constructed {} service(s)", plugin.name(), built.len());
                    services.extend(built);
                },
                Err(err) => {
                    warn!("Excluding plugin '{}' from selection: {}", plugin.name(), err);
                },
            }
        }

        // Then the reference stubs
        if let Some(dir) = references_dir {
            services.extend(Self::load_references(plugins, dir)?);
        }

        // Filter the disabled ones, attach per-service config, linked arcs and pairings
        let mut loaded: Vec<Arc<Service>> = Vec::with_capacity(services.len());
        for mut service in services {
            if !config.is_service_enabled(service.name()) {
                info!("Service '{}' is disabled by configuration", service.name());
                continue;
            }

            // A config/<name> file beats whatever the plugin put in
            let config_block: Value = match config_dir {
                Some(dir) => match GrassrootsConfig::service_config(dir, service.name()) {
                    Ok(Some(block)) => block,
                    Ok(None) => service.config().clone(),
                    Err(err) => {
                        return Err(RegistryError::ServiceConfigError { service: service.name().into(), err });
                    },
                },
                None => service.config().clone(),
            };
            if let Some(linked) = config_block.get(LINKED_SERVICES_KEY) {
                let arcs: Vec<LinkedService> =
                    LinkedService::parse_list(linked).map_err(|err| RegistryError::IllegalLinkedServices { service: service.name().into(), err })?;
                service.set_linked(arcs);
            }

            for server in servers.iter() {
                if let Some(remote_name) = server.paired_services.get(service.name()) {
                    let mut paired: PairedService = PairedService::new(server.uuid, server.name.clone(), server.uri.clone(), remote_name.clone());
                    paired.provider = server.provider.clone();
                    service.add_paired(paired);
                }
            }

            loaded.push(Arc::new(service));
        }

        // Sort for the stable listing order
        loaded.sort_by(|lhs, rhs| lhs.name().to_lowercase().cmp(&rhs.name().to_lowercase()));
        info!("Loaded {} service(s)", loaded.len());
        Ok(Self { services: loaded })
    }

    /// Constructor for a registry over a fixed set of services (no stubs, no filtering).
    ///
    /// # Arguments
    /// - `services`: The services to register.
    pub fn with_services(services: Vec<Service>) -> Self {
        let mut services: Vec<Arc<Service>> = services.into_iter().map(Arc::new).collect();
        services.sort_by(|lhs, rhs| lhs.name().to_lowercase().cmp(&rhs.name().to_lowercase()));
        Self { services }
    }

    /// Reads every `.json` stub in the references directory and asks its backing plugin to
    /// construct the reference services.
    fn load_references(plugins: &PluginRegistry, dir: &Path) -> Result<Vec<Service>, RegistryError> {
        let entries = std::fs::read_dir(dir).map_err(|err| RegistryError::ReferencesDirReadError { path: dir.into(), err })?;

        let mut services: Vec<Service> = vec![];
        for entry in entries {
            let entry = entry.map_err(|err| RegistryError::ReferencesDirEntryError { path: dir.into(), err })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw: String = std::fs::read_to_string(&path).map_err(|err| RegistryError::StubReadError { path: path.clone(), err })?;
            let stub: Value = serde_json::from_str(&raw).map_err(|err| RegistryError::StubParseError { path: path.clone(), err })?;
            let plugin_name: &str = match stub.get(STUB_PLUGIN_KEY).and_then(Value::as_str) {
                Some(name) => name,
                None => {
                    return Err(RegistryError::StubMissingPlugin { path });
                },
            };

            let plugin: Arc<dyn ServicePlugin> = match plugins.acquire(plugin_name) {
                Some(plugin) => plugin,
                None => {
                    return Err(RegistryError::UnknownPlugin { path, plugin: plugin_name.into() });
                },
            };
            match plugin.get_reference_services(&stub) {
                Ok(built) => {
                    debug!("Stub '{}' constructed {} reference service(s) on plugin '{}'", path.display(), built.len(), plugin_name);
                    services.extend(built);
                },
                Err(err) => {
                    warn!("Excluding reference stub '{}' from selection: {}", path.display(), err);
                    plugins.release(plugin_name);
                },
            }
        }
        Ok(services)
    }



    /// Runs a matcher against every service.
    ///
    /// # Arguments
    /// - `matcher`: The matcher to run.
    /// - `user`: The credentials of the requesting user, if any.
    /// - `first_only`: If true, stops at the first hit.
    ///
    /// # Returns
    /// The hits, in the registry's stable name order.
    pub fn find(&self, matcher: &dyn ServiceMatcher, user: Option<&UserDetails>, first_only: bool) -> Vec<ServiceHit> {
        let mut hits: Vec<ServiceHit> = vec![];
        for service in &self.services {
            let matched: ServiceMatch = matcher.matches(service, user);
            if !matches!(matched, ServiceMatch::No) {
                hits.push(ServiceHit { service: Arc::clone(service), matched });
                if first_only {
                    break;
                }
            }
        }
        hits
    }

    /// Returns the service answering to the given name or alias, if any.
    ///
    /// # Arguments
    /// - `name`: The name (or alias) to look for.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Arc<Service>> { self.services.iter().find(|service| service.answers_to(name)) }

    /// Iterates over the services in stable name order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Service>> { self.services.iter() }

    /// The number of services loaded.
    #[inline]
    pub fn len(&self) -> usize { self.services.len() }

    /// Whether no services are loaded.
    #[inline]
    pub fn is_empty(&self) -> bool { self.services.is_empty() }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use grassroots_cfg::info::Info as _;

    use super::*;
    use crate::bundled::BundledPlugin;

    fn plugins() -> PluginRegistry {
        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(BundledPlugin));
        plugins
    }

    fn config(raw: &str) -> GrassrootsConfig { GrassrootsConfig::from_string(raw).unwrap() }

    const MINIMAL_CONFIG: &str = r#"{
        "provider": { "name": "Test", "uri": "https://grassroots.test", "description": "" }
    }"#;

    #[test]
    fn plugins_and_references_are_loaded_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wheat.json"), r#"{ "plugin": "bundled", "operations": [ { "name": "wheat_search" } ] }"#).unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not a stub").unwrap();

        let registry =
            ServiceRegistry::load(&plugins(), Some(dir.path()), None, &config(MINIMAL_CONFIG), &ServersManager::default()).unwrap();
        let names: Vec<&str> = registry.iter().map(|service| service.name()).collect();
        assert_eq!(names, vec!["delay", "echo", "wheat_search"]);
    }

    #[test]
    fn disabled_services_are_filtered_out() {
        let config = config(
            r#"{
                "provider": { "name": "Test", "uri": "https://grassroots.test", "description": "" },
                "services": { "status": { "default": true, "delay": false } }
            }"#,
        );
        let registry = ServiceRegistry::load(&plugins(), None, None, &config, &ServersManager::default()).unwrap();
        assert!(registry.get("delay").is_none());
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn pairings_are_attached_from_the_servers_map() {
        let config = config(
            r#"{
                "provider": { "name": "Test", "uri": "https://grassroots.test", "description": "" },
                "servers": [ {
                    "name": "Partner",
                    "uri": "https://partner.example/grassroots",
                    "paired_services": { "echo": "echo_remote" }
                } ]
            }"#,
        );
        let servers = ServersManager::new(config.servers.clone());
        let registry = ServiceRegistry::load(&plugins(), None, None, &config, &servers).unwrap();

        let echo = registry.get("echo").unwrap();
        assert_eq!(echo.paired().len(), 1);
        assert_eq!(echo.paired()[0].service_name, "echo_remote");
        assert_eq!(echo.paired()[0].uri, "https://partner.example/grassroots");
        assert!(registry.get("delay").unwrap().paired().is_empty());
    }

    #[test]
    fn unknown_stub_plugins_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), r#"{ "plugin": "no_such_plugin", "operations": [] }"#).unwrap();

        let err = ServiceRegistry::load(&plugins(), Some(dir.path()), None, &config(MINIMAL_CONFIG), &ServersManager::default());
        assert!(matches!(err, Err(RegistryError::UnknownPlugin { .. })));
    }

    #[test]
    fn plugin_handles_are_counted() {
        let plugins = plugins();
        assert_eq!(plugins.handle_count(crate::bundled::PLUGIN_NAME), 0);
        let _handle = plugins.acquire(crate::bundled::PLUGIN_NAME).unwrap();
        assert_eq!(plugins.handle_count(crate::bundled::PLUGIN_NAME), 1);
        assert!(plugins.release(crate::bundled::PLUGIN_NAME));
        assert_eq!(plugins.handle_count(crate::bundled::PLUGIN_NAME), 0);
    }
}

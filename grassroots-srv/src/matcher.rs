//  MATCHER.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 11:31:46
//  Last edited:
//    03 Jul 2024, 14:49:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ServiceMatcher`]s with which the registry resolves
//!   a request to services: by name or alias, by the data resource a
//!   service can consume, by backing plugin (used during reference
//!   loading) and by keyword-awareness.
//

use enum_debug::EnumDebug;
use grassroots_par::set::ParameterSet;
use grassroots_svc::service::Service;
use log::warn;
use specifications::resource::DataResource;
use specifications::user::UserDetails;


/***** LIBRARY *****/
/// What a matcher had to say about one service.
#[derive(Clone, Debug, EnumDebug)]
pub enum ServiceMatch {
    /// The service does not match.
    No,
    /// The service matches.
    Yes,
    /// The service matches and volunteered a pre-populated parameter set for the resource.
    Interested(ParameterSet),
}

/// The interface every matcher implements; run against every candidate service.
pub trait ServiceMatcher {
    /// Examines one service.
    ///
    /// # Arguments
    /// - `service`: The candidate service.
    /// - `user`: The credentials of the requesting user, if any.
    ///
    /// # Returns
    /// Whether (and how) the service matches.
    fn matches(&self, service: &Service, user: Option<&UserDetails>) -> ServiceMatch;
}



/// Matches a service by exact name, falling back to its alias.
#[derive(Clone, Debug)]
pub struct NameOrAliasMatcher {
    /// The name to look for.
    pub name: String,
}
impl NameOrAliasMatcher {
    /// Constructor for the NameOrAliasMatcher.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}
impl ServiceMatcher for NameOrAliasMatcher {
    fn matches(&self, service: &Service, _user: Option<&UserDetails>) -> ServiceMatch {
        if service.answers_to(&self.name) { ServiceMatch::Yes } else { ServiceMatch::No }
    }
}



/// Matches a service by whether it can consume a given data resource.
#[derive(Clone, Debug)]
pub struct ResourceMatcher {
    /// The resource to offer around.
    pub resource: DataResource,
}
impl ResourceMatcher {
    /// Constructor for the ResourceMatcher.
    #[inline]
    pub fn new(resource: DataResource) -> Self { Self { resource } }
}
impl ServiceMatcher for ResourceMatcher {
    fn matches(&self, service: &Service, user: Option<&UserDetails>) -> ServiceMatch {
        match service.handler().match_resource(&self.resource, user) {
            Ok(Some(params)) => ServiceMatch::Interested(params),
            Ok(None) => ServiceMatch::No,
            Err(err) => {
                warn!("Service '{}' failed to examine resource '{}': {}", service.name(), self.resource, err);
                ServiceMatch::No
            },
        }
    }
}



/// Matches a service by the plugin that created it.
#[derive(Clone, Debug)]
pub struct PluginNameMatcher {
    /// The plugin name to look for.
    pub plugin: String,
}
impl PluginNameMatcher {
    /// Constructor for the PluginNameMatcher.
    #[inline]
    pub fn new(plugin: impl Into<String>) -> Self { Self { plugin: plugin.into() } }
}
impl ServiceMatcher for PluginNameMatcher {
    fn matches(&self, service: &Service, _user: Option<&UserDetails>) -> ServiceMatch {
        if service.plugin() == self.plugin { ServiceMatch::Yes } else { ServiceMatch::No }
    }
}



/// Matches a service by its plugin _and_ its own name (used to find one operation of a
/// reference plugin).
#[derive(Clone, Debug)]
pub struct PluginOperationMatcher {
    /// The plugin name to look for.
    pub plugin: String,
    /// The operation (service) name to look for.
    pub operation: String,
}
impl PluginOperationMatcher {
    /// Constructor for the PluginOperationMatcher.
    #[inline]
    pub fn new(plugin: impl Into<String>, operation: impl Into<String>) -> Self { Self { plugin: plugin.into(), operation: operation.into() } }
}
impl ServiceMatcher for PluginOperationMatcher {
    fn matches(&self, service: &Service, _user: Option<&UserDetails>) -> ServiceMatch {
        if service.plugin() == self.plugin && service.answers_to(&self.operation) { ServiceMatch::Yes } else { ServiceMatch::No }
    }
}



/// Matches every service whose parameter schema contains a keyword-typed parameter.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordMatcher;
impl ServiceMatcher for KeywordMatcher {
    fn matches(&self, service: &Service, user: Option<&UserDetails>) -> ServiceMatch {
        match service.handler().parameters(user) {
            Ok(params) if params.has_keyword_parameter() => ServiceMatch::Yes,
            Ok(_) => ServiceMatch::No,
            Err(err) => {
                warn!("Service '{}' failed to build its parameter schema: {}", service.name(), err);
                ServiceMatch::No
            },
        }
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundled::BundledPlugin;
    use crate::registry::{ServicePlugin as _, ServiceRegistry};

    fn registry() -> ServiceRegistry { ServiceRegistry::with_services(BundledPlugin.get_services().unwrap()) }

    #[test]
    fn by_name_returns_at_most_one() {
        let registry = registry();
        let hits = registry.find(&NameOrAliasMatcher::new("echo"), None, true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].service.name(), "echo");
        assert!(registry.find(&NameOrAliasMatcher::new("blast"), None, true).is_empty());
    }

    #[test]
    fn by_resource_may_return_many() {
        let registry = registry();
        let matcher = ResourceMatcher::new(DataResource::new("inline", "ACGT"));
        let hits = registry.find(&matcher, None, false);
        // Only the echo service volunteers for inline data, with a pre-populated set
        assert_eq!(hits.len(), 1);
        assert!(matches!(&hits[0].matched, ServiceMatch::Interested(params) if params.get("text").is_some()));
    }

    #[test]
    fn by_keyword_finds_every_keyword_sink() {
        let registry = registry();
        let hits = registry.find(&KeywordMatcher, None, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].service.name(), "echo");
    }

    #[test]
    fn by_plugin_and_operation() {
        let registry = registry();
        assert_eq!(registry.find(&PluginNameMatcher::new("bundled"), None, false).len(), 2);
        assert!(registry.find(&PluginNameMatcher::new("irods"), None, false).is_empty());

        let hits = registry.find(&PluginOperationMatcher::new("bundled", "delay"), None, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].service.name(), "delay");
    }
}

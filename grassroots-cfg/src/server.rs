//  SERVER.rs
//    by Lut99
//
//  Created:
//    22 Mar 2024, 10:14:02
//  Last edited:
//    03 Jul 2024, 09:55:18
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the model of the `grassroots.config` file: the server's
//!   provider identity, the schema version it speaks, which services
//!   are enabled, how jobs and servers are managed and which external
//!   peers it federates with.
//

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use specifications::provider::Provider;
use specifications::version::{SchemaVersion, CURRENT_SCHEMA_VERSION};
use uuid::Uuid;

use crate::info::Info;


/***** ERRORS *****/
/// Errors that relate to loading per-service configuration files.
#[derive(Debug)]
pub enum ServiceConfigError {
    /// Failed to read the per-service config file.
    FileReadError { path: PathBuf, err: std::io::Error },
    /// Failed to parse the per-service config file.
    FileParseError { path: PathBuf, err: serde_json::Error },
}
impl Display for ServiceConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ServiceConfigError::*;
        match self {
            FileReadError { path, .. } => write!(f, "Failed to read service config file '{}'", path.display()),
            FileParseError { path, .. } => write!(f, "Failed to parse service config file '{}' as JSON", path.display()),
        }
    }
}
impl Error for ServiceConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ServiceConfigError::*;
        match self {
            FileReadError { err, .. } => Some(err),
            FileParseError { err, .. } => Some(err),
        }
    }
}





/***** HELPER FUNCTIONS *****/
/// Serde default for [`ServicesStatus::default_enabled`].
#[inline]
const fn default_true() -> bool { true }

/// Serde default for [`GrassrootsConfig::schema`].
#[inline]
const fn default_schema() -> SchemaVersion { CURRENT_SCHEMA_VERSION }





/***** AUXILLARY *****/
/// The `admin` block of the config.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Administrative settings of the jobs manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<JobsAdminConfig>,
}

/// The `admin.jobs` block of the config.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobsAdminConfig {
    /// The uri at which jobs can be inspected by administrators.
    pub uri: String,
}

/// The `services.status` block: which services are enabled.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServicesStatus {
    /// The status of services not mentioned by name.
    #[serde(default = "default_true", rename = "default")]
    pub default_enabled: bool,
    /// Per-service overrides.
    #[serde(default, flatten)]
    pub overrides: HashMap<String, bool>,
}
impl Default for ServicesStatus {
    fn default() -> Self { Self { default_enabled: true, overrides: HashMap::new() } }
}
impl ServicesStatus {
    /// Whether the named service is enabled under this status table.
    #[inline]
    pub fn is_enabled(&self, name: &str) -> bool { self.overrides.get(name).copied().unwrap_or(self.default_enabled) }
}

/// The `services` block of the config.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    /// Which services are enabled.
    #[serde(default)]
    pub status: ServicesStatus,
}

/// The `resources` block of the config.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResourcesConfig {
    /// The directory below which GET_RESOURCE may read.
    pub root: PathBuf,
}

/// One entry of the `servers` block: an external Grassroots server to federate with.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExternalServerConfig {
    /// The stable uuid of the external server. Generated at load time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// The human-readable name of the external server.
    pub name: String,
    /// The uri at which the external server accepts requests.
    pub uri: String,
    /// Which local services are paired with which services on the external server.
    #[serde(default)]
    pub paired_services: BTreeMap<String, String>,
    /// The external server's provider, if known ahead of time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}





/***** LIBRARY *****/
/// The model of the `grassroots.config` file.
///
/// Loading happens through the [`Info`](crate::info::Info) machinery; a load that does not
/// yield a config is always an error, and the server refuses to start on one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GrassrootsConfig {
    /// The identity of this server.
    pub provider: Provider,
    /// The schema version this server speaks.
    #[serde(default = "default_schema")]
    pub schema: SchemaVersion,
    /// Administrative settings.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Which services are enabled.
    #[serde(default)]
    pub services: ServicesConfig,
    /// The jobs-manager backend to use (`memory` or a path for the file backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs_manager: Option<String>,
    /// The servers-manager backend to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers_manager: Option<String>,
    /// The external servers to federate with.
    #[serde(default)]
    pub servers: Vec<ExternalServerConfig>,
    /// Where GET_RESOURCE may read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesConfig>,
}
impl Info for GrassrootsConfig {}

impl GrassrootsConfig {
    /// Whether the named service is enabled under this config.
    #[inline]
    pub fn is_service_enabled(&self, name: &str) -> bool { self.services.status.is_enabled(name) }

    /// Loads the per-service configuration of the named service, if there is one.
    ///
    /// The file lives at `<config_dir>/<name>` (or `<config_dir>/<name>.json`); a missing file
    /// simply means the service has no extra configuration.
    ///
    /// # Arguments
    /// - `config_dir`: The directory holding per-service configuration files.
    /// - `name`: The name of the service to load the configuration of.
    ///
    /// # Returns
    /// The parsed configuration, or [`None`] if no file exists.
    ///
    /// # Errors
    /// This function errors if a file exists but cannot be read or parsed.
    pub fn service_config(config_dir: &Path, name: &str) -> Result<Option<Value>, ServiceConfigError> {
        let mut path: PathBuf = config_dir.join(name);
        if !path.is_file() {
            path = config_dir.join(format!("{name}.json"));
            if !path.is_file() {
                return Ok(None);
            }
        }

        debug!("Loading per-service config '{}'", path.display());
        let raw: String = std::fs::read_to_string(&path).map_err(|err| ServiceConfigError::FileReadError { path: path.clone(), err })?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => Err(ServiceConfigError::FileParseError { path, err }),
        }
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn example_config() -> &'static str {
        r#"{
            "provider": { "name": "Earlham Institute", "uri": "https://grassroots.tools", "description": "Wheat services" },
            "schema": { "major": 0, "minor": 10 },
            "admin": { "jobs": { "uri": "https://grassroots.tools/admin/jobs" } },
            "services": { "status": { "default": true, "irods_search": false } },
            "jobs_manager": "memory",
            "servers": [
                {
                    "name": "Partner node",
                    "uri": "https://partner.example/grassroots",
                    "paired_services": { "blast": "blast_remote" }
                }
            ]
        }"#
    }

    #[test]
    fn config_parses() {
        let config = GrassrootsConfig::from_string(example_config()).unwrap();
        assert_eq!(config.provider.name, "Earlham Institute");
        assert_eq!(config.schema, SchemaVersion::new(0, 10));
        assert!(config.is_service_enabled("blast"));
        assert!(!config.is_service_enabled("irods_search"));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].paired_services.get("blast").map(String::as_str), Some("blast_remote"));
    }

    #[test]
    fn successful_load_yields_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grassroots.config");
        std::fs::File::create(&path).unwrap().write_all(example_config().as_bytes()).unwrap();

        // A successful load must always hand the config back
        let config = GrassrootsConfig::from_path(&path).unwrap();
        assert_eq!(config.provider.uri, "https://grassroots.tools");

        assert!(GrassrootsConfig::from_path(dir.path().join("nonexistent.config")).is_err());
    }

    #[test]
    fn configs_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grassroots.config");

        let config = GrassrootsConfig::from_string(example_config()).unwrap();
        config.to_path(&path).unwrap();

        let reloaded = GrassrootsConfig::from_path(&path).unwrap();
        assert_eq!(reloaded.provider, config.provider);
        assert_eq!(reloaded.schema, config.schema);
        assert_eq!(reloaded.servers.len(), config.servers.len());
        assert!(!reloaded.is_service_enabled("irods_search"));
    }

    #[test]
    fn service_configs_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GrassrootsConfig::service_config(dir.path(), "blast").unwrap().is_none());

        std::fs::write(dir.path().join("blast"), r#"{ "database": "wheat" }"#).unwrap();
        let config = GrassrootsConfig::service_config(dir.path(), "blast").unwrap().unwrap();
        assert_eq!(config["database"], "wheat");

        std::fs::write(dir.path().join("broken"), "{").unwrap();
        assert!(GrassrootsConfig::service_config(dir.path(), "broken").is_err());
    }
}

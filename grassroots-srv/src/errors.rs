//  ERRORS.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 08:50:24
//  Last edited:
//    03 Jul 2024, 13:16:55
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `grassroots-srv` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;

use grassroots_svc::errors::{JobError, ServiceError};
use uuid::Uuid;


/***** LIBRARY *****/
/// Errors that a plugin may raise while constructing its services.
#[derive(Debug)]
pub enum PluginError {
    /// The plugin does not construct reference services.
    ReferencesNotSupported { plugin: String },
    /// The plugin failed for its own reasons.
    Failed { plugin: String, reason: String },
    /// A reference stub was missing a field the plugin needs.
    IllegalStub { plugin: String, field: &'static str },
}
impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use PluginError::*;
        match self {
            ReferencesNotSupported { plugin } => write!(f, "Plugin '{plugin}' does not construct reference services"),
            Failed { plugin, reason } => write!(f, "Plugin '{plugin}' failed: {reason}"),
            IllegalStub { plugin, field } => write!(f, "Reference stub for plugin '{plugin}' is missing field '{field}'"),
        }
    }
}
impl Error for PluginError {}



/// Errors that relate to loading the service registry.
#[derive(Debug)]
pub enum RegistryError {
    /// Failed to read the references directory.
    ReferencesDirReadError { path: PathBuf, err: std::io::Error },
    /// Failed to read an entry in the references directory.
    ReferencesDirEntryError { path: PathBuf, err: std::io::Error },
    /// Failed to read a reference stub file.
    StubReadError { path: PathBuf, err: std::io::Error },
    /// Failed to parse a reference stub file.
    StubParseError { path: PathBuf, err: serde_json::Error },
    /// A reference stub did not name its backing plugin.
    StubMissingPlugin { path: PathBuf },
    /// A reference stub named a plugin we do not have.
    UnknownPlugin { path: PathBuf, plugin: String },
    /// A plugin failed to construct its services.
    PluginFailed { err: PluginError },
    /// A service's linked-service declarations did not parse.
    IllegalLinkedServices { service: String, err: serde_json::Error },
    /// A service's per-service config could not be loaded.
    ServiceConfigError { service: String, err: grassroots_cfg::server::ServiceConfigError },
}
impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use RegistryError::*;
        match self {
            ReferencesDirReadError { path, .. } => write!(f, "Failed to read references directory '{}'", path.display()),
            ReferencesDirEntryError { path, .. } => write!(f, "Failed to read entry in references directory '{}'", path.display()),
            StubReadError { path, .. } => write!(f, "Failed to read reference stub '{}'", path.display()),
            StubParseError { path, .. } => write!(f, "Failed to parse reference stub '{}' as JSON", path.display()),
            StubMissingPlugin { path } => write!(f, "Reference stub '{}' does not name its backing plugin", path.display()),
            UnknownPlugin { path, plugin } => write!(f, "Reference stub '{}' names unknown plugin '{plugin}'", path.display()),
            PluginFailed { .. } => write!(f, "A plugin failed to construct its services"),
            IllegalLinkedServices { service, .. } => write!(f, "Cannot parse linked-service declarations of service '{service}'"),
            ServiceConfigError { service, .. } => write!(f, "Cannot load per-service config of service '{service}'"),
        }
    }
}
impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use RegistryError::*;
        match self {
            ReferencesDirReadError { err, .. } => Some(err),
            ReferencesDirEntryError { err, .. } => Some(err),
            StubReadError { err, .. } => Some(err),
            StubParseError { err, .. } => Some(err),
            StubMissingPlugin { .. } => None,
            UnknownPlugin { .. } => None,
            PluginFailed { err } => Some(err),
            IllegalLinkedServices { err, .. } => Some(err),
            ServiceConfigError { err, .. } => Some(err),
        }
    }
}



/// Errors that relate to the jobs-manager backends.
#[derive(Debug)]
pub enum JobsBackendError {
    /// Failed to read the store file.
    FileReadError { path: PathBuf, err: std::io::Error },
    /// Failed to parse the store file.
    FileParseError { path: PathBuf, err: serde_json::Error },
    /// Failed to write the store file.
    FileWriteError { path: PathBuf, err: std::io::Error },
    /// Failed to serialize the store.
    SerializeError { err: serde_json::Error },
}
impl Display for JobsBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use JobsBackendError::*;
        match self {
            FileReadError { path, .. } => write!(f, "Failed to read jobs store '{}'", path.display()),
            FileParseError { path, .. } => write!(f, "Failed to parse jobs store '{}' as JSON", path.display()),
            FileWriteError { path, .. } => write!(f, "Failed to write jobs store '{}'", path.display()),
            SerializeError { .. } => write!(f, "Failed to serialize jobs store"),
        }
    }
}
impl Error for JobsBackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use JobsBackendError::*;
        match self {
            FileReadError { err, .. } => Some(err),
            FileParseError { err, .. } => Some(err),
            FileWriteError { err, .. } => Some(err),
            SerializeError { err } => Some(err),
        }
    }
}



/// Errors that relate to the jobs manager itself.
#[derive(Debug)]
pub enum JobsManagerError {
    /// The backend refused an operation.
    Backend { err: JobsBackendError },
    /// A stored job could not be rehydrated.
    Rehydrate { uuid: Uuid, err: JobError },
    /// A service's custom deserialiser rejected a stored job.
    CustomRehydrate { uuid: Uuid, err: ServiceError },
}
impl Display for JobsManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use JobsManagerError::*;
        match self {
            Backend { .. } => write!(f, "The jobs backend refused an operation"),
            Rehydrate { uuid, .. } => write!(f, "Cannot rehydrate stored job '{uuid}'"),
            CustomRehydrate { uuid, .. } => write!(f, "The owning service rejected stored job '{uuid}'"),
        }
    }
}
impl Error for JobsManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use JobsManagerError::*;
        match self {
            Backend { err } => Some(err),
            Rehydrate { err, .. } => Some(err),
            CustomRehydrate { err, .. } => Some(err),
        }
    }
}

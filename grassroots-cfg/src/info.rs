//  INFO.rs
//    by Lut99
//
//  Created:
//    22 Mar 2024, 09:40:21
//  Last edited:
//    12 Jul 2024, 10:23:17
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`Info`]-trait with which the disk-stored Grassroots
//!   configuration files are loaded and saved. Everything Grassroots
//!   keeps on disk is JSON, so the trait is JSON-specific: implementors
//!   only opt in, the (de)serialisation itself is provided.
//

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FResult};
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;


/***** ERRORS *****/
/// Defines the errors that may occur when loading or saving configuration files.
#[derive(Debug)]
pub enum InfoError {
    /// Failed to open the input file.
    InputOpenError { path: PathBuf, err: std::io::Error },
    /// The input file was not valid JSON for this config.
    FileDeserializeError { path: PathBuf, err: serde_json::Error },
    /// The given string was not valid JSON for this config.
    StringDeserializeError { err: serde_json::Error },

    /// Failed to create the output file.
    OutputCreateError { path: PathBuf, err: std::io::Error },
    /// Failed to write the config to the output file.
    FileSerializeError { path: PathBuf, err: serde_json::Error },
}
impl Display for InfoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use InfoError::*;
        match self {
            InputOpenError { path, .. } => write!(f, "Failed to open config file '{}'", path.display()),
            FileDeserializeError { path, .. } => write!(f, "Failed to parse config file '{}' as JSON", path.display()),
            StringDeserializeError { .. } => write!(f, "Failed to parse the given string as JSON"),

            OutputCreateError { path, .. } => write!(f, "Failed to create config file '{}'", path.display()),
            FileSerializeError { path, .. } => write!(f, "Failed to write config to file '{}'", path.display()),
        }
    }
}
impl Error for InfoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use InfoError::*;
        match self {
            InputOpenError { err, .. } => Some(err),
            FileDeserializeError { err, .. } => Some(err),
            StringDeserializeError { err } => Some(err),

            OutputCreateError { err, .. } => Some(err),
            FileSerializeError { err, .. } => Some(err),
        }
    }
}





/***** LIBRARY *****/
/// Load/save for the JSON files Grassroots keeps its configuration in.
///
/// All methods are provided; a config struct only opts in:
/// ```ignore
/// impl Info for GrassrootsConfig {}
/// ```
pub trait Info: Clone + Debug + DeserializeOwned + Serialize {
    /// Deserializes this Info from the given string.
    ///
    /// # Arguments
    /// - `raw`: The raw string to deserialize.
    ///
    /// # Errors
    /// This function errors if the string was not valid JSON for this config.
    fn from_string(raw: impl AsRef<str>) -> Result<Self, InfoError> {
        serde_json::from_str(raw.as_ref()).map_err(|err| InfoError::StringDeserializeError { err })
    }

    /// Deserializes this Info from the file at the given path.
    ///
    /// A load either yields the config or errors; there is no half-way.
    ///
    /// # Arguments
    /// - `path`: The path where to read the file from.
    ///
    /// # Errors
    /// This function errors if the file cannot be opened or its contents were not valid JSON
    /// for this config.
    fn from_path(path: impl AsRef<Path>) -> Result<Self, InfoError> {
        let path: &Path = path.as_ref();
        let handle: File = File::open(path).map_err(|err| InfoError::InputOpenError { path: path.into(), err })?;
        serde_json::from_reader(handle).map_err(|err| InfoError::FileDeserializeError { path: path.into(), err })
    }

    /// Serializes this Info to a file at the given path, pretty-printed.
    ///
    /// # Arguments
    /// - `path`: The path where to write the file to.
    ///
    /// # Errors
    /// This function errors if the file cannot be created or written.
    fn to_path(&self, path: impl AsRef<Path>) -> Result<(), InfoError> {
        let path: &Path = path.as_ref();
        let handle: File = File::create(path).map_err(|err| InfoError::OutputCreateError { path: path.into(), err })?;
        serde_json::to_writer_pretty(handle, self).map_err(|err| InfoError::FileSerializeError { path: path.into(), err })
    }
}

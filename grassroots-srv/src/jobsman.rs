//  JOBSMAN.rs
//    by Lut99
//
//  Created:
//    25 Mar 2024, 13:20:15
//  Last edited:
//    03 Jul 2024, 15:02:51
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`JobsManager`]: the server-wide, durable map from
//!   job uuid to job state, behind a pluggable [`JobsBackend`]. The
//!   manager stores jobs by (serialised) value and does not itself
//!   interpret their status.
//

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use grassroots_svc::job::{ServiceJob, JOB_SERVICE_KEY};
use grassroots_svc::service::Service;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{JobsBackendError, JobsManagerError};
use crate::registry::ServiceRegistry;


/***** LIBRARY *****/
/// The persistence interface behind the jobs manager: a key/value store keyed by uuid.
///
/// Every operation is atomic with respect to the others; `list` is a consistent snapshot.
pub trait JobsBackend: Send + Sync {
    /// Stores the given job form under the given uuid, overwriting any previous entry.
    fn put(&self, uuid: Uuid, job: Value) -> Result<(), JobsBackendError>;
    /// Retrieves the job form stored under the given uuid, if any.
    fn get(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError>;
    /// Deletes the entry under the given uuid, returning it if it existed.
    fn delete(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError>;
    /// Returns a consistent snapshot of all entries.
    fn list(&self) -> Result<Vec<(Uuid, Value)>, JobsBackendError>;
}



/// A [`JobsBackend`] that lives in memory only (jobs do not survive a restart).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// The entries themselves.
    entries: Mutex<BTreeMap<Uuid, Value>>,
}
impl MemoryBackend {
    /// Constructor for an empty MemoryBackend.
    #[inline]
    pub fn new() -> Self { Self::default() }
}
impl JobsBackend for MemoryBackend {
    fn put(&self, uuid: Uuid, job: Value) -> Result<(), JobsBackendError> {
        self.entries.lock().insert(uuid, job);
        Ok(())
    }

    fn get(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError> { Ok(self.entries.lock().get(&uuid).cloned()) }

    fn delete(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError> { Ok(self.entries.lock().remove(&uuid)) }

    fn list(&self) -> Result<Vec<(Uuid, Value)>, JobsBackendError> {
        Ok(self.entries.lock().iter().map(|(uuid, job)| (*uuid, job.clone())).collect())
    }
}



/// A [`JobsBackend`] that mirrors its entries to a JSON file, so jobs survive a restart.
#[derive(Debug)]
pub struct FileBackend {
    /// The path of the store file.
    path: PathBuf,
    /// The in-memory mirror of the store.
    entries: Mutex<BTreeMap<Uuid, Value>>,
}
impl FileBackend {
    /// Constructor for the FileBackend.
    ///
    /// # Arguments
    /// - `path`: The path of the store file. Loaded if it exists, created on first write
    ///   otherwise.
    ///
    /// # Errors
    /// This function errors if an existing store file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JobsBackendError> {
        let path: PathBuf = path.into();
        let entries: BTreeMap<Uuid, Value> = if path.is_file() {
            let raw: String = std::fs::read_to_string(&path).map_err(|err| JobsBackendError::FileReadError { path: path.clone(), err })?;
            serde_json::from_str(&raw).map_err(|err| JobsBackendError::FileParseError { path: path.clone(), err })?
        } else {
            BTreeMap::new()
        };
        debug!("Opened jobs store '{}' with {} entrie(s)", path.display(), entries.len());
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    /// Writes the whole store back to disk. Called with the entry lock held.
    fn flush(&self, entries: &BTreeMap<Uuid, Value>) -> Result<(), JobsBackendError> {
        let raw: String = serde_json::to_string_pretty(entries).map_err(|err| JobsBackendError::SerializeError { err })?;
        std::fs::write(&self.path, raw).map_err(|err| JobsBackendError::FileWriteError { path: self.path.clone(), err })
    }
}
impl JobsBackend for FileBackend {
    fn put(&self, uuid: Uuid, job: Value) -> Result<(), JobsBackendError> {
        let mut entries = self.entries.lock();
        entries.insert(uuid, job);
        self.flush(&entries)
    }

    fn get(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError> { Ok(self.entries.lock().get(&uuid).cloned()) }

    fn delete(&self, uuid: Uuid) -> Result<Option<Value>, JobsBackendError> {
        let mut entries = self.entries.lock();
        let old: Option<Value> = entries.remove(&uuid);
        if old.is_some() {
            self.flush(&entries)?;
        }
        Ok(old)
    }

    fn list(&self) -> Result<Vec<(Uuid, Value)>, JobsBackendError> {
        Ok(self.entries.lock().iter().map(|(uuid, job)| (*uuid, job.clone())).collect())
    }
}



/// The server-wide, durable map from job uuid to job state.
pub struct JobsManager {
    /// The backend actually keeping the entries.
    backend: Box<dyn JobsBackend>,
}

impl JobsManager {
    /// Constructor for the JobsManager.
    ///
    /// # Arguments
    /// - `backend`: The backend to keep the entries in.
    #[inline]
    pub fn new(backend: Box<dyn JobsBackend>) -> Self { Self { backend } }

    /// Stores the given job, overwriting any previous entry under its uuid.
    ///
    /// The owning service's custom serialiser is consulted first; without one, the standard
    /// wire shape (results included) is stored.
    ///
    /// # Arguments
    /// - `registry`: The registry to resolve the owning service in.
    /// - `job`: The job to store.
    ///
    /// # Errors
    /// This function errors if the backend refuses the write. Callers typically log and keep
    /// the job in memory, since polling still works on in-memory state.
    pub fn add(&self, registry: &ServiceRegistry, job: &ServiceJob) -> Result<(), JobsManagerError> {
        let form: Value = registry
            .get(job.service_name())
            .and_then(|service| service.handler().serialise_job(job))
            .unwrap_or_else(|| job.to_json(false));
        debug!("Storing job '{}' of service '{}'", job.uuid(), job.service_name());
        self.backend.put(job.uuid(), form).map_err(|err| JobsManagerError::Backend { err })
    }

    /// Retrieves the job stored under the given uuid, rehydrating it through the owning
    /// service's deserialiser (or the standard one).
    ///
    /// # Arguments
    /// - `registry`: The registry to resolve the owning service in.
    /// - `uuid`: The uuid to look up.
    ///
    /// # Returns
    /// The rehydrated job, or [`None`] if nothing is stored under the uuid.
    ///
    /// # Errors
    /// This function errors if the backend fails or the stored form cannot be rehydrated.
    pub fn get(&self, registry: &ServiceRegistry, uuid: Uuid) -> Result<Option<ServiceJob>, JobsManagerError> {
        let form: Value = match self.backend.get(uuid).map_err(|err| JobsManagerError::Backend { err })? {
            Some(form) => form,
            None => return Ok(None),
        };

        // The owning service gets the first say in rehydration
        let service: Option<&Arc<Service>> = form.get(JOB_SERVICE_KEY).and_then(Value::as_str).and_then(|name| registry.get(name));
        if let Some(service) = service {
            if let Some(result) = service.handler().deserialise_job(&form) {
                return result.map(Some).map_err(|err| JobsManagerError::CustomRehydrate { uuid, err });
            }
        }
        ServiceJob::from_json(&form).map(Some).map_err(|err| JobsManagerError::Rehydrate { uuid, err })
    }

    /// Deletes the entry under the given uuid.
    ///
    /// A missing key is a no-op returning not-found, not an error.
    ///
    /// # Arguments
    /// - `uuid`: The uuid to delete.
    /// - `return_job`: If true, the removed job is rehydrated (standard decoder) and handed
    ///   back.
    ///
    /// # Returns
    /// The removed job if it existed and `return_job` was set, or [`None`].
    ///
    /// # Errors
    /// This function errors if the backend fails, or the removed form cannot be rehydrated
    /// while `return_job` was set.
    pub fn remove(&self, uuid: Uuid, return_job: bool) -> Result<Option<ServiceJob>, JobsManagerError> {
        match self.backend.delete(uuid).map_err(|err| JobsManagerError::Backend { err })? {
            Some(form) if return_job => ServiceJob::from_json(&form).map(Some).map_err(|err| JobsManagerError::Rehydrate { uuid, err }),
            Some(_) => Ok(None),
            None => {
                debug!("Removing job '{uuid}': not found");
                Ok(None)
            },
        }
    }

    /// Returns a consistent snapshot of every stored job.
    ///
    /// Entries that cannot be rehydrated are logged and skipped; one rotten entry must not
    /// take the whole status page down.
    pub fn list(&self) -> Result<Vec<ServiceJob>, JobsManagerError> {
        let entries: Vec<(Uuid, Value)> = self.backend.list().map_err(|err| JobsManagerError::Backend { err })?;
        let mut jobs: Vec<ServiceJob> = Vec::with_capacity(entries.len());
        for (uuid, form) in entries {
            match ServiceJob::from_json(&form) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!("Skipping unreadable stored job '{uuid}': {err}"),
            }
        }
        Ok(jobs)
    }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use specifications::operations::OperationStatus;

    use super::*;

    fn empty_registry() -> ServiceRegistry { ServiceRegistry::with_services(vec![]) }

    #[test]
    fn add_is_idempotent_per_uuid() {
        let manager = JobsManager::new(Box::new(MemoryBackend::new()));
        let registry = empty_registry();

        let mut job = ServiceJob::new("blast", "search", None);
        job.set_status(OperationStatus::Succeeded);
        manager.add(&registry, &job).unwrap();
        manager.add(&registry, &job).unwrap();

        assert_eq!(manager.list().unwrap().len(), 1);
        assert_eq!(manager.get(&registry, job.uuid()).unwrap().unwrap().uuid(), job.uuid());
    }

    #[test]
    fn remove_missing_is_a_noop() {
        let manager = JobsManager::new(Box::new(MemoryBackend::new()));
        assert!(manager.remove(Uuid::new_v4(), true).unwrap().is_none());
    }

    #[test]
    fn file_backend_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let registry = empty_registry();

        let job = ServiceJob::new("blast", "search", None);
        {
            let manager = JobsManager::new(Box::new(FileBackend::open(&path).unwrap()));
            manager.add(&registry, &job).unwrap();
        }

        let manager = JobsManager::new(Box::new(FileBackend::open(&path).unwrap()));
        let restored = manager.get(&registry, job.uuid()).unwrap().unwrap();
        assert_eq!(restored.uuid(), job.uuid());
        assert_eq!(restored.service_name(), "blast");

        // And removal reaches the file too
        manager.remove(job.uuid(), false).unwrap();
        let manager = JobsManager::new(Box::new(FileBackend::open(&path).unwrap()));
        assert!(manager.get(&registry, job.uuid()).unwrap().is_none());
    }
}

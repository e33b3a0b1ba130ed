//  JOBSET.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 11:50:23
//  Last edited:
//    02 Jul 2024, 15:39:51
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ServiceJobSet`]: the ordered sequence of jobs owned
//!   by one service. Jobs are processed in insertion order; concurrent
//!   access is guarded by the owning service's sync primitive when it
//!   has one.
//

use serde_json::Value;
use specifications::operations::OperationStatus;
use uuid::Uuid;

use crate::job::ServiceJob;


/***** LIBRARY *****/
/// The ordered sequence of jobs owned by one service.
#[derive(Clone, Debug)]
pub struct ServiceJobSet {
    /// The name of the owning service.
    service_name: String,
    /// The jobs, in insertion order.
    jobs: Vec<ServiceJob>,
}

impl ServiceJobSet {
    /// Constructor for an empty ServiceJobSet.
    ///
    /// # Arguments
    /// - `service_name`: The name of the owning service.
    #[inline]
    pub fn new(service_name: impl Into<String>) -> Self { Self { service_name: service_name.into(), jobs: vec![] } }

    /// Constructor for a ServiceJobSet with a single, freshly created job.
    ///
    /// # Arguments
    /// - `service_name`: The name of the owning service.
    /// - `job_name`: The human-readable name of the job.
    /// - `job_description`: An optional longer description of the job.
    ///
    /// # Returns
    /// The new set and, through [`ServiceJobSet::jobs_mut`], its single idle job.
    pub fn with_job(service_name: impl Into<String>, job_name: impl Into<String>, job_description: Option<String>) -> Self {
        let service_name: String = service_name.into();
        let job: ServiceJob = ServiceJob::new(service_name.clone(), job_name, job_description);
        Self { service_name, jobs: vec![job] }
    }

    /// The name of the owning service.
    #[inline]
    pub fn service_name(&self) -> &str { &self.service_name }

    /// Appends a job to this set.
    #[inline]
    pub fn add(&mut self, job: ServiceJob) { self.jobs.push(job); }

    /// Returns the job with the given uuid, if any.
    #[inline]
    pub fn get(&self, uuid: Uuid) -> Option<&ServiceJob> { self.jobs.iter().find(|job| job.uuid() == uuid) }

    /// Returns the job with the given uuid mutably, if any.
    #[inline]
    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut ServiceJob> { self.jobs.iter_mut().find(|job| job.uuid() == uuid) }

    /// Iterates over the jobs in insertion order.
    #[inline]
    pub fn jobs(&self) -> impl Iterator<Item = &ServiceJob> { self.jobs.iter() }

    /// Iterates mutably over the jobs in insertion order.
    #[inline]
    pub fn jobs_mut(&mut self) -> impl Iterator<Item = &mut ServiceJob> { self.jobs.iter_mut() }

    /// Moves all jobs of the given set into this one, preserving their order.
    #[inline]
    pub fn merge(&mut self, other: ServiceJobSet) { self.jobs.extend(other.jobs); }

    /// The number of jobs in this set.
    #[inline]
    pub fn len(&self) -> usize { self.jobs.len() }

    /// Whether this set has no jobs.
    #[inline]
    pub fn is_empty(&self) -> bool { self.jobs.is_empty() }

    /// Whether any job in this set is still live (pending or started).
    #[inline]
    pub fn is_live(&self) -> bool { self.jobs.iter().any(|job| job.status().is_live()) }

    /// Folds the statuses of all jobs into one aggregate status.
    ///
    /// # Returns
    /// The merged status, or [`OperationStatus::Idle`] for an empty set.
    pub fn overall_status(&self) -> OperationStatus {
        let mut jobs = self.jobs.iter();
        let first: OperationStatus = match jobs.next() {
            Some(job) => job.status(),
            None => return OperationStatus::Idle,
        };
        jobs.fold(first, |aggregate, job| aggregate.merge(job.status()))
    }

    /// Serialises every job in this set into its wire shape.
    ///
    /// # Arguments
    /// - `omit_results`: Passed through to [`ServiceJob::to_json`].
    #[inline]
    pub fn to_json(&self, omit_results: bool) -> Vec<Value> { self.jobs.iter().map(|job| job.to_json(omit_results)).collect() }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let mut set = ServiceJobSet::new("blast");
        let first = ServiceJob::new("blast", "first", None);
        let second = ServiceJob::new("blast", "second", None);
        let (id1, id2) = (first.uuid(), second.uuid());
        set.add(first);
        set.add(second);

        assert_eq!(set.jobs().map(|job| job.uuid()).collect::<Vec<_>>(), vec![id1, id2]);
        assert!(set.get(id2).is_some());
    }

    #[test]
    fn liveness_and_aggregate_status() {
        let mut set = ServiceJobSet::new("blast");
        assert_eq!(set.overall_status(), OperationStatus::Idle);

        let mut done = ServiceJob::new("blast", "done", None);
        done.set_status(OperationStatus::Succeeded);
        set.add(done);
        assert_eq!(set.overall_status(), OperationStatus::Succeeded);
        assert!(!set.is_live());

        let mut running = ServiceJob::new("blast", "running", None);
        running.set_status(OperationStatus::Started);
        set.add(running);
        assert_eq!(set.overall_status(), OperationStatus::PartiallySucceeded);
        assert!(set.is_live());
    }
}

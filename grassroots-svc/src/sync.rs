//  SYNC.rs
//    by Lut99
//
//  Created:
//    20 Mar 2024, 14:20:31
//  Last edited:
//    03 Jul 2024, 09:41:15
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the [`ServiceSync`] primitive that guards an
//!   asynchronous-attached service: a lock serialising access to the
//!   service's job set, a condition with which background tasks signal
//!   progress, and a cancellation token observed by those tasks when
//!   the service is released.
//

use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio_util::sync::CancellationToken;


/***** LIBRARY *****/
/// The synchronisation primitive of one lockable service.
///
/// All traversals and mutations of a lockable service's job set happen under
/// [`ServiceSync::lock`]. [`ServiceSync::wait_while`] lets a request thread block on a
/// background task's progress; the task calls [`ServiceSync::signal`] whenever it changed
/// something worth re-examining.
#[derive(Debug, Default)]
pub struct ServiceSync {
    /// The lock serialising access to the service's job set.
    guard: Mutex<()>,
    /// The condition with which background tasks signal progress.
    notify: Notify,
    /// The cancellation flag observed by background tasks.
    cancel: CancellationToken,
}

impl ServiceSync {
    /// Constructor for the ServiceSync.
    #[inline]
    pub fn new() -> Self { Self::default() }

    /// Acquires the service lock.
    ///
    /// # Returns
    /// A guard that releases the lock when dropped.
    #[inline]
    pub async fn lock(&self) -> MutexGuard<'_, ()> { self.guard.lock().await }

    /// Wakes every task currently blocked in [`ServiceSync::wait_while`].
    #[inline]
    pub fn signal(&self) { self.notify.notify_waiters(); }

    /// Blocks until the given predicate turns false.
    ///
    /// The predicate is re-examined after every [`ServiceSync::signal`]. The caller must not
    /// hold the service lock while waiting, or the signalling task can never make progress.
    ///
    /// # Arguments
    /// - `pred`: The condition to wait out.
    pub async fn wait_while<F: FnMut() -> bool>(&self, mut pred: F) {
        loop {
            // Register interest before examining the predicate, so a signal in between is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !pred() {
                return;
            }
            notified.await;
        }
    }

    /// Returns a clone of the cancellation token for handing to background tasks.
    #[inline]
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Flags every background task of this service to wind down, then wakes the waiters so
    /// they can observe the flag.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.notify.notify_waiters();
    }

    /// Whether this service has been flagged to wind down.
    #[inline]
    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }
}





/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_while_observes_signals() {
        let sync = Arc::new(ServiceSync::new());
        let done = Arc::new(AtomicBool::new(false));

        let task = {
            let sync = Arc::clone(&sync);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.store(true, Ordering::SeqCst);
                sync.signal();
            })
        };

        sync.wait_while(|| !done.load(Ordering::SeqCst)).await;
        assert!(done.load(Ordering::SeqCst));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn wait_while_returns_immediately_when_false() {
        let sync = ServiceSync::new();
        sync.wait_while(|| false).await;
    }

    #[tokio::test]
    async fn cancellation_is_observable() {
        let sync = ServiceSync::new();
        assert!(!sync.is_cancelled());
        let token = sync.cancellation_token();
        sync.cancel();
        assert!(token.is_cancelled());
    }
}

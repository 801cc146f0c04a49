//! Scheduling directives.
//!
//! An [`Action`] is returned by a stream's `suggest_*_action` functions and tells the driving
//! scheduler under which condition the suspended call should be re-invoked. Waiting is expressed
//! through a [`Readiness`] handle, which is a list of wakers notified by the backend whenever
//! the channel it belongs to may have become ready.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::Waker;
use parking_lot::Mutex;
use std::sync::Arc;

/// Scheduling directive.
#[derive(Clone, Debug)]
pub enum Action {
    /// Retry the call straight away, no suspension needed.
    Proceed,
    /// Suspend until the handle reports the channel as readable.
    WaitReadable(Readiness),
    /// Suspend until the handle reports the channel as writable.
    WaitWritable(Readiness),
    /// Yield to the scheduler once and retry. Used by backends without readiness primitive.
    RepeatImmediately,
}

impl Action {
    /// Returns the readiness handle to wait on, if any.
    pub fn readiness(&self) -> Option<&Readiness> {
        match self {
            Self::WaitReadable(r) | Self::WaitWritable(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_wait(&self) -> bool {
        self.readiness().is_some()
    }
}

#[derive(Default)]
struct WaitList {
    wakers: Mutex<Vec<Waker>>,
    notifications: AtomicU64,
}

/// Readiness handle.
///
/// Cloning the handle yields another reference to the same underlying wait list. Streams hand
/// out clones of one handle per direction, therefore two suggestions from the same stream
/// compare equal under [`Readiness::same_as`].
#[derive(Clone, Default)]
pub struct Readiness {
    list: Arc<WaitList>,
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("id", &self.id())
            .field("notifications", &self.notifications())
            .finish()
    }
}

impl PartialEq for Readiness {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Readiness {}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque identity of the underlying wait list.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.list) as usize
    }

    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.list, &other.list)
    }

    /// Register a waker to be woken upon the next notification.
    ///
    /// Registering a waker that would wake the same task as an already registered one is a no-op.
    /// Wakers are consumed by [`notify`](Self::notify), thus they need to be re-registered for
    /// every wait.
    pub fn register(&self, waker: &Waker) {
        let mut wakers = self.list.wakers.lock();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    /// Wake every registered waker.
    pub fn notify(&self) {
        self.list.notifications.fetch_add(1, Ordering::AcqRel);
        let wakers = core::mem::take(&mut *self.list.wakers.lock());
        // Wake outside the lock, wakers may re-register.
        for waker in wakers {
            waker.wake();
        }
    }

    /// Number of notifications issued so far.
    pub fn notifications(&self) -> u64 {
        self.list.notifications.load(Ordering::Acquire)
    }

    /// Number of currently registered wakers.
    pub fn waiting(&self) -> usize {
        self.list.wakers.lock().len()
    }
}

//! A single caller's subscription to an image load.

use std::sync::Arc;

use parking_lot::Mutex;

use super::remote_image::LoadResult;

/// Callback invoked with the outcome of a load.
pub type Completion = Box<dyn FnOnce(LoadResult) + Send + 'static>;

enum HandleState {
    Pending(Completion),
    Cancelled,
    Delivered,
}

/// Handle returned by a load request.
///
/// The caller keeps a clone to cancel; the loader keeps one to deliver. The
/// completion fires at most once: whichever of [`cancel`](Self::cancel) or
/// delivery takes the callback first wins, and the other becomes a no-op.
#[derive(Clone)]
pub struct RequestHandle {
    state: Arc<Mutex<HandleState>>,
}

impl RequestHandle {
    /// Wraps `completion` without invoking it.
    pub fn new<F>(completion: F) -> Self
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(HandleState::Pending(Box::new(completion)))),
        }
    }

    /// Drops the pending completion. No-op once delivered or already cancelled.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(*state, HandleState::Pending(_)) {
            *state = HandleState::Cancelled;
        }
    }

    /// Takes the completion and runs it with `result`.
    ///
    /// Returns `true` if a callback was invoked.
    pub(crate) fn complete(&self, result: LoadResult) -> bool {
        let taken = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, HandleState::Delivered) {
                HandleState::Pending(completion) => Some(completion),
                other => {
                    *state = other;
                    None
                }
            }
        };

        match taken {
            Some(completion) => {
                completion(result);
                true
            }
            None => false,
        }
    }

    /// Returns true while neither cancelled nor delivered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Pending(_))
    }

    /// Returns true if the caller cancelled before delivery.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Cancelled)
    }

    /// Returns true if the completion has been handed its result.
    ///
    /// For [`DeliveryContext::Queue`](super::DeliveryContext::Queue) requests
    /// this means the callback was queued, not that it has run.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Delivered)
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.state.lock() {
            HandleState::Pending(_) => "pending",
            HandleState::Cancelled => "cancelled",
            HandleState::Delivered => "delivered",
        };
        f.debug_struct("RequestHandle")
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LoadError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handle() -> (RequestHandle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handle = RequestHandle::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (handle, calls)
    }

    fn success() -> LoadResult {
        Ok(Arc::new(image::DynamicImage::new_rgb8(1, 1)))
    }

    #[test]
    fn test_new_does_not_invoke() {
        let (handle, calls) = counting_handle();
        assert!(handle.is_pending());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_complete_invokes_once() {
        let (handle, calls) = counting_handle();

        assert!(handle.complete(success()));
        assert!(!handle.complete(success()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_delivered());
    }

    #[test]
    fn test_cancel_suppresses_delivery() {
        let (handle, calls) = counting_handle();

        handle.cancel();
        assert!(!handle.complete(Err(LoadError::decode("bad"))));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (handle, _calls) = counting_handle();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancel_after_delivery_is_noop() {
        let (handle, calls) = counting_handle();
        handle.complete(success());
        handle.cancel();

        assert!(handle.is_delivered());
        assert!(!handle.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let (handle, calls) = counting_handle();
        let caller_copy = handle.clone();

        caller_copy.cancel();
        handle.complete(success());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delivers_result_value() {
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let handle = RequestHandle::new(move |result: LoadResult| {
            *s.lock() = Some(result.map(|img| img.width()));
        });

        handle.complete(Err(LoadError::decode("truncated")));

        assert_eq!(
            seen.lock().clone(),
            Some(Err(LoadError::decode("truncated")))
        );
    }

    #[test]
    fn test_cancel_complete_race_fires_at_most_once() {
        for _ in 0..500 {
            let (handle, calls) = counting_handle();
            let canceller = handle.clone();

            let cancel_thread = std::thread::spawn(move || canceller.cancel());
            let delivered = handle.complete(success());
            cancel_thread.join().unwrap();

            let fired = calls.load(Ordering::SeqCst);
            assert!(fired <= 1);
            assert_eq!(delivered, fired == 1);
            assert_eq!(handle.is_delivered(), delivered);
            assert_eq!(handle.is_cancelled(), !delivered);
        }
    }
}

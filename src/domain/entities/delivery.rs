//! Where completion callbacks run.

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

/// A callback bound to its result, ready to run on some context.
pub type DeliveryJob = Box<dyn FnOnce() + Send + 'static>;

/// Execution context a caller asks its completion to run on.
#[derive(Clone)]
pub enum DeliveryContext {
    /// Run on whichever task performs the delivery.
    Inline,
    /// Spawn onto a Tokio runtime.
    Runtime(Handle),
    /// Push onto a [`DeliveryQueue`] drained by its owner.
    ///
    /// If the queue has been dropped the callback is discarded; the request
    /// still counts as delivered.
    Queue(DeliverySender),
}

impl DeliveryContext {
    /// Returns the ambient Tokio runtime, or [`DeliveryContext::Inline`] outside one.
    #[must_use]
    pub fn current() -> Self {
        Handle::try_current().map_or(Self::Inline, Self::Runtime)
    }

    /// Runs `job` on this context.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Inline => job(),
            Self::Runtime(handle) => {
                handle.spawn(async move { job() });
            }
            Self::Queue(sender) => sender.send(Box::new(job)),
        }
    }
}

impl std::fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "Inline"),
            Self::Runtime(_) => write!(f, "Runtime"),
            Self::Queue(_) => write!(f, "Queue"),
        }
    }
}

/// Sending half of a [`DeliveryQueue`].
#[derive(Clone)]
pub struct DeliverySender(mpsc::UnboundedSender<DeliveryJob>);

impl DeliverySender {
    fn send(&self, job: DeliveryJob) {
        if self.0.send(job).is_err() {
            warn!("Delivery queue closed, dropping callback");
        }
    }
}

/// A caller-owned queue of completions, in the spirit of a UI main queue.
///
/// Callbacks dispatched to it only run when the owner drains it.
#[derive(Debug)]
pub struct DeliveryQueue {
    rx: mpsc::UnboundedReceiver<DeliveryJob>,
}

impl DeliveryQueue {
    /// Creates a queue and the context that feeds it.
    #[must_use]
    pub fn new() -> (Self, DeliveryContext) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, DeliveryContext::Queue(DeliverySender(tx)))
    }

    /// Waits for the next callback and runs it.
    ///
    /// Returns `false` once every sender is gone and the queue is empty.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs every callback already queued without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::entities::RequestHandle;
    use crate::domain::errors::LoadError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        DeliveryContext::Inline.dispatch(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queue_defers_until_drained() {
        let (mut queue, context) = DeliveryQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let c = counter.clone();
            context.dispatch(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(queue.run_pending(), 0);
    }

    #[tokio::test]
    async fn test_run_next_stops_when_senders_dropped() {
        let (mut queue, context) = DeliveryQueue::new();
        context.dispatch(|| {});
        drop(context);

        assert!(queue.run_next().await);
        assert!(!queue.run_next().await);
    }

    #[tokio::test]
    async fn test_runtime_context_spawns() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let context = DeliveryContext::current();
        assert!(matches!(context, DeliveryContext::Runtime(_)));

        context.dispatch(move || {
            let _ = tx.send(42);
        });

        assert_eq!(rx.await.ok(), Some(42));
    }

    #[test]
    fn test_current_outside_runtime_is_inline() {
        assert!(matches!(DeliveryContext::current(), DeliveryContext::Inline));
    }

    #[test]
    fn test_handle_is_delivered_when_queue_closed() {
        let (queue, context) = DeliveryQueue::new();
        drop(queue);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = RequestHandle::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let queued = handle.clone();
        let wrapped = RequestHandle::new(move |result| {
            context.dispatch(move || {
                let _ = queued.complete(result);
            });
        });

        assert!(wrapped.complete(Err(LoadError::decode("x"))));
        assert!(wrapped.is_delivered());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(handle.is_pending());
    }

    #[test]
    fn test_dispatch_to_closed_queue_is_dropped() {
        let (queue, context) = DeliveryQueue::new();
        drop(queue);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        context.dispatch(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}

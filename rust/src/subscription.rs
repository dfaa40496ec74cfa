//! Cancellable live-value streams.
//!
//! A [`Subscription`] is fed by a spawned task that publishes full snapshots into a
//! `watch` channel. Consumers only ever see the newest snapshot; intermediate ones may be
//! skipped, which is fine because every snapshot is complete on its own.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Subscription<T> {
    receiver: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
    cancelled: bool,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.cancelled)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Publisher<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        let task = tokio::spawn(producer(Publisher { sender }));
        Self {
            receiver,
            task,
            cancelled: false,
        }
    }

    /// Waits for a snapshot this handle has not returned yet.
    ///
    /// Returns `None` once the subscription is cancelled or its producer has stopped.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            if self.cancelled {
                return None;
            }
            if self.receiver.changed().await.is_err() {
                return None;
            }
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// The newest snapshot, if any has been produced.
    pub fn latest(&self) -> Option<T> {
        if self.cancelled {
            return None;
        }
        self.receiver.borrow().clone()
    }

    /// Waits until a snapshot satisfies `predicate`, checking the current one first.
    pub async fn wait_for<P>(&mut self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        if self.cancelled {
            return None;
        }
        let current = self.receiver.borrow_and_update().clone();
        if let Some(value) = current {
            if predicate(&value) {
                return Some(value);
            }
        }
        while let Some(value) = self.next().await {
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }

    /// Stops deliveries immediately. Effects already committed stay committed.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Derives a subscription whose values are `f` applied to this one's.
    /// Consecutive equal outputs are delivered once.
    pub fn map<U, F>(mut self, f: F) -> Subscription<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + 'static,
    {
        Subscription::spawn(move |publisher| async move {
            while let Some(value) = self.next().await {
                publisher.publish_if_changed(f(&value));
            }
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Producer side of a [`Subscription`].
pub(crate) struct Publisher<T> {
    sender: watch::Sender<Option<T>>,
}

impl<T> Publisher<T> {
    pub(crate) fn publish(&self, value: T) {
        self.sender.send_replace(Some(value));
    }

    pub(crate) fn publish_if_changed(&self, value: T)
    where
        T: PartialEq,
    {
        self.sender.send_if_modified(|current| {
            if current.as_ref() == Some(&value) {
                return false;
            }
            *current = Some(value);
            true
        });
    }
}

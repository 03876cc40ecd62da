use crate::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SUBJECT_CAPACITY: usize = 256;

/// Locks a mutex, carrying on with the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-producer, multi-subscriber holder of the latest value. New
/// subscribers see the current value first, then every later publish.
#[derive(Debug)]
pub struct Subject<T: Clone> {
    latest: Arc<Mutex<T>>,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            latest: self.latest.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Default> Default for Subject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone> Subject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            latest: Arc::new(Mutex::new(initial)),
            tx: broadcast::channel(SUBJECT_CAPACITY).0,
        }
    }

    pub fn latest(&self) -> T {
        lock(&self.latest).clone()
    }

    pub fn publish(&self, value: T) {
        // hold the lock across the send so subscribe() can't miss or double up
        let mut latest = lock(&self.latest);
        *latest = value.clone();
        // no receivers is fine, the value is still retained
        let _ = self.tx.send(value);
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let latest = lock(&self.latest);
        Subscription {
            initial: Some(latest.clone()),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving end of a [`Subject`]. Yields the value current at subscribe
/// time, then subsequent publishes in order.
pub struct Subscription<T: Clone> {
    initial: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Waits for the next value. Returns `None` once the subject is gone.
    /// A lagging subscriber skips straight to the newest values.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("subscriber lagged, skipped {} values", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.rx.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

use derive_more::Constructor;
use std::marker::PhantomData;

/// Abstraction over a channel sender, so agent components can be generic over exactly how an
/// item reaches its destination (unbounded, drop-oldest, etc).
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;
    type Error;
    fn send(&self, item: Self::Item) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone)]
pub struct UnboundedTx<T, Error> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
    phantom: PhantomData<Error>,
}

impl<T, Error> UnboundedTx<T, Error> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self {
            tx,
            phantom: PhantomData,
        }
    }
}

impl<T, Error> Tx for UnboundedTx<T, Error>
where
    T: Clone + Send,
    Error: From<tokio::sync::mpsc::error::SendError<T>> + Clone + Send,
{
    type Item = T;
    type Error = Error;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        self.tx.send(item).map_err(Error::from)
    }
}

#[derive(Debug, Constructor)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> Iterator for UnboundedRx<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => break Some(event),
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => continue,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => break None,
            }
        }
    }
}

impl<T> UnboundedRx<T> {
    pub fn into_stream(self) -> tokio_stream::wrappers::UnboundedReceiverStream<T> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.rx)
    }
}

/// A bounded queue that drops the oldest buffered item rather than blocking the producer when
/// full.
///
/// Used for the price-update channel (§5): a slow agent must never stall the Market Data
/// Router, and a stale price is worthless anyway once a fresher one exists. A plain
/// `tokio::sync::mpsc` bounded channel cannot express drop-oldest because the sender has no
/// access to the receiver's buffer, so this wraps a small mutex-guarded ring buffer instead,
/// signalled by a `Notify`.
#[derive(Debug, Clone)]
pub struct DropOldestTx<T> {
    inner: std::sync::Arc<DropOldestInner<T>>,
}

#[derive(Debug)]
struct DropOldestInner<T> {
    capacity: usize,
    queue: std::sync::Mutex<std::collections::VecDeque<T>>,
    notify: tokio::sync::Notify,
    closed: std::sync::atomic::AtomicBool,
}

#[derive(Debug)]
pub struct DropOldestRx<T> {
    inner: std::sync::Arc<DropOldestInner<T>>,
}

impl<T> Tx for DropOldestTx<T>
where
    T: Clone + Send,
{
    type Item = T;
    type Error = DropOldestClosed;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(DropOldestClosed);
        }

        let mut queue = self.inner.queue.lock().expect("queue mutex poisoned");
        if queue.len() >= self.inner.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
        drop(queue);
        self.inner.notify.notify_one();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("DropOldestTx receiver dropped")]
pub struct DropOldestClosed;

impl<T> DropOldestRx<T> {
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.queue.lock().expect("queue mutex poisoned");
                if let Some(item) = queue.pop_front() {
                    return Some(item);
                }
            }
            if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }
}

impl<T> Drop for DropOldestRx<T> {
    fn drop(&mut self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::Release);
    }
}

pub fn drop_oldest<T>(capacity: usize) -> (DropOldestTx<T>, DropOldestRx<T>) {
    let inner = std::sync::Arc::new(DropOldestInner {
        capacity,
        queue: std::sync::Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
        notify: tokio::sync::Notify::new(),
        closed: std::sync::atomic::AtomicBool::new(false),
    });

    (
        DropOldestTx {
            inner: inner.clone(),
        },
        DropOldestRx { inner },
    )
}

pub fn mpsc_unbounded<T, Error>() -> (UnboundedTx<T, Error>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx::new(tx), UnboundedRx::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_oldest_tx_drops_instead_of_blocking() {
        let (tx, mut rx) = drop_oldest::<i32>(1);
        tx.send(1).unwrap();
        // capacity is 1: this must not block, the old `1` is dropped in favour of `2`.
        tx.send(2).unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn drop_oldest_rx_drop_closes_sender() {
        let (tx, rx) = drop_oldest::<i32>(1);
        drop(rx);
        assert!(tx.send(1).is_err());
    }
}

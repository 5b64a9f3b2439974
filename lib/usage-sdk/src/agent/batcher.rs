use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::agent::buffer::{AddStatus, Buffer, Buffered};

#[async_trait]
pub trait FlushHandler<T>: Send + Sync {
    async fn on_flush(&self, items: Vec<Buffered<T>>);
}

#[derive(Debug, Clone, Copy)]
pub struct BatcherOptions {
    /// Flush as soon as this many items are buffered.
    pub max_items: usize,
    /// Flush whatever is buffered at this interval.
    pub max_elapsed: Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BatcherError {
    #[error("batcher has been shut down")]
    Closed,
}

struct BatcherInner<T> {
    buffer: Mutex<Buffer<T>>,
    handler: Arc<dyn FlushHandler<T>>,
}

impl<T: Send + 'static> BatcherInner<T> {
    async fn flush(&self) {
        let items = self.buffer.lock().await.drain();
        self.flush_items(items).await;
    }

    async fn flush_items(&self, items: Vec<Buffered<T>>) {
        if items.is_empty() {
            return;
        }
        debug!("flushing {} buffered items", items.len());
        self.handler.on_flush(items).await;
    }
}

/// Buffers items and hands them to a [`FlushHandler`] once `max_items` are buffered
/// or every `max_elapsed`, whichever comes first.
///
/// Requires a running tokio runtime.
pub struct Batcher<T> {
    inner: Arc<BatcherInner<T>>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl<T: Send + 'static> Batcher<T> {
    pub fn start(options: BatcherOptions, handler: Arc<dyn FlushHandler<T>>) -> Self {
        let inner = Arc::new(BatcherInner {
            buffer: Mutex::new(Buffer::new(options.max_items)),
            handler,
        });
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let interval_inner = inner.clone();
        let interval_token = token.clone();
        tracker.spawn(async move {
            let mut interval = tokio::time::interval(options.max_elapsed);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => interval_inner.flush().await,
                    _ = interval_token.cancelled() => return,
                }
            }
        });

        Self {
            inner,
            token,
            tracker,
        }
    }

    pub async fn add(&self, item: T) -> Result<(), BatcherError> {
        let mut buffer = self.inner.buffer.lock().await;

        match buffer.add(item) {
            AddStatus::Ok => Ok(()),
            AddStatus::Full { drained } => {
                // spawned while the buffer is locked, so a concurrent wait_for_all
                // either rejects the item or waits for this flush
                let inner = self.inner.clone();
                self.tracker.spawn(async move {
                    inner.flush_items(drained).await;
                });
                Ok(())
            }
            AddStatus::Closed => Err(BatcherError::Closed),
        }
    }

    /// Stops accepting items, waits for in-flight flushes and flushes the remaining items.
    pub async fn wait_for_all(&self) {
        let remaining = self.inner.buffer.lock().await.close();
        self.token.cancel();

        self.tracker.close();
        self.tracker.wait().await;

        self.inner.flush_items(remaining).await;
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.buffer.lock().await.is_closed()
    }
}

impl<T> Drop for Batcher<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Batcher, BatcherError, BatcherOptions, FlushHandler};
    use crate::agent::buffer::Buffered;

    struct ChannelHandler(mpsc::UnboundedSender<Vec<u32>>);

    #[async_trait]
    impl FlushHandler<u32> for ChannelHandler {
        async fn on_flush(&self, items: Vec<Buffered<u32>>) {
            let _ = self
                .0
                .send(items.into_iter().map(|buffered| buffered.item).collect());
        }
    }

    fn batcher(max_items: usize, max_elapsed: Duration) -> (Batcher<u32>, mpsc::UnboundedReceiver<Vec<u32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let batcher = Batcher::start(
            BatcherOptions {
                max_items,
                max_elapsed,
            },
            Arc::new(ChannelHandler(tx)),
        );
        (batcher, rx)
    }

    #[tokio::test]
    async fn flushes_when_max_items_is_reached() {
        let (batcher, mut rx) = batcher(2, Duration::from_secs(3600));

        batcher.add(1).await.unwrap();
        batcher.add(2).await.unwrap();
        batcher.add(3).await.unwrap();

        let flushed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(flushed, vec![1, 2]);

        batcher.wait_for_all().await;
        assert_eq!(rx.recv().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn flushes_on_interval() {
        let (batcher, mut rx) = batcher(100, Duration::from_millis(10));

        batcher.add(7).await.unwrap();

        let flushed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(flushed, vec![7]);

        batcher.wait_for_all().await;
    }

    #[tokio::test]
    async fn rejects_items_after_shutdown() {
        let (batcher, mut rx) = batcher(100, Duration::from_secs(3600));

        batcher.add(1).await.unwrap();
        batcher.wait_for_all().await;

        assert_eq!(rx.recv().await.unwrap(), vec![1]);
        assert!(batcher.is_closed().await);
        assert_eq!(batcher.add(2).await, Err(BatcherError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_accepted_item_is_flushed_when_closing_concurrently() {
        let (batcher, mut rx) = batcher(3, Duration::from_millis(1));
        let batcher = Arc::new(batcher);

        let producers: Vec<_> = (0..8u32)
            .map(|producer| {
                let batcher = batcher.clone();
                tokio::spawn(async move {
                    let mut accepted = Vec::new();
                    for i in 0..200u32 {
                        let item = producer * 1000 + i;
                        if batcher.add(item).await.is_ok() {
                            accepted.push(item);
                        }
                        tokio::task::yield_now().await;
                    }
                    accepted
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(2)).await;
        batcher.wait_for_all().await;

        let mut accepted = Vec::new();
        for producer in producers {
            accepted.extend(producer.await.unwrap());
        }

        let mut flushed = Vec::new();
        while let Ok(items) = rx.try_recv() {
            flushed.extend(items);
        }

        accepted.sort_unstable();
        flushed.sort_unstable();
        assert_eq!(flushed, accepted);
    }

    #[tokio::test]
    async fn nothing_is_flushed_when_empty() {
        let (batcher, mut rx) = batcher(100, Duration::from_millis(5));

        batcher.wait_for_all().await;
        drop(batcher);

        assert!(rx.recv().await.is_none());
    }
}

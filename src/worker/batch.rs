use super::{Pending, WorkError, Worker};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Mutex, time::Duration};

/// An item that may absorb following items into a single unit of work.
pub trait Batchable: Sized {
    /// Tries to merge `other` into `self`, handing it back if it can not be merged.
    fn batch_with(&mut self, other: Self) -> Result<(), Self> {
        Err(other)
    }

    /// Number of elementary items represented by `self`.
    fn size(&self) -> usize {
        1
    }

    /// Whether `self` may absorb other items at all.
    ///
    /// A batch is never held back waiting for items it can not take.
    fn is_batchable(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct BatchState<T> {
    /// Batch held back while waiting for more items.
    current: Option<T>,
    /// Remaining waits for the current batch.
    countdown: usize,
}

/// [`Worker`] adapter which merges queued items into batches before handing them to the
/// inner worker.
///
/// A batch is handed over as soon as it reaches `batch_size`, a merge is rejected, or the queue
/// stayed empty for `wait_countdown` consecutive waits of `wait_interval`.
pub struct BatchWorker<W: Worker> {
    inner: W,
    batch_size: usize,
    wait_countdown: usize,
    wait_interval: Duration,
    state: Mutex<BatchState<W::Item>>,
}

impl<W: Worker> BatchWorker<W>
where
    W::Item: Batchable,
{
    /// Creates a new [`BatchWorker`].
    pub fn new(inner: W, batch_size: usize, wait_countdown: usize, wait_interval: Duration) -> Self {
        Self {
            inner,
            batch_size: batch_size.max(1),
            wait_countdown,
            wait_interval,
            state: Mutex::new(BatchState { current: None, countdown: wait_countdown }),
        }
    }

    /// Returns the wrapped worker.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Maximum size of a batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl<W: Worker> Worker for BatchWorker<W>
where
    W::Item: Batchable,
{
    type Item = W::Item;
    type Error = W::Error;

    fn prepare(&self, queue: &mut VecDeque<Self::Item>) -> Result<Option<Self::Item>, Pending> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(mut batch) = state.current.take().or_else(|| queue.pop_front()) else {
            return Ok(None);
        };

        while batch.is_batchable() && batch.size() < self.batch_size {
            if let Some(next) = queue.pop_front() {
                if let Err(next) = batch.batch_with(next) {
                    queue.push_front(next);
                    break;
                }
            } else if state.countdown > 0 {
                state.countdown -= 1;
                state.current = Some(batch);
                return Err(Pending::new(self.wait_interval, "wait for more items to batch"));
            } else {
                break;
            }
        }

        state.countdown = self.wait_countdown;
        Ok(Some(batch))
    }

    async fn work(&self, item: &mut Self::Item) -> Result<(), WorkError<Self::Error>> {
        self.inner.work(item).await
    }

    fn complete(&self, item: Self::Item) {
        self.inner.complete(item)
    }

    fn on_failure(&self, item: &Self::Item, err: &Self::Error) {
        self.inner.on_failure(item, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::AsyncWorker;
    use std::sync::Mutex as StdMutex;

    /// Numbers merged into a single batch.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Numbers(Vec<u32>);

    impl Batchable for Numbers {
        fn batch_with(&mut self, other: Self) -> Result<(), Self> {
            // 99 marks an item that refuses to join a batch
            if other.0.contains(&99) {
                return Err(other);
            }
            self.0.extend(other.0);
            Ok(())
        }

        fn size(&self) -> usize {
            self.0.len()
        }

        // 0 marks an item that never takes others
        fn is_batchable(&self) -> bool {
            !self.0.contains(&0)
        }
    }

    #[derive(Debug, Default)]
    struct Collect(StdMutex<Vec<Vec<u32>>>);

    #[async_trait]
    impl Worker for Collect {
        type Item = Numbers;
        type Error = String;

        async fn work(&self, item: &mut Numbers) -> Result<(), WorkError<String>> {
            self.0.lock().unwrap().push(item.0.clone());
            Ok(())
        }

        fn on_failure(&self, _item: &Numbers, _err: &String) {}
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn five_items_make_two_batches() {
        let worker =
            AsyncWorker::new(BatchWorker::new(Collect::default(), 3, 3, Duration::from_millis(1000)));
        for i in 1..=5 {
            worker.submit(Numbers(vec![i]));
        }
        settle().await;

        // the first batch is full, the second waits for more items
        assert_eq!(*worker.worker().inner().0.lock().unwrap(), vec![vec![1, 2, 3]]);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        settle().await;
        assert_eq!(*worker.worker().inner().0.lock().unwrap(), vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_item_joins_waiting_batch() {
        let worker =
            AsyncWorker::new(BatchWorker::new(Collect::default(), 3, 3, Duration::from_millis(1000)));
        worker.submit(Numbers(vec![1]));
        settle().await;

        tokio::time::sleep(Duration::from_millis(1000)).await;
        worker.submit(Numbers(vec![2]));
        worker.submit(Numbers(vec![3]));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;

        assert_eq!(*worker.worker().inner().0.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn rejected_merge_stays_queued() {
        let batch = BatchWorker::new(Collect::default(), 10, 0, Duration::from_millis(10));
        let mut queue: VecDeque<_> =
            [Numbers(vec![1]), Numbers(vec![2]), Numbers(vec![99]), Numbers(vec![4])].into();

        let first = batch.prepare(&mut queue).unwrap().unwrap();
        assert_eq!(first, Numbers(vec![1, 2]));
        assert_eq!(queue.front(), Some(&Numbers(vec![99])));

        let second = batch.prepare(&mut queue).unwrap().unwrap();
        assert_eq!(second, Numbers(vec![99, 4]));
        assert!(queue.is_empty());
        assert_eq!(batch.prepare(&mut queue).unwrap(), None);
    }

    #[test]
    fn waits_at_most_countdown_times() {
        let batch = BatchWorker::new(Collect::default(), 3, 2, Duration::from_millis(10));
        let mut queue: VecDeque<_> = [Numbers(vec![1])].into();

        assert!(batch.prepare(&mut queue).is_err());
        assert!(batch.prepare(&mut queue).is_err());
        assert_eq!(batch.prepare(&mut queue).unwrap(), Some(Numbers(vec![1])));

        // countdown was reset for the next batch
        queue.push_back(Numbers(vec![2]));
        assert!(batch.prepare(&mut queue).is_err());
    }

    #[test]
    fn unbatchable_item_is_not_held_back() {
        let batch = BatchWorker::new(Collect::default(), 3, 3, Duration::from_millis(1000));
        let mut queue: VecDeque<_> = [Numbers(vec![0]), Numbers(vec![1])].into();

        assert_eq!(batch.prepare(&mut queue).unwrap(), Some(Numbers(vec![0])));
        assert_eq!(queue.front(), Some(&Numbers(vec![1])));

        queue.clear();
        queue.push_back(Numbers(vec![0]));
        assert_eq!(batch.prepare(&mut queue).unwrap(), Some(Numbers(vec![0])));
    }
}

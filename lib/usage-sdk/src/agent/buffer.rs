use std::collections::VecDeque;
use std::time::Instant;

/// An item waiting in the buffer, with the time it was added.
#[derive(Debug)]
pub struct Buffered<T> {
    pub item: T,
    pub added_at: Instant,
}

/// Items waiting for the next flush.
///
/// The buffer does no locking of its own, the batcher keeps it behind a single mutex so
/// that closing and adding can never interleave.
pub struct Buffer<T> {
    max_size: usize,
    queue: VecDeque<Buffered<T>>,
    closed: bool,
}

pub enum AddStatus<T> {
    Full { drained: Vec<Buffered<T>> },
    Ok,
    /// The buffer was closed, the item was not added.
    Closed,
}

impl<T> Buffer<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size),
            max_size,
            closed: false,
        }
    }

    /// Appends an item. Once the buffer holds `max_size` items it is drained
    /// and the items are handed back, in arrival order.
    pub fn add(&mut self, item: T) -> AddStatus<T> {
        if self.closed {
            return AddStatus::Closed;
        }

        self.queue.push_back(Buffered {
            item,
            added_at: Instant::now(),
        });

        if self.queue.len() >= self.max_size {
            AddStatus::Full {
                drained: self.drain(),
            }
        } else {
            AddStatus::Ok
        }
    }

    pub fn drain(&mut self) -> Vec<Buffered<T>> {
        self.queue.drain(..).collect()
    }

    /// Rejects every later `add` and returns what is still buffered.
    pub fn close(&mut self) -> Vec<Buffered<T>> {
        self.closed = true;
        self.drain()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

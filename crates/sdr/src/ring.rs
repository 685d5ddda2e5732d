use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::{SampleBlock, SdrError};

/// What `push` did with the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The ring was full; the oldest queued block was discarded to make
    /// room. Recency beats completeness for a live display.
    DroppedOldest,
}

/// Bounded FIFO of sample blocks between the acquisition thread and the
/// consumer thread.
///
/// Push never blocks: at capacity it drops the oldest block. Pop blocks
/// up to a timeout. `close()` wakes every blocked popper; pop then
/// drains what was already queued before reporting `Closed`, while new
/// pushes fail immediately. Ordering is FIFO and no block is ever
/// delivered twice.
#[derive(Clone)]
pub struct SampleRing {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    not_empty: Condvar,
}

struct State {
    queue: VecDeque<SampleBlock>,
    capacity: usize,
    closed: bool,
    dropped: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    capacity,
                    closed: false,
                    dropped: 0,
                }),
                not_empty: Condvar::new(),
            }),
        }
    }

    pub fn push(&self, block: SampleBlock) -> Result<PushOutcome, SdrError> {
        let mut s = self.lock();
        if s.closed {
            return Err(SdrError::Closed);
        }
        let outcome = if s.queue.len() == s.capacity {
            s.queue.pop_front();
            s.dropped += 1;
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Accepted
        };
        s.queue.push_back(block);
        self.shared.not_empty.notify_one();
        Ok(outcome)
    }

    pub fn pop(&self, timeout: Duration) -> Result<SampleBlock, SdrError> {
        let deadline = Instant::now() + timeout;
        let mut s = self.lock();
        loop {
            if let Some(block) = s.queue.pop_front() {
                return Ok(block);
            }
            if s.closed {
                return Err(SdrError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SdrError::Timeout);
            }
            let (guard, _) = self
                .shared
                .not_empty
                .wait_timeout(s, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            s = guard;
        }
    }

    /// Shut the ring down and wake every blocked popper.
    pub fn close(&self) {
        let mut s = self.lock();
        s.closed = true;
        drop(s);
        self.shared.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Blocks discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

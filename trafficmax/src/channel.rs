//! Bounded, blocking FIFO channel for handing values between threads.
//!
//! [`BoundedChannel`] is a fixed-capacity queue shared by reference between
//! any number of producer and consumer threads. `put` blocks while the queue
//! is full and `get` blocks while it is empty, which gives producers
//! backpressure at the pace of the consumers.
//!
//! # Design
//!
//! - One `Mutex` guards the queue, the closed flag and the high-water mark
//! - Two `Condvar`s: `not_full` wakes putters, `not_empty` wakes getters
//! - Every wait re-checks its guard condition after waking
//! - `close()` is the end-of-stream signal: it wakes every waiter, rejects
//!   further puts and lets getters drain what is already queued
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//! use trafficmax::BoundedChannel;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = BoundedChannel::new(2)?;
//!
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         for i in 0..10 {
//!             channel.put(i).unwrap();
//!         }
//!         channel.close();
//!     });
//!
//!     let mut received = Vec::new();
//!     while let Some(value) = channel.get() {
//!         received.push(value);
//!     }
//!     assert_eq!(received, (0..10).collect::<Vec<_>>());
//! });
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{ChannelError, GetError, PutError, Result};

/// State shared under the channel's lock.
struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    /// Largest queue length ever observed.
    peak_len: usize,
}

impl<T> State<T> {
    fn push(&mut self, value: T) {
        self.queue.push_back(value);
        self.peak_len = self.peak_len.max(self.queue.len());
    }
}

/// A fixed-capacity, thread-safe FIFO queue with blocking put and get.
///
/// # Thread Safety
///
/// All methods take `&self`; share the channel with `std::thread::scope` or
/// wrap it in an `Arc`. Values leave `get` in the order they entered `put`,
/// channel-wide.
pub struct BoundedChannel<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Creates an empty, open channel holding at most `capacity` values.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ChannelError::InvalidCapacity { capacity }.into());
        }

        Ok(Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                peak_len: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    // No operation can leave `State` half-updated, so a poisoned lock is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `value`, blocking while the channel is full.
    ///
    /// Wakes one thread blocked in a get.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Closed`] with the value if the channel is closed
    /// before space becomes available.
    pub fn put(&self, value: T) -> std::result::Result<(), PutError<T>> {
        let mut state = self
            .not_full
            .wait_while(self.lock(), |s| !s.closed && s.queue.len() >= self.capacity)
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            return Err(PutError::Closed(value));
        }

        state.push(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `value`, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Timeout`] if the channel stayed full for the whole
    /// timeout, or [`PutError::Closed`] if it was closed. The value is handed
    /// back in both cases.
    pub fn put_timeout(&self, value: T, timeout: Duration) -> std::result::Result<(), PutError<T>> {
        let (mut state, _) = self
            .not_full
            .wait_timeout_while(self.lock(), timeout, |s| {
                !s.closed && s.queue.len() >= self.capacity
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            return Err(PutError::Closed(value));
        }
        if state.queue.len() >= self.capacity {
            return Err(PutError::Timeout(value));
        }

        state.push(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `value` only if there is space right now.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Full`] or [`PutError::Closed`] with the value.
    pub fn try_put(&self, value: T) -> std::result::Result<(), PutError<T>> {
        let mut state = self.lock();

        if state.closed {
            return Err(PutError::Closed(value));
        }
        if state.queue.len() >= self.capacity {
            return Err(PutError::Full(value));
        }

        state.push(value);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the oldest value, blocking while the channel is
    /// empty.
    ///
    /// Wakes one thread blocked in a put. Returns `None` once the channel is
    /// closed and every queued value has been taken.
    pub fn get(&self) -> Option<T> {
        let mut state = self
            .not_empty
            .wait_while(self.lock(), |s| !s.closed && s.queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        let value = state.queue.pop_front();
        drop(state);

        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    /// Removes and returns the oldest value, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GetError::Timeout`] if nothing arrived in time, or
    /// [`GetError::Closed`] if the channel is closed and drained.
    pub fn get_timeout(&self, timeout: Duration) -> std::result::Result<T, GetError> {
        let (mut state, _) = self
            .not_empty
            .wait_timeout_while(self.lock(), timeout, |s| !s.closed && s.queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        // A value queued right at the deadline is still delivered.
        match state.queue.pop_front() {
            Some(value) => {
                drop(state);
                self.not_full.notify_one();
                Ok(value)
            }
            None if state.closed => Err(GetError::Closed),
            None => Err(GetError::Timeout),
        }
    }

    /// Removes and returns the oldest value only if one is queued right now.
    ///
    /// # Errors
    ///
    /// Returns [`GetError::Empty`] if the channel is open but empty, or
    /// [`GetError::Closed`] if it is closed and drained.
    pub fn try_get(&self) -> std::result::Result<T, GetError> {
        let mut state = self.lock();

        match state.queue.pop_front() {
            Some(value) => {
                drop(state);
                self.not_full.notify_one();
                Ok(value)
            }
            None if state.closed => Err(GetError::Closed),
            None => Err(GetError::Empty),
        }
    }

    /// Closes the channel.
    ///
    /// Blocked and future puts fail with [`PutError::Closed`]. Getters keep
    /// receiving queued values and then observe the end of the stream.
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let pending = state.queue.len();
        drop(state);

        tracing::debug!(pending, "channel closed");
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Returns whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the maximum number of queued values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of values currently queued.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns whether no values are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Returns whether the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.lock().queue.len() >= self.capacity
    }

    /// Returns the largest number of values that were ever queued at once.
    ///
    /// Never exceeds [`capacity`](Self::capacity).
    pub fn peak_len(&self) -> usize {
        self.lock().peak_len
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("len", &state.queue.len())
            .field("peak_len", &state.peak_len)
            .field("closed", &state.closed)
            .finish()
    }
}
